use super::state::{AppState, ManagedSession, SinkForwarder};
use crate::audio::EncodedFormat;
use crate::error::{CaptureError, StartError, StopError};
use crate::session::{
    FinalRecording, RecordingSession, RecordingSummary, RecoveryPolicy, SessionStats,
    SessionStatus, StopOutcome,
};
use crate::sink::FileSegmentSink;
use anyhow::{Context, Result};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Debug, Default, Deserialize)]
pub struct StartRecordingRequest {
    /// Optional meeting ID (if not provided, generate UUID)
    pub meeting_id: Option<String>,

    /// Segment duration in seconds (default from config, 600 = 10 minutes)
    pub segment_duration_secs: Option<u64>,
}

#[derive(Debug, Serialize)]
pub struct StartRecordingResponse {
    pub meeting_id: String,
    pub status: SessionStatus,
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct StopRecordingResponse {
    pub meeting_id: String,
    pub status: SessionStatus,
    pub message: String,
    pub recording: Option<RecordingSummary>,
    /// Reassembled recording on disk
    pub file: Option<String>,
    /// Segments each sink accepted, keyed by sink name
    pub segments_delivered: BTreeMap<String, usize>,
}

#[derive(Debug, Serialize)]
pub struct ControlResponse {
    pub meeting_id: String,
    pub status: SessionStatus,
}

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    #[serde(flatten)]
    pub stats: SessionStats,
    pub label: String,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fault: Option<CaptureError>,
}

fn error_response(status: StatusCode, error: String) -> Response {
    (status, Json(ErrorResponse { error, fault: None })).into_response()
}

fn not_found(meeting_id: &str) -> Response {
    error_response(
        StatusCode::NOT_FOUND,
        format!("Meeting {} not found", meeting_id),
    )
}

/// Display text for a session status
pub fn status_label(status: SessionStatus, elapsed_seconds: u64) -> String {
    let clock = format!("{:02}:{:02}", elapsed_seconds / 60, elapsed_seconds % 60);
    match status {
        SessionStatus::Idle => "Ready".to_string(),
        SessionStatus::Initializing => "Starting...".to_string(),
        SessionStatus::Recording => format!("Recording {}", clock),
        SessionStatus::Paused => format!("Paused {}", clock),
        SessionStatus::SwitchingSegment => format!("Recording {} (saving segment)", clock),
        SessionStatus::Finalizing => "Finishing...".to_string(),
        SessionStatus::Completed => format!("Saved {}", clock),
        SessionStatus::Empty => "Nothing recorded".to_string(),
        SessionStatus::Error => "Recording failed".to_string(),
    }
}

/// Meeting ids name directories and files under the recordings path, so
/// only a single plain path component is accepted
pub fn validate_meeting_id(meeting_id: &str) -> Result<(), String> {
    if meeting_id.is_empty() || meeting_id.len() > MAX_MEETING_ID_LEN {
        return Err(format!(
            "Meeting id must be 1 to {} characters",
            MAX_MEETING_ID_LEN
        ));
    }
    if let Some(c) = meeting_id
        .chars()
        .find(|c| !(c.is_ascii_alphanumeric() || *c == '-' || *c == '_'))
    {
        return Err(format!(
            "Meeting id {:?} contains {:?}; use letters, digits, '-' or '_'",
            meeting_id, c
        ));
    }
    Ok(())
}

const MAX_MEETING_ID_LEN: usize = 128;

fn start_error_status(err: &StartError) -> StatusCode {
    match err {
        StartError::Capture(CaptureError::PermissionDenied(_)) => StatusCode::FORBIDDEN,
        StartError::Capture(CaptureError::DeviceUnavailable(_)) => StatusCode::SERVICE_UNAVAILABLE,
        StartError::InvalidState(_) | StartError::Discarded => StatusCode::CONFLICT,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

// ============================================================================
// Handlers
// ============================================================================

/// POST /meetings/record/start
/// Start a new recording session
pub async fn start_recording(
    State(state): State<AppState>,
    Json(req): Json<StartRecordingRequest>,
) -> Response {
    // Generate or use provided meeting ID
    let meeting_id = req
        .meeting_id
        .unwrap_or_else(|| format!("meeting-{}", uuid::Uuid::new_v4()));

    if let Err(e) = validate_meeting_id(&meeting_id) {
        warn!("Rejected start request: {}", e);
        return error_response(StatusCode::BAD_REQUEST, e);
    }

    info!("Starting recording for meeting: {}", meeting_id);

    // Held until the session is stored, so a concurrent start for the
    // same id gets 409 instead of replacing this one
    let Some(reservation) = state.reserve(&meeting_id).await else {
        return error_response(
            StatusCode::CONFLICT,
            format!("Meeting {} is already recording", meeting_id),
        );
    };

    let mut config = state.capture.session_config(meeting_id.clone());
    if let Some(secs) = req.segment_duration_secs {
        config.segment_duration = Duration::from_secs(secs);
    }

    let session = RecordingSession::new(config, state.input.clone());

    // Subscribe before starting so the forwarders see every segment
    let file_events = session.subscribe();
    let nats_events = state.nats.as_ref().map(|_| session.subscribe());

    if let Err(e) = session.start().await {
        error!("Failed to start recording {}: {}", meeting_id, e);
        let fault = match &e {
            StartError::Capture(fault) => Some(fault.clone()),
            _ => None,
        };
        return (
            start_error_status(&e),
            Json(ErrorResponse {
                error: format!("Failed to start recording: {}", e),
                fault,
            }),
        )
            .into_response();
    }

    let format = match session.stats().await {
        Ok(stats) => stats.format,
        Err(e) => {
            return error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Failed to start recording: {}", e),
            )
        }
    };

    let segments_dir = state
        .storage
        .recordings_dir()
        .join(&meeting_id)
        .join("segments");
    let file_sink = match FileSegmentSink::new(segments_dir, format) {
        Ok(sink) => Arc::new(sink),
        Err(e) => {
            error!("Failed to prepare segment directory: {:#}", e);
            session.discard().await;
            return error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Failed to prepare segment directory: {}", e),
            );
        }
    };

    let mut forwarders = vec![SinkForwarder::spawn(
        meeting_id.clone(),
        file_events,
        file_sink,
    )];
    if let (Some(client), Some(events)) = (state.nats.clone(), nats_events) {
        forwarders.push(SinkForwarder::spawn(
            meeting_id.clone(),
            events,
            Arc::new(crate::nats::NatsSegmentSink::new(client)),
        ));
    }

    // Store session
    {
        let mut sessions = state.sessions.write().await;
        sessions.insert(
            meeting_id.clone(),
            ManagedSession {
                session,
                forwarders,
            },
        );
    }
    drop(reservation);

    info!("Recording started successfully for meeting: {}", meeting_id);

    (
        StatusCode::OK,
        Json(StartRecordingResponse {
            meeting_id: meeting_id.clone(),
            status: SessionStatus::Recording,
            message: format!("Recording started for meeting {}", meeting_id),
        }),
    )
        .into_response()
}

/// POST /meetings/:meeting_id/pause
pub async fn pause_recording(
    State(state): State<AppState>,
    Path(meeting_id): Path<String>,
) -> Response {
    let Some(session) = lookup(&state, &meeting_id).await else {
        return not_found(&meeting_id);
    };

    if session.pause().await {
        info!("Recording paused for meeting: {}", meeting_id);
        control_ok(meeting_id, SessionStatus::Paused)
    } else {
        error_response(
            StatusCode::CONFLICT,
            format!("Meeting {} is not recording", meeting_id),
        )
    }
}

/// POST /meetings/:meeting_id/resume
pub async fn resume_recording(
    State(state): State<AppState>,
    Path(meeting_id): Path<String>,
) -> Response {
    let Some(session) = lookup(&state, &meeting_id).await else {
        return not_found(&meeting_id);
    };

    if session.resume().await {
        info!("Recording resumed for meeting: {}", meeting_id);
        control_ok(meeting_id, SessionStatus::Recording)
    } else {
        error_response(
            StatusCode::CONFLICT,
            format!("Meeting {} is not paused", meeting_id),
        )
    }
}

/// POST /meetings/record/stop/:meeting_id
/// Stop recording and write the reassembled recording to disk
pub async fn stop_recording(
    State(state): State<AppState>,
    Path(meeting_id): Path<String>,
) -> Response {
    info!("Stopping recording for meeting: {}", meeting_id);

    let Some(session) = lookup(&state, &meeting_id).await else {
        error!("Meeting {} not found", meeting_id);
        return not_found(&meeting_id);
    };

    let (status, recording) = match session.stop().await {
        Ok(StopOutcome::Completed(recording)) => (SessionStatus::Completed, Some(recording)),
        Ok(StopOutcome::Empty { .. }) => (SessionStatus::Empty, None),
        Err(StopError::InvalidState(SessionStatus::Error)) => {
            // Hand back what was captured before the fault
            let recording = session.recover(RecoveryPolicy::FinalizeOpenSegment).await;
            (SessionStatus::Error, recording)
        }
        Err(e) => {
            error!("Failed to stop recording: {}", e);
            return error_response(
                StatusCode::CONFLICT,
                format!("Failed to stop recording: {}", e),
            );
        }
    };

    let managed = state.sessions.write().await.remove(&meeting_id);
    if status == SessionStatus::Error {
        // Ends the forwarders; the device was already released by the fault
        session.discard().await;
    }
    let segments_delivered = match managed {
        Some(managed) => await_forwarders(managed.forwarders).await,
        None => BTreeMap::new(),
    };

    let file = match &recording {
        Some(recording) if !recording.payloads_retained => {
            info!(
                "Recording {} kept no audio in memory; segments are on disk",
                meeting_id
            );
            None
        }
        Some(recording) => match write_recording(&state, recording).await {
            Ok(path) => Some(path.display().to_string()),
            Err(e) => {
                error!("Failed to write recording {}: {:#}", meeting_id, e);
                return error_response(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    format!("Failed to write recording: {}", e),
                );
            }
        },
        None => None,
    };

    if let (Some(client), Some(recording)) = (&state.nats, &recording) {
        if let Err(e) = client.publish_recording_complete(recording).await {
            warn!("Failed to announce recording {}: {:#}", meeting_id, e);
        }
    }

    let message = match status {
        SessionStatus::Completed => "Recording stopped".to_string(),
        SessionStatus::Empty => "Nothing was recorded".to_string(),
        _ => "Recording failed; captured audio was recovered".to_string(),
    };

    info!("Recording stopped for meeting: {} ({:?})", meeting_id, status);

    (
        StatusCode::OK,
        Json(StopRecordingResponse {
            meeting_id,
            status,
            message,
            recording: recording.as_ref().map(FinalRecording::summary),
            file,
            segments_delivered,
        }),
    )
        .into_response()
}

/// DELETE /meetings/:meeting_id
/// Discard a recording and everything it captured
pub async fn discard_recording(
    State(state): State<AppState>,
    Path(meeting_id): Path<String>,
) -> Response {
    let managed = state.sessions.write().await.remove(&meeting_id);

    match managed {
        Some(managed) => {
            managed.session.discard().await;
            await_forwarders(managed.forwarders).await;
            info!("Recording discarded for meeting: {}", meeting_id);
            control_ok(meeting_id, SessionStatus::Idle)
        }
        None => not_found(&meeting_id),
    }
}

/// GET /meetings/:meeting_id/status
/// Get status of a recording session
pub async fn get_meeting_status(
    State(state): State<AppState>,
    Path(meeting_id): Path<String>,
) -> Response {
    let Some(session) = lookup(&state, &meeting_id).await else {
        return not_found(&meeting_id);
    };

    match session.stats().await {
        Ok(stats) => {
            let label = status_label(stats.status, stats.elapsed_seconds);
            (StatusCode::OK, Json(StatusResponse { stats, label })).into_response()
        }
        Err(e) => {
            error!("Failed to get stats: {}", e);
            error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Failed to get stats: {}", e),
            )
        }
    }
}

/// GET /health
/// Health check endpoint
pub async fn health_check() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}

// ============================================================================
// Helpers
// ============================================================================

async fn lookup(state: &AppState, meeting_id: &str) -> Option<RecordingSession> {
    let sessions = state.sessions.read().await;
    sessions.get(meeting_id).map(|managed| managed.session.clone())
}

fn control_ok(meeting_id: String, status: SessionStatus) -> Response {
    (StatusCode::OK, Json(ControlResponse { meeting_id, status })).into_response()
}

/// Wait for each forwarder and report how many segments its sink took
async fn await_forwarders(forwarders: Vec<SinkForwarder>) -> BTreeMap<String, usize> {
    let (sinks, handles): (Vec<String>, Vec<_>) = forwarders
        .into_iter()
        .map(|forwarder| (forwarder.sink, forwarder.handle))
        .unzip();

    let mut delivered = BTreeMap::new();
    for (sink, result) in sinks.into_iter().zip(futures::future::join_all(handles).await) {
        match result {
            Ok(report) => {
                *delivered.entry(sink).or_insert(0) += report.delivered;
            }
            Err(e) => error!("Segment forwarder for {} sink failed: {}", sink, e),
        }
    }
    delivered
}

/// Write `<recordings>/<id>/<id>.wav` (or `.bin` for opaque payloads)
async fn write_recording(state: &AppState, recording: &FinalRecording) -> Result<PathBuf> {
    let dir = state.storage.recordings_dir().join(&recording.session_id);
    let path = dir.join(format!(
        "{}.{}",
        recording.session_id,
        recording.format.extension()
    ));
    let recording = recording.clone();
    let target = path.clone();

    tokio::task::spawn_blocking(move || -> Result<()> {
        std::fs::create_dir_all(&dir).context("Failed to create recording directory")?;
        match recording.format {
            EncodedFormat::PcmS16Le { .. } => recording.write_wav(&target),
            EncodedFormat::Opaque => std::fs::write(&target, recording.concat())
                .with_context(|| format!("Failed to write recording: {:?}", target)),
        }
    })
    .await
    .context("Recording writer task panicked")??;

    info!("Recording written to {}", path.display());
    Ok(path)
}
