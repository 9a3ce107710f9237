use anyhow::{Context, Result};
use async_nats::Client;
use base64::Engine;
use tracing::info;

use super::messages::{RecordingCompleteMessage, SegmentMessage};
use crate::session::{FinalRecording, Segment};

#[derive(Clone)]
pub struct NatsClient {
    client: Client,
}

impl NatsClient {
    /// Connect to NATS server
    pub async fn connect(url: &str) -> Result<Self> {
        info!("Connecting to NATS at {}", url);

        let client = async_nats::connect(url)
            .await
            .context("Failed to connect to NATS")?;

        info!("Connected to NATS successfully");

        Ok(Self { client })
    }

    pub fn segment_subject(session_id: &str) -> String {
        format!("audio.segment.{}", session_id)
    }

    pub fn complete_subject(session_id: &str) -> String {
        format!("audio.recording.complete.{}", session_id)
    }

    /// Publish a finalized segment to NATS
    pub async fn publish_segment(&self, session_id: &str, segment: &Segment) -> Result<()> {
        let subject = Self::segment_subject(session_id);
        let message = segment_message(session_id, segment);
        let payload = serde_json::to_vec(&message)?;

        self.client
            .publish(subject.clone(), payload.into())
            .await
            .context("Failed to publish segment")?;

        info!(
            "Published segment to {} (sequence={}, bytes={})",
            subject,
            segment.sequence_number(),
            segment.byte_size()
        );

        Ok(())
    }

    /// Announce that a recording is complete
    pub async fn publish_recording_complete(&self, recording: &FinalRecording) -> Result<()> {
        let subject = Self::complete_subject(&recording.session_id);
        let message = RecordingCompleteMessage {
            session_id: recording.session_id.clone(),
            segments: recording.segments.len(),
            total_bytes: recording.total_bytes,
            total_duration_seconds: recording.total_duration_seconds,
            timestamp: chrono::Utc::now().to_rfc3339(),
        };
        let payload = serde_json::to_vec(&message)?;

        self.client
            .publish(subject.clone(), payload.into())
            .await
            .context("Failed to publish recording completion")?;

        info!("Published recording completion to {}", subject);

        Ok(())
    }

    /// Wait until published messages have reached the server
    pub async fn flush(&self) -> Result<()> {
        self.client
            .flush()
            .await
            .context("Failed to flush NATS connection")?;
        Ok(())
    }
}

/// Build the wire message for a segment
pub fn segment_message(session_id: &str, segment: &Segment) -> SegmentMessage {
    SegmentMessage {
        session_id: session_id.to_string(),
        sequence: segment.sequence_number(),
        payload: base64::engine::general_purpose::STANDARD.encode(segment.payload()),
        byte_size: segment.byte_size(),
        start_seconds: segment.start_seconds(),
        duration_seconds: segment.duration_seconds(),
        timestamp: chrono::Utc::now().to_rfc3339(),
    }
}
