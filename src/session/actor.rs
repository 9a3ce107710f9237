//! The session actor
//!
//! One task per session owns all mutable state. Caller commands, device
//! open results, encoder events and both timers are multiplexed into a
//! single select loop, so no two transitions ever run concurrently: a
//! timer that fires while a command is being handled is picked up on the
//! next loop iteration.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::{mpsc, oneshot};
use tokio::time::{sleep_until, timeout, Instant};
use tracing::{debug, error, info, warn};

use super::accumulator::{Segment, SegmentAccumulator};
use super::config::SessionConfig;
use super::events::{EventHub, SessionEvent};
use super::recording::{FinalRecording, RecoveryPolicy, StopOutcome};
use super::stats::SessionStats;
use super::status::SessionStatus;
use super::timer::{DurationTracker, SegmentTimer};
use crate::audio::EncodedFormat;
use crate::capture::{AudioInput, EncoderEvent, EncoderSession};
use crate::error::{CaptureError, CaptureFault, StartError, StopError};

pub(crate) enum Command {
    Start(oneshot::Sender<Result<(), StartError>>),
    Pause(oneshot::Sender<bool>),
    Resume(oneshot::Sender<bool>),
    Stop(oneshot::Sender<Result<StopOutcome, StopError>>),
    Discard(oneshot::Sender<()>),
    Subscribe(mpsc::UnboundedSender<SessionEvent>),
    Stats(oneshot::Sender<SessionStats>),
    Recover(RecoveryPolicy, oneshot::Sender<Option<FinalRecording>>),
}

/// Result of a device open attempt, tagged with the start attempt it
/// belongs to
struct DeviceOpened {
    generation: u64,
    result: Result<Box<dyn EncoderSession>, CaptureError>,
}

pub(crate) struct SessionActor {
    config: SessionConfig,
    input: Arc<dyn AudioInput>,
    commands: mpsc::UnboundedReceiver<Command>,
    opened_tx: mpsc::UnboundedSender<DeviceOpened>,
    opened_rx: mpsc::UnboundedReceiver<DeviceOpened>,

    status: SessionStatus,
    /// Bumped by every start and discard; stale open results are closed
    generation: u64,
    pending_start: Option<oneshot::Sender<Result<(), StartError>>>,

    encoder: Option<Box<dyn EncoderSession>>,
    encoder_events: Option<mpsc::UnboundedReceiver<EncoderEvent>>,
    format: EncodedFormat,

    accumulator: SegmentAccumulator,
    timer: SegmentTimer,
    tracker: DurationTracker,
    segments: Vec<Segment>,

    started_at: Option<DateTime<Utc>>,
    fault: Option<CaptureFault>,
    events: EventHub,
}

impl SessionActor {
    pub(crate) fn new(
        config: SessionConfig,
        input: Arc<dyn AudioInput>,
        commands: mpsc::UnboundedReceiver<Command>,
    ) -> Self {
        let (opened_tx, opened_rx) = mpsc::unbounded_channel();
        let timer = SegmentTimer::new(config.segment_duration);

        Self {
            config,
            input,
            commands,
            opened_tx,
            opened_rx,
            status: SessionStatus::Idle,
            generation: 0,
            pending_start: None,
            encoder: None,
            encoder_events: None,
            format: EncodedFormat::Opaque,
            accumulator: SegmentAccumulator::new(),
            timer,
            tracker: DurationTracker::new(),
            segments: Vec::new(),
            started_at: None,
            fault: None,
            events: EventHub::default(),
        }
    }

    pub(crate) async fn run(mut self) {
        debug!("Session actor started: {}", self.config.session_id);

        loop {
            // Order matters: a duration tick due at the same instant as a
            // boundary is counted before the boundary closes the segment
            tokio::select! {
                biased;
                command = self.commands.recv() => match command {
                    Some(command) => self.handle_command(command).await,
                    None => break,
                },
                Some(opened) = self.opened_rx.recv() => self.on_device_opened(opened).await,
                _ = wait_until(self.tracker.next_tick()) => self.on_tick(),
                _ = wait_until(self.timer.deadline()) => self.on_segment_boundary().await,
                event = next_encoder_event(&mut self.encoder_events) => self.on_encoder_event(event).await,
            }
        }

        // Every handle is gone; nobody can stop or discard any more
        if self.encoder.is_some() {
            warn!(
                "Session {} dropped while {:?}; releasing device",
                self.config.session_id, self.status
            );
        }
        self.release_encoder().await;
        debug!("Session actor exited: {}", self.config.session_id);
    }

    async fn handle_command(&mut self, command: Command) {
        match command {
            Command::Start(reply) => self.start(reply),
            Command::Pause(reply) => {
                let paused = self.pause().await;
                let _ = reply.send(paused);
            }
            Command::Resume(reply) => {
                let resumed = self.resume().await;
                let _ = reply.send(resumed);
            }
            Command::Stop(reply) => {
                let outcome = self.stop().await;
                let _ = reply.send(outcome);
            }
            Command::Discard(reply) => {
                self.discard().await;
                let _ = reply.send(());
            }
            Command::Subscribe(subscriber) => self.events.add(subscriber),
            Command::Stats(reply) => {
                let _ = reply.send(self.stats());
            }
            Command::Recover(policy, reply) => {
                let recording = self.recover(policy);
                let _ = reply.send(recording);
            }
        }
    }

    // ------------------------------------------------------------------
    // Caller commands
    // ------------------------------------------------------------------

    fn start(&mut self, reply: oneshot::Sender<Result<(), StartError>>) {
        if self.status != SessionStatus::Idle {
            let _ = reply.send(Err(StartError::InvalidState(self.status)));
            return;
        }

        info!(
            "Starting recording session: {} (segments of {}s)",
            self.config.session_id,
            self.config.segment_duration.as_secs()
        );

        self.generation += 1;
        self.pending_start = Some(reply);
        self.set_status(SessionStatus::Initializing);

        let generation = self.generation;
        let input = Arc::clone(&self.input);
        let constraints = self.config.constraints;
        let start_timeout = self.config.start_timeout;
        let opened_tx = self.opened_tx.clone();

        // The open runs off the actor so discard stays responsive while
        // the device is still coming up
        tokio::spawn(async move {
            let result = match timeout(start_timeout, input.open(&constraints)).await {
                Ok(result) => result,
                Err(_) => Err(CaptureError::DeviceUnavailable(format!(
                    "{} did not open within {:?}",
                    input.name(),
                    start_timeout
                ))),
            };

            if let Err(mpsc::error::SendError(opened)) =
                opened_tx.send(DeviceOpened { generation, result })
            {
                if let Ok(mut encoder) = opened.result {
                    encoder.close().await;
                }
            }
        });
    }

    async fn pause(&mut self) -> bool {
        if self.status != SessionStatus::Recording {
            return false;
        }

        let now = Instant::now();
        self.tracker.pause(now);
        let remaining = self.timer.suspend(now);

        if let Some(encoder) = self.encoder.as_mut() {
            if let Err(e) = encoder.pause().await {
                self.enter_error(e).await;
                return false;
            }
        }

        info!(
            "Paused {} at {}s ({:.1}s left in segment {})",
            self.config.session_id,
            self.tracker.elapsed(),
            remaining.as_secs_f64(),
            self.accumulator.next_sequence()
        );
        self.set_status(SessionStatus::Paused);
        true
    }

    async fn resume(&mut self) -> bool {
        if self.status != SessionStatus::Paused {
            return false;
        }

        if let Some(encoder) = self.encoder.as_mut() {
            if let Err(e) = encoder.resume().await {
                self.enter_error(e).await;
                return false;
            }
        }

        let now = Instant::now();
        let armed = self.tracker.start(now).and_then(|()| self.timer.arm(now));
        if let Err(e) = armed {
            self.enter_error(e).await;
            return false;
        }

        info!(
            "Resumed {} at {}s",
            self.config.session_id,
            self.tracker.elapsed()
        );
        self.set_status(SessionStatus::Recording);
        true
    }

    async fn stop(&mut self) -> Result<StopOutcome, StopError> {
        if !matches!(self.status, SessionStatus::Recording | SessionStatus::Paused) {
            return Err(StopError::InvalidState(self.status));
        }

        info!("Stopping recording session: {}", self.config.session_id);
        self.set_status(SessionStatus::Finalizing);

        self.tracker.pause(Instant::now());
        self.timer.cancel();

        let trailing = self.flush_encoder().await;

        // Chunks already queued precede the trailing flush
        if let Some(mut events) = self.encoder_events.take() {
            while let Ok(event) = events.try_recv() {
                match event {
                    EncoderEvent::Chunk(bytes) => {
                        self.accumulator.append(bytes);
                    }
                    EncoderEvent::Fault(e) => {
                        warn!(
                            "Fault during final flush of {}: {}",
                            self.config.session_id, e
                        );
                    }
                }
            }
        }
        for chunk in trailing {
            self.accumulator.append(chunk);
        }

        let elapsed = self.tracker.elapsed();

        if self.accumulator.total_bytes() == 0 {
            self.accumulator.seal();
            info!(
                "Recording session {} captured no audio ({}s)",
                self.config.session_id, elapsed
            );
            self.set_status(SessionStatus::Empty);
            return Ok(StopOutcome::Empty {
                session_id: self.config.session_id.clone(),
                duration_seconds: elapsed,
            });
        }

        self.finalize_open_segment(elapsed);
        self.accumulator.seal();

        let recording = self.recording();
        info!(
            "Recording session complete: {} ({} segments, {}s, {} bytes)",
            recording.session_id,
            recording.segments.len(),
            recording.total_duration_seconds,
            recording.total_bytes
        );
        self.set_status(SessionStatus::Completed);

        Ok(StopOutcome::Completed(recording))
    }

    async fn discard(&mut self) {
        info!(
            "Discarding recording session {} ({:?})",
            self.config.session_id, self.status
        );

        self.generation += 1;
        if let Some(reply) = self.pending_start.take() {
            let _ = reply.send(Err(StartError::Discarded));
        }

        self.release_encoder().await;
        self.encoder_events = None;
        self.tracker.reset();
        self.timer.cancel();
        self.accumulator.reset();
        self.segments.clear();
        self.format = EncodedFormat::Opaque;
        self.started_at = None;
        self.fault = None;

        self.set_status(SessionStatus::Idle);
    }

    fn recover(&mut self, policy: RecoveryPolicy) -> Option<FinalRecording> {
        if self.status != SessionStatus::Error {
            return None;
        }

        if policy == RecoveryPolicy::FinalizeOpenSegment
            && !self.accumulator.is_sealed()
            && self.accumulator.chunk_count() > 0
        {
            info!(
                "Finalizing open segment {} of {} after fault",
                self.accumulator.next_sequence(),
                self.config.session_id
            );
            self.finalize_open_segment(self.tracker.elapsed());
            self.accumulator.seal();
        }

        if self.segments.is_empty() {
            None
        } else {
            Some(self.recording())
        }
    }

    fn stats(&self) -> SessionStats {
        let now = Instant::now();
        SessionStats {
            session_id: self.config.session_id.clone(),
            status: self.status,
            started_at: self.started_at,
            elapsed_seconds: self.tracker.elapsed(),
            segment_duration_seconds: self.timer.window().as_secs(),
            segment_remaining_seconds: self.timer.remaining(now).as_secs(),
            segments_count: self.segments.len(),
            open_segment_chunks: self.accumulator.chunk_count(),
            open_segment_bytes: self.accumulator.buffered_bytes(),
            total_bytes: self.accumulator.total_bytes(),
            format: self.format,
            fault: self.fault.clone(),
        }
    }

    // ------------------------------------------------------------------
    // Asynchronous inputs
    // ------------------------------------------------------------------

    async fn on_device_opened(&mut self, opened: DeviceOpened) {
        if opened.generation != self.generation || self.status != SessionStatus::Initializing {
            if let Ok(mut encoder) = opened.result {
                warn!(
                    "Device for {} opened after the start was abandoned; closing it",
                    self.config.session_id
                );
                encoder.close().await;
            }
            return;
        }

        let reply = self.pending_start.take();
        let started = match opened.result {
            Ok(encoder) => self.begin_recording(encoder).await,
            Err(e) => Err(e),
        };

        let result = match started {
            Ok(()) => Ok(()),
            Err(e) => {
                self.enter_error(e.clone()).await;
                Err(StartError::Capture(e))
            }
        };

        if let Some(reply) = reply {
            let _ = reply.send(result);
        }
    }

    async fn begin_recording(
        &mut self,
        mut encoder: Box<dyn EncoderSession>,
    ) -> Result<(), CaptureError> {
        let events = match encoder.begin().await {
            Ok(events) => events,
            Err(e) => {
                encoder.close().await;
                return Err(e);
            }
        };

        // Both timers start together or not at all
        let now = Instant::now();
        let armed = self
            .tracker
            .start(now)
            .and_then(|()| self.timer.arm_fresh(now));
        if let Err(e) = armed {
            self.tracker.reset();
            self.timer.cancel();
            encoder.close().await;
            return Err(e);
        }

        self.format = encoder.format();
        self.encoder = Some(encoder);
        self.encoder_events = Some(events);
        self.started_at = Some(Utc::now());

        info!("Recording session started: {}", self.config.session_id);
        self.set_status(SessionStatus::Recording);
        Ok(())
    }

    fn on_tick(&mut self) {
        let elapsed = self.tracker.tick();
        self.events.emit(SessionEvent::DurationChanged(elapsed));
    }

    async fn on_segment_boundary(&mut self) {
        if self.status != SessionStatus::Recording {
            self.timer.cancel();
            return;
        }

        self.set_status(SessionStatus::SwitchingSegment);
        self.finalize_open_segment(self.tracker.elapsed());

        let next_sequence = self.accumulator.next_sequence();
        let rotated = match self.encoder.as_mut() {
            Some(encoder) => encoder.rotate(next_sequence).await,
            None => Ok(()),
        };

        let now = Instant::now();
        if let Err(e) = rotated.and_then(|()| self.timer.roll_over(now)) {
            self.enter_error(e).await;
            return;
        }

        self.set_status(SessionStatus::Recording);
    }

    async fn on_encoder_event(&mut self, event: Option<EncoderEvent>) {
        match event {
            Some(EncoderEvent::Chunk(bytes)) => {
                if !self.status.accepts_chunks() {
                    warn!(
                        "Dropping {} byte chunk for {} while {:?}",
                        bytes.len(),
                        self.config.session_id,
                        self.status
                    );
                    return;
                }
                self.accumulator.append(bytes);
            }
            Some(EncoderEvent::Fault(e)) => self.enter_error(e).await,
            None => {
                self.encoder_events = None;
                if self.status.is_capturing() {
                    self.enter_error(CaptureError::DeviceUnavailable(
                        "input stream ended unexpectedly".to_string(),
                    ))
                    .await;
                }
            }
        }
    }

    // ------------------------------------------------------------------
    // Helpers
    // ------------------------------------------------------------------

    /// Move to Error, keeping every finalized segment
    async fn enter_error(&mut self, error: CaptureError) {
        let fault = CaptureFault {
            error,
            segment: self.accumulator.next_sequence(),
            chunk: self.accumulator.chunk_count(),
        };
        error!("Recording session {} failed: {}", self.config.session_id, fault);

        self.tracker.pause(Instant::now());
        self.timer.cancel();
        self.release_encoder().await;
        self.encoder_events = None;

        if self.config.finalize_on_error && self.accumulator.chunk_count() > 0 {
            self.finalize_open_segment(self.tracker.elapsed());
            self.accumulator.seal();
        }

        self.fault = Some(fault.clone());
        self.events.emit(SessionEvent::Fault(fault));
        self.set_status(SessionStatus::Error);
    }

    fn finalize_open_segment(&mut self, elapsed: u64) {
        let segment = self.accumulator.finalize(elapsed);
        info!(
            "Segment {} of {} complete: {}s - {}s ({} chunks, {} bytes)",
            segment.sequence_number(),
            self.config.session_id,
            segment.start_seconds(),
            segment.start_seconds() + segment.duration_seconds(),
            segment.chunk_count(),
            segment.byte_size()
        );
        if self.config.retain_payloads {
            self.segments.push(segment.clone());
        } else {
            self.segments.push(segment.detached());
        }
        self.events.emit(SessionEvent::SegmentCompleted(segment));
    }

    /// Ask the encoder for its final chunks and release the device
    async fn flush_encoder(&mut self) -> Vec<Vec<u8>> {
        let Some(mut encoder) = self.encoder.take() else {
            return Vec::new();
        };

        let trailing = match timeout(self.config.flush_timeout, encoder.finish()).await {
            Ok(Ok(chunks)) => chunks,
            Ok(Err(e)) => {
                warn!(
                    "Final flush failed for {}: {}; keeping captured audio",
                    self.config.session_id, e
                );
                Vec::new()
            }
            Err(_) => {
                warn!(
                    "Final flush for {} timed out after {:?}",
                    self.config.session_id, self.config.flush_timeout
                );
                Vec::new()
            }
        };

        // finish() may have bailed out before the device was released
        encoder.close().await;
        trailing
    }

    async fn release_encoder(&mut self) {
        if let Some(mut encoder) = self.encoder.take() {
            encoder.close().await;
        }
    }

    fn recording(&self) -> FinalRecording {
        FinalRecording {
            session_id: self.config.session_id.clone(),
            segments: self.segments.clone(),
            total_duration_seconds: self.tracker.elapsed(),
            total_bytes: self.segments.iter().map(|s| s.byte_size() as u64).sum(),
            format: self.format,
            payloads_retained: self.config.retain_payloads,
        }
    }

    fn set_status(&mut self, status: SessionStatus) {
        if self.status == status {
            return;
        }
        debug!(
            "Session {}: {:?} -> {:?}",
            self.config.session_id, self.status, status
        );
        self.status = status;
        self.events.emit(SessionEvent::StatusChanged(status));
    }
}

async fn wait_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

async fn next_encoder_event(
    events: &mut Option<mpsc::UnboundedReceiver<EncoderEvent>>,
) -> Option<EncoderEvent> {
    match events {
        Some(events) => events.recv().await,
        None => std::future::pending().await,
    }
}
