use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};

use super::actor::{Command, SessionActor};
use super::config::SessionConfig;
use super::events::EventStream;
use super::recording::{FinalRecording, RecoveryPolicy, StopOutcome};
use super::stats::SessionStats;
use crate::capture::AudioInput;
use crate::error::{SessionClosed, StartError, StopError};

/// Handle to a continuous segmented recording session
///
/// Cloning the handle shares the session. The session's actor runs until
/// the last handle is dropped, at which point any open device is released.
#[derive(Clone)]
pub struct RecordingSession {
    session_id: Arc<str>,
    commands: mpsc::UnboundedSender<Command>,
}

impl RecordingSession {
    /// Create a session and spawn its actor on the current tokio runtime
    pub fn new(config: SessionConfig, input: Arc<dyn AudioInput>) -> Self {
        let session_id: Arc<str> = Arc::from(config.session_id.as_str());
        let (commands, commands_rx) = mpsc::unbounded_channel();

        tokio::spawn(SessionActor::new(config, input, commands_rx).run());

        Self {
            session_id,
            commands,
        }
    }

    pub fn id(&self) -> &str {
        &self.session_id
    }

    /// Open the input device and begin recording
    ///
    /// Waits until the device is open or the start timeout expires. A
    /// `discard()` issued meanwhile resolves this with `Discarded`.
    pub async fn start(&self) -> Result<(), StartError> {
        let (tx, rx) = oneshot::channel();
        self.send(Command::Start(tx))
            .map_err(|_| StartError::SessionClosed)?;
        rx.await.unwrap_or(Err(StartError::SessionClosed))
    }

    /// Returns false unless the session was Recording
    pub async fn pause(&self) -> bool {
        let (tx, rx) = oneshot::channel();
        if self.send(Command::Pause(tx)).is_err() {
            return false;
        }
        rx.await.unwrap_or(false)
    }

    /// Returns false unless the session was Paused
    pub async fn resume(&self) -> bool {
        let (tx, rx) = oneshot::channel();
        if self.send(Command::Resume(tx)).is_err() {
            return false;
        }
        rx.await.unwrap_or(false)
    }

    /// Flush the encoder, finalize the last segment and release the device
    pub async fn stop(&self) -> Result<StopOutcome, StopError> {
        let (tx, rx) = oneshot::channel();
        self.send(Command::Stop(tx))
            .map_err(|_| StopError::SessionClosed)?;
        rx.await.unwrap_or(Err(StopError::SessionClosed))
    }

    /// Drop everything captured so far and return to Idle
    pub async fn discard(&self) {
        let (tx, rx) = oneshot::channel();
        if self.send(Command::Discard(tx)).is_ok() {
            let _ = rx.await;
        }
    }

    /// Same as `discard`
    pub async fn reset(&self) {
        self.discard().await
    }

    /// Subscribe to status, duration, segment and fault events
    ///
    /// Events emitted before the subscription are not replayed.
    pub fn subscribe(&self) -> EventStream {
        let (tx, rx) = mpsc::unbounded_channel();
        let _ = self.send(Command::Subscribe(tx));
        rx
    }

    pub async fn stats(&self) -> Result<SessionStats, SessionClosed> {
        let (tx, rx) = oneshot::channel();
        self.send(Command::Stats(tx)).map_err(|_| SessionClosed)?;
        rx.await.map_err(|_| SessionClosed)
    }

    /// Retrieve what was captured before a fault ended the session
    ///
    /// Returns None unless the session is in `Error` with at least one
    /// segment to hand back.
    pub async fn recover(&self, policy: RecoveryPolicy) -> Option<FinalRecording> {
        let (tx, rx) = oneshot::channel();
        self.send(Command::Recover(policy, tx)).ok()?;
        rx.await.ok().flatten()
    }

    fn send(&self, command: Command) -> Result<(), SessionClosed> {
        self.commands.send(command).map_err(|_| SessionClosed)
    }
}
