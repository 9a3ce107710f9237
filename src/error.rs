//! Error taxonomy for the capture service
//!
//! Faults coming from the input device or the encoder are `CaptureError`s.
//! Each caller-facing operation has its own error type so callers can
//! pattern-match on the outcome instead of inspecting messages.

use serde::Serialize;
use thiserror::Error;

use crate::session::SessionStatus;

/// A fault raised by the input device, the encoder or the timers.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
#[serde(tag = "kind", content = "message", rename_all = "kebab-case")]
pub enum CaptureError {
    #[error("Audio input device unavailable: {0}")]
    DeviceUnavailable(String),

    #[error("Permission to use the audio input was denied: {0}")]
    PermissionDenied(String),

    #[error("Encoder fault: {0}")]
    EncoderFault(String),

    #[error("Failed to schedule timer: {0}")]
    TimerSchedulingFailure(String),
}

/// Fault kind without the message, for matching and display
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum FaultKind {
    DeviceUnavailable,
    PermissionDenied,
    EncoderFault,
    TimerSchedulingFailure,
}

impl CaptureError {
    pub fn kind(&self) -> FaultKind {
        match self {
            CaptureError::DeviceUnavailable(_) => FaultKind::DeviceUnavailable,
            CaptureError::PermissionDenied(_) => FaultKind::PermissionDenied,
            CaptureError::EncoderFault(_) => FaultKind::EncoderFault,
            CaptureError::TimerSchedulingFailure(_) => FaultKind::TimerSchedulingFailure,
        }
    }

    /// Whether the caller should offer the user a retry
    pub fn is_retryable(&self) -> bool {
        matches!(
            self.kind(),
            FaultKind::DeviceUnavailable | FaultKind::PermissionDenied
        )
    }
}

/// A fault together with the position in the recording where it occurred
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CaptureFault {
    pub error: CaptureError,
    /// Sequence number of the segment that was open when the fault occurred
    pub segment: u32,
    /// Index of the chunk within that segment (number of chunks already buffered)
    pub chunk: usize,
}

impl std::fmt::Display for CaptureFault {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} (segment {}, chunk {})",
            self.error, self.segment, self.chunk
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StartError {
    #[error(transparent)]
    Capture(#[from] CaptureError),

    #[error("Session cannot start while {0:?}")]
    InvalidState(SessionStatus),

    #[error("Session was discarded before the device opened")]
    Discarded,

    #[error("Session actor is no longer running")]
    SessionClosed,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StopError {
    #[error("Session cannot stop while {0:?}")]
    InvalidState(SessionStatus),

    #[error("Session actor is no longer running")]
    SessionClosed,
}

/// The session actor has exited
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("Session actor is no longer running")]
pub struct SessionClosed;
