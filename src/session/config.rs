use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::capture::CaptureConstraints;

/// Configuration for a recording session
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Unique session identifier (e.g., "meeting-2025-10-28-standup")
    pub session_id: String,

    /// Active recording time per segment before a boundary is forced
    /// Default: 600 seconds (10 minutes). Fixed once the session starts.
    pub segment_duration: Duration,

    /// How long `start()` waits for the device to open
    pub start_timeout: Duration,

    /// How long `stop()` waits for the encoder's final flush
    pub flush_timeout: Duration,

    /// Finalize the open segment automatically when a fault ends the session
    pub finalize_on_error: bool,

    /// Keep finalized payloads so `stop()` can hand back the audio.
    /// When false only segment metadata is kept and the audio lives
    /// wherever the segment sinks put it.
    pub retain_payloads: bool,

    /// Format requested from the input device
    pub constraints: CaptureConstraints,
}

impl SessionConfig {
    pub fn new(session_id: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            ..Self::default()
        }
    }

    pub fn with_segment_duration(mut self, segment_duration: Duration) -> Self {
        self.segment_duration = segment_duration;
        self
    }

    pub fn with_retain_payloads(mut self, retain_payloads: bool) -> Self {
        self.retain_payloads = retain_payloads;
        self
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            session_id: format!("meeting-{}", uuid::Uuid::new_v4()),
            segment_duration: Duration::from_secs(600), // 10 minutes
            start_timeout: Duration::from_secs(10),
            flush_timeout: Duration::from_secs(5),
            finalize_on_error: false,
            retain_payloads: true,
            constraints: CaptureConstraints::default(),
        }
    }
}
