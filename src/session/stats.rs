use chrono::{DateTime, Utc};
use serde::Serialize;

use super::status::SessionStatus;
use crate::audio::EncodedFormat;
use crate::error::CaptureFault;

/// Point-in-time view of a recording session
#[derive(Debug, Clone, Serialize)]
pub struct SessionStats {
    pub session_id: String,

    pub status: SessionStatus,

    /// When capture began (wall clock)
    pub started_at: Option<DateTime<Utc>>,

    /// Seconds of active recording (paused time excluded)
    pub elapsed_seconds: u64,

    pub segment_duration_seconds: u64,

    /// Seconds left until the next forced boundary
    pub segment_remaining_seconds: u64,

    /// Number of finalized segments
    pub segments_count: usize,

    /// Chunks buffered for the open segment
    pub open_segment_chunks: usize,

    pub open_segment_bytes: usize,

    /// Bytes captured so far, finalized or not
    pub total_bytes: u64,

    /// Format of the encoded chunks; `Opaque` until the device is open
    pub format: EncodedFormat,

    /// Fault that ended the session, if any
    pub fault: Option<CaptureFault>,
}
