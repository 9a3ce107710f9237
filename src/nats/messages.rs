use serde::{Deserialize, Serialize};

/// Finalized segment published to NATS
#[derive(Debug, Serialize, Deserialize)]
pub struct SegmentMessage {
    pub session_id: String,
    pub sequence: u32,
    pub payload: String,  // Base64-encoded segment bytes
    pub byte_size: usize,
    pub start_seconds: u64,
    pub duration_seconds: u64,
    pub timestamp: String,  // RFC3339 timestamp
}

/// Published once the session stops, after its last segment
#[derive(Debug, Serialize, Deserialize)]
pub struct RecordingCompleteMessage {
    pub session_id: String,
    pub segments: usize,
    pub total_bytes: u64,
    pub total_duration_seconds: u64,
    pub timestamp: String,
}
