use std::sync::Arc;

use serde::Serialize;
use tracing::warn;

/// One finalized piece of a recording
///
/// Immutable once created. The payload is shared, so handing a segment to
/// several subscribers never copies the audio.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Segment {
    sequence_number: u32,
    payload: Arc<[u8]>,
    byte_size: usize,
    chunk_count: usize,
    start_seconds: u64,
    duration_seconds: u64,
}

impl Segment {
    /// Position in the recording, starting at 1
    pub fn sequence_number(&self) -> u32 {
        self.sequence_number
    }

    /// Empty for a detached segment
    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// Size of the encoded audio, kept after the payload is detached
    pub fn byte_size(&self) -> usize {
        self.byte_size
    }

    pub fn has_payload(&self) -> bool {
        self.payload.len() == self.byte_size
    }

    /// Same metadata without the audio
    pub fn detached(&self) -> Segment {
        Segment {
            payload: Arc::from(Vec::new()),
            ..self.clone()
        }
    }

    pub fn chunk_count(&self) -> usize {
        self.chunk_count
    }

    /// Recording time (seconds of active capture) at which this segment opened
    pub fn start_seconds(&self) -> u64 {
        self.start_seconds
    }

    pub fn duration_seconds(&self) -> u64 {
        self.duration_seconds
    }

    pub fn summary(&self) -> SegmentSummary {
        SegmentSummary {
            sequence_number: self.sequence_number,
            byte_size: self.byte_size(),
            chunk_count: self.chunk_count,
            start_seconds: self.start_seconds,
            duration_seconds: self.duration_seconds,
        }
    }
}

/// Segment metadata without the payload
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SegmentSummary {
    pub sequence_number: u32,
    pub byte_size: usize,
    pub chunk_count: usize,
    pub start_seconds: u64,
    pub duration_seconds: u64,
}

/// Buffers the chunks of the open segment
///
/// `finalize` is the only place segments are created, whether the boundary
/// comes from the segment timer or from stop.
#[derive(Debug)]
pub struct SegmentAccumulator {
    chunks: Vec<Vec<u8>>,
    buffered_bytes: usize,
    next_sequence: u32,
    opened_at_seconds: u64,
    total_bytes: u64,
    sealed: bool,
}

impl SegmentAccumulator {
    pub fn new() -> Self {
        Self {
            chunks: Vec::new(),
            buffered_bytes: 0,
            next_sequence: 1,
            opened_at_seconds: 0,
            total_bytes: 0,
            sealed: false,
        }
    }

    /// Buffer a chunk for the open segment. Returns false (and drops the
    /// chunk) once the accumulator has been sealed.
    pub fn append(&mut self, chunk: Vec<u8>) -> bool {
        if self.sealed {
            warn!(
                "Dropping {} byte chunk that arrived after the final segment",
                chunk.len()
            );
            return false;
        }
        if chunk.is_empty() {
            return true;
        }

        self.buffered_bytes += chunk.len();
        self.total_bytes += chunk.len() as u64;
        self.chunks.push(chunk);
        true
    }

    /// Close the open segment at `elapsed_seconds` of recording time
    pub fn finalize(&mut self, elapsed_seconds: u64) -> Segment {
        let mut payload = Vec::with_capacity(self.buffered_bytes);
        let chunk_count = self.chunks.len();
        for chunk in self.chunks.drain(..) {
            payload.extend_from_slice(&chunk);
        }

        let segment = Segment {
            sequence_number: self.next_sequence,
            byte_size: payload.len(),
            payload: Arc::from(payload),
            chunk_count,
            start_seconds: self.opened_at_seconds,
            duration_seconds: elapsed_seconds.saturating_sub(self.opened_at_seconds),
        };

        self.next_sequence += 1;
        self.opened_at_seconds = elapsed_seconds.max(self.opened_at_seconds);
        self.buffered_bytes = 0;

        segment
    }

    /// Reject every later append
    pub fn seal(&mut self) {
        self.sealed = true;
    }

    pub fn is_sealed(&self) -> bool {
        self.sealed
    }

    /// Drop everything and start over at sequence 1
    pub fn reset(&mut self) {
        *self = Self::new();
    }

    pub fn chunk_count(&self) -> usize {
        self.chunks.len()
    }

    pub fn buffered_bytes(&self) -> usize {
        self.buffered_bytes
    }

    /// Sequence number the open segment will get
    pub fn next_sequence(&self) -> u32 {
        self.next_sequence
    }

    /// Bytes ever appended, finalized or not
    pub fn total_bytes(&self) -> u64 {
        self.total_bytes
    }

    pub fn open_duration(&self, elapsed_seconds: u64) -> u64 {
        elapsed_seconds.saturating_sub(self.opened_at_seconds)
    }
}

impl Default for SegmentAccumulator {
    fn default() -> Self {
        Self::new()
    }
}
