use std::path::Path;

use anyhow::{bail, Result};
use serde::Serialize;

use super::accumulator::{Segment, SegmentSummary};
use crate::audio::{file::write_pcm_wav, EncodedFormat};

/// All segments of a finished recording plus summary metadata
#[derive(Debug, Clone, PartialEq)]
pub struct FinalRecording {
    pub session_id: String,
    /// Segments in sequence order
    pub segments: Vec<Segment>,
    pub total_duration_seconds: u64,
    pub total_bytes: u64,
    pub format: EncodedFormat,
    /// False when the session kept only segment metadata
    pub payloads_retained: bool,
}

impl FinalRecording {
    /// The full recording: all payloads in sequence order. Empty when
    /// payloads were not retained.
    pub fn concat(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(self.total_bytes as usize);
        for segment in &self.segments {
            bytes.extend_from_slice(segment.payload());
        }
        bytes
    }

    pub fn sequence_numbers(&self) -> Vec<u32> {
        self.segments.iter().map(|s| s.sequence_number()).collect()
    }

    /// Write the reassembled recording as a WAV file (PCM recordings only)
    pub fn write_wav(&self, path: impl AsRef<Path>) -> Result<()> {
        if !self.payloads_retained {
            bail!(
                "Recording {} kept no segment audio; use the delivered segments",
                self.session_id
            );
        }
        match self.format {
            EncodedFormat::PcmS16Le {
                sample_rate,
                channels,
            } => write_pcm_wav(path.as_ref(), &self.concat(), sample_rate, channels),
            EncodedFormat::Opaque => bail!("Recording format is opaque; cannot write WAV"),
        }
    }

    pub fn summary(&self) -> RecordingSummary {
        RecordingSummary {
            session_id: self.session_id.clone(),
            segments: self.segments.iter().map(Segment::summary).collect(),
            total_duration_seconds: self.total_duration_seconds,
            total_bytes: self.total_bytes,
            format: self.format,
            payloads_retained: self.payloads_retained,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RecordingSummary {
    pub session_id: String,
    pub segments: Vec<SegmentSummary>,
    pub total_duration_seconds: u64,
    pub total_bytes: u64,
    pub format: EncodedFormat,
    pub payloads_retained: bool,
}

/// Successful result of `stop()`
///
/// `Empty` means no audio was ever captured; it is a normal outcome that
/// callers treat as "nothing to save", not as a failure.
#[derive(Debug, Clone, PartialEq)]
pub enum StopOutcome {
    Completed(FinalRecording),
    Empty {
        session_id: String,
        duration_seconds: u64,
    },
}

impl StopOutcome {
    pub fn is_empty(&self) -> bool {
        matches!(self, StopOutcome::Empty { .. })
    }

    pub fn recording(&self) -> Option<&FinalRecording> {
        match self {
            StopOutcome::Completed(recording) => Some(recording),
            StopOutcome::Empty { .. } => None,
        }
    }

    pub fn into_recording(self) -> Option<FinalRecording> {
        match self {
            StopOutcome::Completed(recording) => Some(recording),
            StopOutcome::Empty { .. } => None,
        }
    }
}

/// What to hand back from a session that ended in `Error`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecoveryPolicy {
    /// Only segments finalized before the fault
    FinalizedOnly,
    /// Also finalize the chunks of the segment that was open at the fault
    FinalizeOpenSegment,
}
