use serde::Serialize;

use super::backend::AudioFrame;
use crate::error::CaptureError;

/// Format of the bytes an encoder produces
///
/// The capture core never looks inside the payload; the format only tells
/// sinks how to store it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EncodedFormat {
    /// Interleaved signed 16-bit little-endian PCM
    PcmS16Le { sample_rate: u32, channels: u16 },
    /// Anything else; stored byte-for-byte
    Opaque,
}

impl EncodedFormat {
    /// File extension sinks use for a payload of this format
    pub fn extension(&self) -> &'static str {
        match self {
            EncodedFormat::PcmS16Le { .. } => "wav",
            EncodedFormat::Opaque => "bin",
        }
    }
}

/// Turns live frames into encoded chunks
pub trait Encoder: Send {
    /// Encode one frame; an empty result means "nothing to emit yet"
    fn encode(&mut self, frame: &AudioFrame) -> Result<Vec<u8>, CaptureError>;

    /// Emit whatever is still buffered
    fn flush(&mut self) -> Result<Vec<u8>, CaptureError>;

    fn format(&self) -> EncodedFormat;
}

/// Pass-through encoder producing raw PCM, batching small frames
///
/// Frames whose format differs from the one the encoder was opened with
/// are an encoder fault: the chunk stream has a single format.
pub struct PcmEncoder {
    sample_rate: u32,
    channels: u16,
    min_chunk_bytes: usize,
    pending: Vec<u8>,
}

impl PcmEncoder {
    pub fn new(sample_rate: u32, channels: u16) -> Self {
        Self {
            sample_rate,
            channels,
            min_chunk_bytes: 0,
            pending: Vec::new(),
        }
    }

    /// Hold bytes back until at least `bytes` are buffered
    pub fn with_min_chunk_bytes(mut self, bytes: usize) -> Self {
        self.min_chunk_bytes = bytes;
        self
    }
}

impl Encoder for PcmEncoder {
    fn encode(&mut self, frame: &AudioFrame) -> Result<Vec<u8>, CaptureError> {
        if frame.sample_rate != self.sample_rate || frame.channels != self.channels {
            return Err(CaptureError::EncoderFault(format!(
                "frame format changed mid-stream: {}Hz/{}ch, expected {}Hz/{}ch",
                frame.sample_rate, frame.channels, self.sample_rate, self.channels
            )));
        }

        self.pending
            .extend(frame.samples.iter().flat_map(|s| s.to_le_bytes()));

        if self.pending.len() >= self.min_chunk_bytes {
            Ok(std::mem::take(&mut self.pending))
        } else {
            Ok(Vec::new())
        }
    }

    fn flush(&mut self) -> Result<Vec<u8>, CaptureError> {
        Ok(std::mem::take(&mut self.pending))
    }

    fn format(&self) -> EncodedFormat {
        EncodedFormat::PcmS16Le {
            sample_rate: self.sample_rate,
            channels: self.channels,
        }
    }
}
