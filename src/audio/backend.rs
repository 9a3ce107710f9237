use std::path::PathBuf;

use tokio::sync::mpsc;

use crate::error::CaptureError;

/// Audio sample data (16-bit PCM, interleaved)
#[derive(Debug, Clone)]
pub struct AudioFrame {
    /// Raw audio samples (i16 PCM, interleaved)
    pub samples: Vec<i16>,
    /// Sample rate in Hz
    pub sample_rate: u32,
    /// Number of channels
    pub channels: u16,
    /// Timestamp in milliseconds since capture started
    pub timestamp_ms: u64,
}

impl AudioFrame {
    /// Duration of this frame in milliseconds
    pub fn duration_ms(&self) -> u64 {
        if self.sample_rate == 0 || self.channels == 0 {
            return 0;
        }
        let frames = self.samples.len() as u64 / self.channels as u64;
        frames * 1000 / self.sample_rate as u64
    }
}

/// Configuration for audio backend
#[derive(Debug, Clone)]
pub struct AudioBackendConfig {
    /// Target sample rate
    pub target_sample_rate: u32,
    /// Target channel count (1 = mono, 2 = stereo)
    pub target_channels: u16,
    /// Buffer size in milliseconds (affects latency)
    pub buffer_duration_ms: u64,
}

impl Default for AudioBackendConfig {
    fn default() -> Self {
        Self {
            target_sample_rate: 16000, // 16kHz speech
            target_channels: 1,        // Mono
            buffer_duration_ms: 100,   // 100ms buffers
        }
    }
}

/// Audio capture backend trait
///
/// A backend is the live-input primitive: it opens the physical (or
/// simulated) device and pushes frames until stopped. Dropping the
/// receiver side does not release the device; `stop` must be called.
#[async_trait::async_trait]
pub trait AudioBackend: Send + Sync {
    /// Start capturing audio
    ///
    /// Returns a channel receiver that will receive audio frames. The
    /// channel closes after `stop` or when the device goes away.
    async fn start(&mut self) -> Result<mpsc::Receiver<AudioFrame>, CaptureError>;

    /// Stop capturing audio
    async fn stop(&mut self) -> Result<(), CaptureError>;

    /// Check if backend is currently capturing
    fn is_capturing(&self) -> bool;

    /// Sample rate and channel count of the frames this backend emits
    fn stream_format(&self) -> (u32, u16);

    /// Get backend name for logging
    fn name(&self) -> &str;
}

/// Audio source type
#[derive(Debug, Clone, PartialEq)]
pub enum AudioSource {
    /// Synthetic sine tone (soak tests, demos)
    Tone { frequency_hz: f32 },
    /// File replayed in real time as if it were a live input
    File(PathBuf),
}

impl AudioSource {
    /// Parse `tone`, `tone:<hz>` or `file:<path>`; anything else is a path
    pub fn parse(source: &str) -> Self {
        if source == "tone" {
            return AudioSource::Tone {
                frequency_hz: 440.0,
            };
        }
        if let Some(hz) = source.strip_prefix("tone:") {
            if let Ok(frequency_hz) = hz.parse() {
                return AudioSource::Tone { frequency_hz };
            }
        }
        let path = source.strip_prefix("file:").unwrap_or(source);
        AudioSource::File(PathBuf::from(path))
    }
}

/// Audio backend factory
pub struct AudioBackendFactory;

impl AudioBackendFactory {
    /// Create audio backend for the given source
    pub fn create(
        source: AudioSource,
        config: AudioBackendConfig,
    ) -> Result<Box<dyn AudioBackend>, CaptureError> {
        match source {
            AudioSource::Tone { frequency_hz } => {
                Ok(Box::new(super::tone::ToneBackend::new(config, frequency_hz)))
            }
            AudioSource::File(path) => {
                let backend = super::file::FileBackend::open(&path, config).map_err(|e| {
                    CaptureError::DeviceUnavailable(format!("{}: {:#}", path.display(), e))
                })?;
                Ok(Box::new(backend))
            }
        }
    }
}
