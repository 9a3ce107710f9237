use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::handle::CaptureHandle;
use crate::audio::{
    AudioBackendConfig, AudioBackendFactory, AudioFrame, AudioLevel, AudioSource, EncodedFormat,
    Encoder, LevelTap, PcmEncoder,
};
use crate::error::CaptureError;

/// Format requested from the input device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaptureConstraints {
    pub sample_rate: u32,
    pub channels: u16,
}

impl Default for CaptureConstraints {
    fn default() -> Self {
        Self {
            sample_rate: 16000,
            channels: 1,
        }
    }
}

/// Output of a running encoder
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EncoderEvent {
    Chunk(Vec<u8>),
    Fault(CaptureError),
}

/// Device access capability
///
/// Opening acquires the device exclusively and returns the encoder bound
/// to it. Dropping the returned session without `finish` or `close`
/// leaks the device until its handle is dropped.
#[async_trait::async_trait]
pub trait AudioInput: Send + Sync {
    async fn open(
        &self,
        constraints: &CaptureConstraints,
    ) -> Result<Box<dyn EncoderSession>, CaptureError>;

    fn name(&self) -> &str;
}

/// Encoder capability bound to one open device
///
/// Faults are reported on the event stream and never retried here; the
/// recording session decides what to do with them.
#[async_trait::async_trait]
pub trait EncoderSession: Send {
    /// Start producing chunks
    async fn begin(&mut self) -> Result<mpsc::UnboundedReceiver<EncoderEvent>, CaptureError>;

    /// Suspend chunk production; buffered audio is kept
    async fn pause(&mut self) -> Result<(), CaptureError>;

    async fn resume(&mut self) -> Result<(), CaptureError>;

    /// Called at every segment boundary before recording continues.
    /// Platforms whose containers cannot span a boundary start a new
    /// encoder sub-session here.
    async fn rotate(&mut self, _next_sequence: u32) -> Result<(), CaptureError> {
        Ok(())
    }

    /// Flush and close the device, returning the trailing chunks.
    /// Chunks already on the event stream stay there; the stream ends
    /// once this returns.
    async fn finish(&mut self) -> Result<Vec<Vec<u8>>, CaptureError>;

    /// Release the device without flushing
    async fn close(&mut self);

    fn format(&self) -> EncodedFormat;
}

/// Production input: an `AudioBackend` feeding a PCM encoder
pub struct BackendInput {
    name: String,
    source: AudioSource,
    buffer_duration_ms: u64,
    min_chunk_bytes: usize,
    tap: LevelTap,
}

impl BackendInput {
    pub fn new(source: AudioSource) -> Self {
        let name = match &source {
            AudioSource::Tone { frequency_hz } => format!("tone:{}", frequency_hz),
            AudioSource::File(path) => format!("file:{}", path.display()),
        };

        Self {
            name,
            source,
            buffer_duration_ms: AudioBackendConfig::default().buffer_duration_ms,
            min_chunk_bytes: 0,
            tap: LevelTap::new(),
        }
    }

    pub fn with_buffer_duration_ms(mut self, ms: u64) -> Self {
        self.buffer_duration_ms = ms;
        self
    }

    /// Batch encoded output into chunks of at least this many bytes
    pub fn with_min_chunk_bytes(mut self, bytes: usize) -> Self {
        self.min_chunk_bytes = bytes;
        self
    }

    /// Subscribe to the level tap of every session opened from this input
    pub fn levels(&self) -> watch::Receiver<AudioLevel> {
        self.tap.subscribe()
    }
}

#[async_trait::async_trait]
impl AudioInput for BackendInput {
    async fn open(
        &self,
        constraints: &CaptureConstraints,
    ) -> Result<Box<dyn EncoderSession>, CaptureError> {
        let config = AudioBackendConfig {
            target_sample_rate: constraints.sample_rate,
            target_channels: constraints.channels,
            buffer_duration_ms: self.buffer_duration_ms,
        };
        let source = self.source.clone();

        // File sources decode the whole file up front
        let backend = tokio::task::spawn_blocking(move || AudioBackendFactory::create(source, config))
            .await
            .map_err(|e| CaptureError::DeviceUnavailable(format!("backend setup failed: {}", e)))??;

        let (handle, frames) = CaptureHandle::open(backend).await?;
        let (sample_rate, channels) = handle
            .stream_format()
            .unwrap_or((constraints.sample_rate, constraints.channels));

        let encoder = PcmEncoder::new(sample_rate, channels).with_min_chunk_bytes(self.min_chunk_bytes);

        Ok(Box::new(FrameEncoderSession::new(
            handle,
            frames,
            Box::new(encoder),
            self.tap.clone(),
        )))
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// Pumps device frames through an `Encoder` on a background task
pub struct FrameEncoderSession {
    handle: CaptureHandle,
    frames: Option<mpsc::Receiver<AudioFrame>>,
    encoder: Option<Box<dyn Encoder>>,
    format: EncodedFormat,
    paused: Arc<AtomicBool>,
    tap: LevelTap,
    pump: Option<JoinHandle<Result<Vec<u8>, CaptureError>>>,
}

impl FrameEncoderSession {
    pub fn new(
        handle: CaptureHandle,
        frames: mpsc::Receiver<AudioFrame>,
        encoder: Box<dyn Encoder>,
        tap: LevelTap,
    ) -> Self {
        let format = encoder.format();
        Self {
            handle,
            frames: Some(frames),
            encoder: Some(encoder),
            format,
            paused: Arc::new(AtomicBool::new(false)),
            tap,
            pump: None,
        }
    }
}

#[async_trait::async_trait]
impl EncoderSession for FrameEncoderSession {
    async fn begin(&mut self) -> Result<mpsc::UnboundedReceiver<EncoderEvent>, CaptureError> {
        let (Some(mut frames), Some(mut encoder)) = (self.frames.take(), self.encoder.take())
        else {
            return Err(CaptureError::EncoderFault(
                "encoder already started".to_string(),
            ));
        };

        let (tx, rx) = mpsc::unbounded_channel();
        let paused = Arc::clone(&self.paused);
        let tap = self.tap.clone();
        let device = self.handle.device().to_string();

        let pump = tokio::spawn(async move {
            debug!("Encoder pump started for {}", device);

            while let Some(frame) = frames.recv().await {
                tap.publish(&frame);

                if paused.load(Ordering::SeqCst) {
                    continue;
                }

                match encoder.encode(&frame) {
                    Ok(bytes) if bytes.is_empty() => {}
                    Ok(bytes) => {
                        if tx.send(EncoderEvent::Chunk(bytes)).is_err() {
                            warn!("Encoder event receiver dropped for {}", device);
                            break;
                        }
                    }
                    Err(e) => {
                        let _ = tx.send(EncoderEvent::Fault(e.clone()));
                        return Err(e);
                    }
                }
            }

            debug!("Encoder pump finished for {}", device);
            encoder.flush()
        });

        self.pump = Some(pump);
        info!("Encoding started on {}", self.handle.device());

        Ok(rx)
    }

    async fn pause(&mut self) -> Result<(), CaptureError> {
        self.paused.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn resume(&mut self) -> Result<(), CaptureError> {
        self.paused.store(false, Ordering::SeqCst);
        Ok(())
    }

    async fn finish(&mut self) -> Result<Vec<Vec<u8>>, CaptureError> {
        // Stopping the device closes the frame channel, which ends the pump
        let released = self.handle.release().await;

        let trailing = match self.pump.take() {
            Some(pump) => pump
                .await
                .map_err(|e| CaptureError::EncoderFault(format!("encoder pump failed: {}", e)))??,
            None => Vec::new(),
        };

        released?;

        Ok(if trailing.is_empty() {
            Vec::new()
        } else {
            vec![trailing]
        })
    }

    async fn close(&mut self) {
        if let Some(pump) = self.pump.take() {
            pump.abort();
        }
        if let Err(e) = self.handle.release().await {
            warn!("Failed to release {}: {}", self.handle.device(), e);
        }
    }

    fn format(&self) -> EncodedFormat {
        self.format
    }
}
