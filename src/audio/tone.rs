// Synthetic tone backend
//
// Produces a continuous sine wave at the configured rate, paced by the
// tokio clock. Used as the daemon's default source and for long-running
// soak tests where no physical device is available.

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{interval, Duration, MissedTickBehavior};
use tracing::{info, warn};

use super::backend::{AudioBackend, AudioBackendConfig, AudioFrame};
use crate::error::CaptureError;

pub struct ToneBackend {
    config: AudioBackendConfig,
    frequency_hz: f32,
    stop_tx: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<()>>,
}

impl ToneBackend {
    pub fn new(config: AudioBackendConfig, frequency_hz: f32) -> Self {
        Self {
            config,
            frequency_hz,
            stop_tx: None,
            task: None,
        }
    }
}

#[async_trait::async_trait]
impl AudioBackend for ToneBackend {
    async fn start(&mut self) -> Result<mpsc::Receiver<AudioFrame>, CaptureError> {
        if self.task.is_some() {
            return Err(CaptureError::DeviceUnavailable(
                "tone generator already capturing".to_string(),
            ));
        }

        let sample_rate = self.config.target_sample_rate;
        let channels = self.config.target_channels.max(1);
        let buffer_ms = self.config.buffer_duration_ms.max(1);
        let frequency = self.frequency_hz;
        let frames_per_buffer = (sample_rate as u64 * buffer_ms / 1000) as usize;

        info!(
            "Starting tone generator ({:.0}Hz at {}Hz, {} channels)",
            frequency, sample_rate, channels
        );

        let (tx, rx) = mpsc::channel(100);
        let (stop_tx, mut stop_rx) = oneshot::channel();

        let task = tokio::spawn(async move {
            let mut ticker = interval(Duration::from_millis(buffer_ms));
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            let mut phase: u64 = 0;
            let mut timestamp_ms = 0;

            loop {
                tokio::select! {
                    _ = &mut stop_rx => break,
                    _ = ticker.tick() => {}
                }

                let mut samples = Vec::with_capacity(frames_per_buffer * channels as usize);
                for _ in 0..frames_per_buffer {
                    let t = phase as f32 / sample_rate as f32;
                    let value = (t * frequency * std::f32::consts::TAU).sin() * 0.25;
                    let sample = (value * i16::MAX as f32) as i16;
                    for _ in 0..channels {
                        samples.push(sample);
                    }
                    phase += 1;
                }

                let frame = AudioFrame {
                    samples,
                    sample_rate,
                    channels,
                    timestamp_ms,
                };
                timestamp_ms += buffer_ms;

                if tx.send(frame).await.is_err() {
                    warn!("Tone generator receiver dropped");
                    break;
                }
            }
        });

        self.stop_tx = Some(stop_tx);
        self.task = Some(task);

        Ok(rx)
    }

    async fn stop(&mut self) -> Result<(), CaptureError> {
        if let Some(stop_tx) = self.stop_tx.take() {
            let _ = stop_tx.send(());
        }
        if let Some(task) = self.task.take() {
            task.await.map_err(|e| {
                CaptureError::DeviceUnavailable(format!("tone generator task failed: {}", e))
            })?;
            info!("Tone generator stopped");
        }
        Ok(())
    }

    fn is_capturing(&self) -> bool {
        self.task.is_some()
    }

    fn stream_format(&self) -> (u32, u16) {
        (
            self.config.target_sample_rate,
            self.config.target_channels.max(1),
        )
    }

    fn name(&self) -> &str {
        "tone generator"
    }
}
