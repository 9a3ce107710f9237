//! Read-only level tap for visualization
//!
//! The capture pump publishes one `AudioLevel` per frame on a watch
//! channel. Nobody has to listen; a missing or dropped receiver never
//! affects capture.

use std::sync::Arc;

use serde::Serialize;
use tokio::sync::watch;

use super::backend::AudioFrame;

/// RMS and peak of one frame, normalized to 0.0..=1.0
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct AudioLevel {
    pub rms: f32,
    pub peak: f32,
    pub timestamp_ms: u64,
}

impl AudioLevel {
    pub fn measure(frame: &AudioFrame) -> Self {
        if frame.samples.is_empty() {
            return Self {
                timestamp_ms: frame.timestamp_ms,
                ..Self::default()
            };
        }

        let mut sum_squares = 0.0f64;
        let mut peak = 0.0f32;
        for &sample in &frame.samples {
            let value = sample as f32 / i16::MAX as f32;
            sum_squares += (value as f64) * (value as f64);
            peak = peak.max(value.abs());
        }

        Self {
            rms: (sum_squares / frame.samples.len() as f64).sqrt() as f32,
            peak: peak.min(1.0),
            timestamp_ms: frame.timestamp_ms,
        }
    }
}

/// Producer side of the tap
#[derive(Debug, Clone)]
pub struct LevelTap {
    tx: Arc<watch::Sender<AudioLevel>>,
}

impl LevelTap {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(AudioLevel::default());
        Self { tx: Arc::new(tx) }
    }

    pub fn subscribe(&self) -> watch::Receiver<AudioLevel> {
        self.tx.subscribe()
    }

    pub fn publish(&self, frame: &AudioFrame) {
        if self.tx.receiver_count() == 0 {
            return;
        }
        self.tx.send_replace(AudioLevel::measure(frame));
    }
}

impl Default for LevelTap {
    fn default() -> Self {
        Self::new()
    }
}
