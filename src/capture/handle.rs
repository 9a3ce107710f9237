use tokio::sync::mpsc;
use tracing::{error, info, warn};

use crate::audio::{AudioBackend, AudioFrame};
use crate::error::CaptureError;

/// Exclusive ownership of an input device for the lifetime of a session
///
/// The device is released by `release()`. A handle dropped while still
/// open stops its backend on the current runtime and logs an error, since
/// a leaked device stays blocked for the rest of the process.
pub struct CaptureHandle {
    backend: Option<Box<dyn AudioBackend>>,
    device: String,
}

impl CaptureHandle {
    /// Open the device and start its frame stream
    pub async fn open(
        mut backend: Box<dyn AudioBackend>,
    ) -> Result<(Self, mpsc::Receiver<AudioFrame>), CaptureError> {
        let device = backend.name().to_string();
        info!("Opening capture device: {}", device);

        let frames = backend.start().await?;

        Ok((
            Self {
                backend: Some(backend),
                device,
            },
            frames,
        ))
    }

    pub fn device(&self) -> &str {
        &self.device
    }

    pub fn is_open(&self) -> bool {
        self.backend.is_some()
    }

    /// Sample rate and channel count of the open device
    pub fn stream_format(&self) -> Option<(u32, u16)> {
        self.backend.as_ref().map(|b| b.stream_format())
    }

    /// Close the device. Calling this more than once is a no-op.
    pub async fn release(&mut self) -> Result<(), CaptureError> {
        let Some(mut backend) = self.backend.take() else {
            return Ok(());
        };

        info!("Releasing capture device: {}", self.device);
        backend.stop().await
    }
}

impl Drop for CaptureHandle {
    fn drop(&mut self) {
        let Some(mut backend) = self.backend.take() else {
            return;
        };

        error!(
            "Capture handle for {} dropped without release; stopping device",
            self.device
        );

        match tokio::runtime::Handle::try_current() {
            Ok(runtime) => {
                let device = self.device.clone();
                runtime.spawn(async move {
                    if let Err(e) = backend.stop().await {
                        warn!("Failed to stop leaked device {}: {}", device, e);
                    }
                });
            }
            Err(_) => warn!("No runtime available to stop device {}", self.device),
        }
    }
}
