// Scripted capture device shared by the integration tests
//
// The test drives the encoder by hand: `push` queues a chunk, `fail`
// raises a fault, `hang_up` ends the stream. Every open and release is
// counted so tests can check that no path leaks the device.

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use loqa_capture::capture::{AudioInput, CaptureConstraints, EncoderEvent, EncoderSession};
use loqa_capture::{CaptureError, EncodedFormat, SessionEvent};
use tokio::sync::mpsc;

pub const FORMAT: EncodedFormat = EncodedFormat::PcmS16Le {
    sample_rate: 16000,
    channels: 1,
};

#[derive(Default)]
pub struct FakeDevice {
    pub opens: AtomicUsize,
    pub releases: AtomicUsize,
    pub rotations: Mutex<Vec<u32>>,
    sender: Mutex<Option<mpsc::UnboundedSender<EncoderEvent>>>,
    open_delay: Duration,
    open_error: Option<CaptureError>,
    rotate_error_at: Option<u32>,
    trailing: Vec<Vec<u8>>,
}

impl FakeDevice {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_open_delay(mut self, delay: Duration) -> Self {
        self.open_delay = delay;
        self
    }

    pub fn with_open_error(mut self, error: CaptureError) -> Self {
        self.open_error = Some(error);
        self
    }

    /// Fail `rotate` when the session moves on to this sequence number
    pub fn with_rotate_error_at(mut self, sequence: u32) -> Self {
        self.rotate_error_at = Some(sequence);
        self
    }

    /// Chunks returned by the final flush
    pub fn with_trailing(mut self, chunks: Vec<Vec<u8>>) -> Self {
        self.trailing = chunks;
        self
    }

    pub fn into_input(self) -> (Arc<FakeDevice>, Arc<dyn AudioInput>) {
        let device = Arc::new(self);
        let input: Arc<dyn AudioInput> = Arc::new(FakeInput(Arc::clone(&device)));
        (device, input)
    }

    pub fn push(&self, chunk: Vec<u8>) {
        if let Some(sender) = self.sender.lock().unwrap().as_ref() {
            let _ = sender.send(EncoderEvent::Chunk(chunk));
        }
    }

    pub fn fail(&self, error: CaptureError) {
        if let Some(sender) = self.sender.lock().unwrap().as_ref() {
            let _ = sender.send(EncoderEvent::Fault(error));
        }
    }

    /// End the event stream as if the device vanished
    pub fn hang_up(&self) {
        self.sender.lock().unwrap().take();
    }

    pub fn opens(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }

    pub fn releases(&self) -> usize {
        self.releases.load(Ordering::SeqCst)
    }

    pub fn is_streaming(&self) -> bool {
        self.sender.lock().unwrap().is_some()
    }
}

struct FakeInput(Arc<FakeDevice>);

#[async_trait::async_trait]
impl AudioInput for FakeInput {
    async fn open(
        &self,
        _constraints: &CaptureConstraints,
    ) -> Result<Box<dyn EncoderSession>, CaptureError> {
        if !self.0.open_delay.is_zero() {
            tokio::time::sleep(self.0.open_delay).await;
        }
        if let Some(error) = &self.0.open_error {
            return Err(error.clone());
        }

        self.0.opens.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(FakeEncoder {
            device: Arc::clone(&self.0),
            released: false,
        }))
    }

    fn name(&self) -> &str {
        "fake device"
    }
}

struct FakeEncoder {
    device: Arc<FakeDevice>,
    released: bool,
}

impl FakeEncoder {
    fn release(&mut self) {
        if !self.released {
            self.released = true;
            self.device.hang_up();
            self.device.releases.fetch_add(1, Ordering::SeqCst);
        }
    }
}

#[async_trait::async_trait]
impl EncoderSession for FakeEncoder {
    async fn begin(&mut self) -> Result<mpsc::UnboundedReceiver<EncoderEvent>, CaptureError> {
        let (tx, rx) = mpsc::unbounded_channel();
        *self.device.sender.lock().unwrap() = Some(tx);
        Ok(rx)
    }

    async fn pause(&mut self) -> Result<(), CaptureError> {
        Ok(())
    }

    async fn resume(&mut self) -> Result<(), CaptureError> {
        Ok(())
    }

    async fn rotate(&mut self, next_sequence: u32) -> Result<(), CaptureError> {
        self.device.rotations.lock().unwrap().push(next_sequence);
        if self.device.rotate_error_at == Some(next_sequence) {
            return Err(CaptureError::EncoderFault(format!(
                "cannot open sub-session {}",
                next_sequence
            )));
        }
        Ok(())
    }

    async fn finish(&mut self) -> Result<Vec<Vec<u8>>, CaptureError> {
        self.release();
        Ok(self.device.trailing.clone())
    }

    async fn close(&mut self) {
        self.release();
    }

    fn format(&self) -> EncodedFormat {
        FORMAT
    }
}

/// Push one `bytes`-sized chunk per second for `seconds` seconds.
/// Call it half a second off the tick grid so chunks never race a tick.
pub async fn feed(device: &FakeDevice, seconds: u64, bytes: usize) {
    for _ in 0..seconds {
        device.push(vec![0xAB; bytes]);
        tokio::time::sleep(Duration::from_secs(1)).await;
    }
}

/// Let the session actor drain whatever is queued
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(10)).await;
}

/// Everything currently buffered on an event stream
pub fn drain(events: &mut mpsc::UnboundedReceiver<SessionEvent>) -> Vec<SessionEvent> {
    let mut collected = Vec::new();
    while let Ok(event) = events.try_recv() {
        collected.push(event);
    }
    collected
}
