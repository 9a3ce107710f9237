use anyhow::{bail, Context, Result};
use hound::WavReader;
use std::path::Path;
use std::sync::Arc;
use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{interval, Duration, MissedTickBehavior};
use tracing::{info, warn};

use super::backend::{AudioBackend, AudioBackendConfig, AudioFrame};
use crate::error::CaptureError;

pub struct AudioFile {
    pub path: String,
    pub duration_seconds: f64,
    pub sample_rate: u32,
    pub channels: u16,
    pub samples: Vec<i16>,
}

impl AudioFile {
    /// Open an audio file; WAV is read directly, other formats are decoded
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        info!("Opening audio file: {}", path.display());

        let is_wav = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.eq_ignore_ascii_case("wav"))
            .unwrap_or(false);

        let (samples, sample_rate, channels) = if is_wav {
            read_wav(path)?
        } else {
            decode(path)?
        };

        if sample_rate == 0 || channels == 0 {
            bail!("Audio file has no usable stream: {}", path.display());
        }

        let duration_seconds = samples.len() as f64 / (sample_rate as f64 * channels as f64);

        info!(
            "Audio file loaded: {:.1}s, {}Hz, {} channels, {} samples",
            duration_seconds,
            sample_rate,
            channels,
            samples.len()
        );

        Ok(Self {
            path: path.display().to_string(),
            duration_seconds,
            sample_rate,
            channels,
            samples,
        })
    }
}

fn read_wav(path: &Path) -> Result<(Vec<i16>, u32, u16)> {
    let reader = WavReader::open(path).context("Failed to open WAV file")?;

    let spec = reader.spec();
    let samples: Vec<i16> = reader
        .into_samples::<i16>()
        .collect::<Result<Vec<_>, _>>()
        .context("Failed to read audio samples")?;

    Ok((samples, spec.sample_rate, spec.channels))
}

/// Write little-endian i16 PCM bytes as a WAV file
pub fn write_pcm_wav(path: &Path, pcm: &[u8], sample_rate: u32, channels: u16) -> Result<()> {
    let spec = hound::WavSpec {
        channels,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    let mut writer = hound::WavWriter::create(path, spec)
        .with_context(|| format!("Failed to create WAV file: {:?}", path))?;

    for pair in pcm.chunks_exact(2) {
        writer
            .write_sample(i16::from_le_bytes([pair[0], pair[1]]))
            .context("Failed to write sample to WAV")?;
    }

    writer.finalize().context("Failed to finalize WAV file")?;

    Ok(())
}

fn decode(path: &Path) -> Result<(Vec<i16>, u32, u16)> {
    let file = std::fs::File::open(path)
        .with_context(|| format!("Failed to open audio file: {}", path.display()))?;
    let mss = MediaSourceStream::new(Box::new(file), Default::default());

    let mut hint = Hint::new();
    if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
        hint.with_extension(ext);
    }

    let probed = symphonia::default::get_probe()
        .format(
            &hint,
            mss,
            &FormatOptions::default(),
            &MetadataOptions::default(),
        )
        .context("Unsupported audio format")?;
    let mut format = probed.format;

    let track = format
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
        .context("No decodable audio track")?;
    let track_id = track.id;
    let mut sample_rate = track.codec_params.sample_rate.unwrap_or(0);
    let mut channels = track
        .codec_params
        .channels
        .map(|c| c.count() as u16)
        .unwrap_or(0);

    let mut decoder = symphonia::default::get_codecs()
        .make(&track.codec_params, &DecoderOptions::default())
        .context("Failed to create decoder")?;

    let mut samples = Vec::new();
    loop {
        let packet = match format.next_packet() {
            Ok(packet) => packet,
            Err(SymphoniaError::IoError(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                break
            }
            Err(e) => return Err(e).context("Failed to read packet"),
        };
        if packet.track_id() != track_id {
            continue;
        }

        match decoder.decode(&packet) {
            Ok(decoded) => {
                let spec = *decoded.spec();
                sample_rate = spec.rate;
                channels = spec.channels.count() as u16;
                let mut buf = SampleBuffer::<i16>::new(decoded.capacity() as u64, spec);
                buf.copy_interleaved_ref(decoded);
                samples.extend_from_slice(buf.samples());
            }
            Err(SymphoniaError::DecodeError(e)) => {
                warn!("Skipping undecodable packet: {}", e);
            }
            Err(e) => return Err(e).context("Failed to decode audio"),
        }
    }

    Ok((samples, sample_rate, channels))
}

/// Replays a decoded file in real time, looping at the end
///
/// Frames carry the file's own sample rate and channel count; only the
/// buffer duration is taken from the backend config.
pub struct FileBackend {
    name: String,
    audio: Arc<AudioFile>,
    buffer_duration_ms: u64,
    stop_tx: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<()>>,
}

impl FileBackend {
    pub fn open(path: &Path, config: AudioBackendConfig) -> Result<Self> {
        let audio = AudioFile::open(path)?;
        if audio.samples.is_empty() {
            bail!("Audio file contains no samples");
        }

        if audio.sample_rate != config.target_sample_rate
            || audio.channels != config.target_channels
        {
            warn!(
                "File format {}Hz/{}ch differs from requested {}Hz/{}ch; replaying as-is",
                audio.sample_rate, audio.channels, config.target_sample_rate, config.target_channels
            );
        }

        Ok(Self {
            name: format!("file replay ({})", audio.path),
            audio: Arc::new(audio),
            buffer_duration_ms: config.buffer_duration_ms.max(1),
            stop_tx: None,
            task: None,
        })
    }
}

#[async_trait::async_trait]
impl AudioBackend for FileBackend {
    async fn start(&mut self) -> Result<mpsc::Receiver<AudioFrame>, CaptureError> {
        if self.task.is_some() {
            return Err(CaptureError::DeviceUnavailable(
                "file replay already capturing".to_string(),
            ));
        }

        info!("Starting {}", self.name);

        let audio = Arc::clone(&self.audio);
        let buffer_ms = self.buffer_duration_ms;
        let samples_per_buffer = ((audio.sample_rate as u64 * buffer_ms / 1000) as usize
            * audio.channels as usize)
            .max(audio.channels as usize);

        let (tx, rx) = mpsc::channel(100);
        let (stop_tx, mut stop_rx) = oneshot::channel();

        let task = tokio::spawn(async move {
            let mut ticker = interval(Duration::from_millis(buffer_ms));
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            let mut position = 0;
            let mut timestamp_ms = 0;

            loop {
                tokio::select! {
                    _ = &mut stop_rx => break,
                    _ = ticker.tick() => {}
                }

                let mut samples = Vec::with_capacity(samples_per_buffer);
                while samples.len() < samples_per_buffer {
                    let end = (position + samples_per_buffer - samples.len()).min(audio.samples.len());
                    samples.extend_from_slice(&audio.samples[position..end]);
                    position = if end == audio.samples.len() { 0 } else { end };
                }

                let frame = AudioFrame {
                    samples,
                    sample_rate: audio.sample_rate,
                    channels: audio.channels,
                    timestamp_ms,
                };
                timestamp_ms += buffer_ms;

                if tx.send(frame).await.is_err() {
                    warn!("File replay receiver dropped");
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
                CaptureError::DeviceUnavailable(format!("file replay task failed: {}", e))
            })?;
            info!("Stopped {}", self.name);
        }
        Ok(())
    }

    fn is_capturing(&self) -> bool {
        self.task.is_some()
    }

    fn stream_format(&self) -> (u32, u16) {
        (self.audio.sample_rate, self.audio.channels)
    }

    fn name(&self) -> &str {
        &self.name
    }
}
