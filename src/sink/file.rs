use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

use super::SegmentSink;
use crate::audio::{file::write_pcm_wav, EncodedFormat};
use crate::session::Segment;

/// Writes every segment to its own file as soon as it is finalized
///
/// PCM segments become WAV files; any other format is written as-is.
pub struct FileSegmentSink {
    output_dir: PathBuf,
    format: EncodedFormat,
}

impl FileSegmentSink {
    pub fn new(output_dir: impl Into<PathBuf>, format: EncodedFormat) -> Result<Self> {
        let output_dir = output_dir.into();
        fs::create_dir_all(&output_dir).context("Failed to create output directory")?;

        Ok(Self { output_dir, format })
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    pub fn segment_path(&self, session_id: &str, sequence_number: u32) -> PathBuf {
        self.output_dir.join(format!(
            "{}-segment-{:03}.{}",
            session_id,
            sequence_number,
            self.format.extension()
        ))
    }
}

#[async_trait::async_trait]
impl SegmentSink for FileSegmentSink {
    async fn deliver(&self, session_id: &str, segment: &Segment) -> Result<()> {
        let sequence = segment.sequence_number();
        let path = self.segment_path(session_id, sequence);
        let format = self.format;
        let segment = segment.clone();
        let target = path.clone();

        tokio::task::spawn_blocking(move || match format {
            EncodedFormat::PcmS16Le {
                sample_rate,
                channels,
            } => write_pcm_wav(&target, segment.payload(), sample_rate, channels),
            EncodedFormat::Opaque => fs::write(&target, segment.payload())
                .with_context(|| format!("Failed to write segment file: {:?}", target)),
        })
        .await
        .context("Segment writer task panicked")??;

        info!("Segment {} written: {}", sequence, path.display());

        Ok(())
    }

    fn name(&self) -> &str {
        "file"
    }
}
