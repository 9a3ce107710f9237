use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

use crate::audio::AudioSource;
use crate::capture::CaptureConstraints;
use crate::session::SessionConfig;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub service: ServiceConfig,
    #[serde(default)]
    pub capture: CaptureConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub nats: NatsConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServiceConfig {
    pub name: String,
    pub http: HttpConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct HttpConfig {
    pub bind: String,
    pub port: u16,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    /// `tone`, `tone:<hz>`, `file:<path>` or a bare path
    pub source: String,
    pub sample_rate: u32,
    pub channels: u16,
    pub buffer_duration_ms: u64,
    pub segment_duration_secs: u64,
    pub start_timeout_ms: u64,
    pub flush_timeout_ms: u64,
    pub finalize_on_error: bool,
    /// Keep segment audio in memory until stop; when false the full
    /// recording is only available from the per-segment files
    pub retain_segment_payloads: bool,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            source: "tone".to_string(),
            sample_rate: 16000,
            channels: 1,
            buffer_duration_ms: 100,
            segment_duration_secs: 600,
            start_timeout_ms: 10_000,
            flush_timeout_ms: 5_000,
            finalize_on_error: false,
            retain_segment_payloads: true,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Supports `~` expansion
    pub recordings_path: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            recordings_path: "./recordings".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct NatsConfig {
    pub enabled: bool,
    pub url: String,
}

impl Default for NatsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            url: "nats://localhost:4222".to_string(),
        }
    }
}

impl Config {
    /// Load from a file (extension picks the format) with `LOQA__*`
    /// environment overrides, e.g. `LOQA__CAPTURE__SOURCE=tone:880`
    pub fn load(path: &str) -> Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::with_name(path))
            .add_source(config::Environment::with_prefix("LOQA").separator("__"))
            .build()
            .with_context(|| format!("Failed to load config from {}", path))?;

        Ok(settings.try_deserialize()?)
    }

    pub fn from_toml_str(toml: &str) -> Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::from_str(toml, config::FileFormat::Toml))
            .build()?;

        Ok(settings.try_deserialize()?)
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.service.http.bind, self.service.http.port)
    }
}

impl CaptureConfig {
    pub fn audio_source(&self) -> AudioSource {
        AudioSource::parse(&self.source)
    }

    /// Session settings for one recording; the id comes from the caller
    pub fn session_config(&self, session_id: impl Into<String>) -> SessionConfig {
        SessionConfig {
            session_id: session_id.into(),
            segment_duration: Duration::from_secs(self.segment_duration_secs),
            start_timeout: Duration::from_millis(self.start_timeout_ms),
            flush_timeout: Duration::from_millis(self.flush_timeout_ms),
            finalize_on_error: self.finalize_on_error,
            retain_payloads: self.retain_segment_payloads,
            constraints: CaptureConstraints {
                sample_rate: self.sample_rate,
                channels: self.channels,
            },
        }
    }
}

impl StorageConfig {
    pub fn recordings_dir(&self) -> PathBuf {
        PathBuf::from(shellexpand::tilde(&self.recordings_path).into_owned())
    }
}
