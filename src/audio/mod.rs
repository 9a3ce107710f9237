pub mod backend;
pub mod encoder;
pub mod file;
pub mod level;
pub mod tone;

pub use backend::{AudioBackend, AudioBackendConfig, AudioBackendFactory, AudioFrame, AudioSource};
pub use encoder::{EncodedFormat, Encoder, PcmEncoder};
pub use file::{AudioFile, FileBackend};
pub use level::{AudioLevel, LevelTap};
pub use tone::ToneBackend;
