pub mod audio;
pub mod capture;
pub mod config;
pub mod error;
pub mod http;
pub mod nats;
pub mod session;
pub mod sink;

pub use audio::{
    AudioBackend, AudioBackendConfig, AudioBackendFactory, AudioFile, AudioFrame, AudioLevel,
    AudioSource, EncodedFormat, Encoder, PcmEncoder,
};
pub use capture::{AudioInput, BackendInput, CaptureConstraints, EncoderEvent, EncoderSession};
pub use config::Config;
pub use error::{CaptureError, CaptureFault, FaultKind, StartError, StopError};
pub use http::{create_router, AppState};
pub use nats::{NatsClient, NatsSegmentSink, SegmentMessage};
pub use session::{
    EventStream, FinalRecording, RecordingSession, RecoveryPolicy, Segment, SessionConfig,
    SessionEvent, SessionStats, SessionStatus, StopOutcome,
};
pub use sink::{spawn_segment_forwarder, FileSegmentSink, SegmentSink};
