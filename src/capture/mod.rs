//! Adapter between the recording session and the platform
//!
//! - `CaptureHandle`: exclusive ownership of the input device
//! - `AudioInput`: device access capability (`open`)
//! - `EncoderSession`: encoder bound to an open device (chunk/fault events)

mod handle;
mod session;

pub use handle::CaptureHandle;
pub use session::{
    AudioInput, BackendInput, CaptureConstraints, EncoderEvent, EncoderSession,
    FrameEncoderSession,
};
