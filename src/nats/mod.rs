pub mod client;
pub mod messages;
mod sink;

pub use client::{segment_message, NatsClient};
pub use messages::{RecordingCompleteMessage, SegmentMessage};
pub use sink::NatsSegmentSink;
