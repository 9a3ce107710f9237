//! Recording session management
//!
//! This module provides the `RecordingSession` state machine that manages:
//! - Device acquisition and release through the capture adapter
//! - Segment boundaries driven by a per-session segment timer
//! - Active-time tracking across pause/resume
//! - Segment and status delivery to subscribers
//! - Final reassembly on stop, and recovery after faults

mod accumulator;
mod actor;
mod config;
mod events;
mod recording;
mod session;
mod stats;
mod status;
pub mod timer;

pub use accumulator::{Segment, SegmentAccumulator, SegmentSummary};
pub use config::SessionConfig;
pub use events::{EventStream, SessionEvent};
pub use recording::{FinalRecording, RecordingSummary, RecoveryPolicy, StopOutcome};
pub use session::RecordingSession;
pub use stats::SessionStats;
pub use status::SessionStatus;
pub use timer::{DurationTracker, SegmentTimer};
