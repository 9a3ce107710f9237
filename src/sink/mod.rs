//! Segment delivery to upload/storage collaborators
//!
//! A sink receives each finalized segment as soon as the session emits it,
//! while recording is still in progress. Delivery failures are logged and
//! not retried.

mod file;

pub use file::FileSegmentSink;

use std::sync::Arc;

use anyhow::Result;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use crate::session::{EventStream, Segment, SessionEvent, SessionStatus};

#[async_trait::async_trait]
pub trait SegmentSink: Send + Sync {
    async fn deliver(&self, session_id: &str, segment: &Segment) -> Result<()>;

    fn name(&self) -> &str;
}

/// Totals reported by a finished forwarder
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ForwarderReport {
    pub delivered: usize,
    pub failed: usize,
}

/// Drain a session's events into a sink until the session completes,
/// comes back empty, is discarded, or its actor exits
///
/// Subscribe before calling `start()` so no segment is missed. A session
/// in `Error` keeps the forwarder alive: a later `recover` may still
/// finalize one more segment.
pub fn spawn_segment_forwarder(
    session_id: String,
    mut events: EventStream,
    sink: Arc<dyn SegmentSink>,
) -> JoinHandle<ForwarderReport> {
    tokio::spawn(async move {
        let mut report = ForwarderReport::default();
        info!("Forwarding segments of {} to {}", session_id, sink.name());

        while let Some(event) = events.recv().await {
            match event {
                SessionEvent::SegmentCompleted(segment) => {
                    match sink.deliver(&session_id, &segment).await {
                        Ok(()) => {
                            report.delivered += 1;
                            debug!(
                                "Delivered segment {} of {} to {}",
                                segment.sequence_number(),
                                session_id,
                                sink.name()
                            );
                        }
                        Err(e) => {
                            report.failed += 1;
                            error!(
                                "Failed to deliver segment {} of {} to {}: {:#}",
                                segment.sequence_number(),
                                session_id,
                                sink.name(),
                                e
                            );
                        }
                    }
                }
                SessionEvent::StatusChanged(
                    SessionStatus::Completed | SessionStatus::Empty | SessionStatus::Idle,
                ) => break,
                _ => {}
            }
        }

        info!(
            "Segment forwarding for {} finished: {} delivered, {} failed",
            session_id, report.delivered, report.failed
        );
        report
    })
}
