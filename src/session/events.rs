use tokio::sync::mpsc;

use super::accumulator::Segment;
use super::status::SessionStatus;
use crate::error::CaptureFault;

/// Everything a session tells its subscribers, in the order it happened
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    StatusChanged(SessionStatus),
    /// Seconds of active recording; never decreases
    DurationChanged(u64),
    SegmentCompleted(Segment),
    Fault(CaptureFault),
}

/// Receiving end of a subscription. Ends when the session actor exits.
pub type EventStream = mpsc::UnboundedReceiver<SessionEvent>;

/// Fan-out to subscribers
///
/// Channels are unbounded so a slow consumer (an uploader, say) never
/// loses a segment event. Closed subscribers are pruned on the next emit.
#[derive(Debug, Default)]
pub(crate) struct EventHub {
    subscribers: Vec<mpsc::UnboundedSender<SessionEvent>>,
}

impl EventHub {
    pub(crate) fn add(&mut self, subscriber: mpsc::UnboundedSender<SessionEvent>) {
        self.subscribers.push(subscriber);
    }

    pub(crate) fn emit(&mut self, event: SessionEvent) {
        self.subscribers
            .retain(|subscriber| subscriber.send(event.clone()).is_ok());
    }
}
