use crate::capture::AudioInput;
use crate::config::{CaptureConfig, StorageConfig};
use crate::nats::NatsClient;
use crate::session::{EventStream, RecordingSession};
use crate::sink::{spawn_segment_forwarder, ForwarderReport, SegmentSink};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use tokio::sync::RwLock;
use tokio::task::JoinHandle;

/// A forwarder task and the name of the sink it feeds
pub struct SinkForwarder {
    pub sink: String,
    pub handle: JoinHandle<ForwarderReport>,
}

impl SinkForwarder {
    pub fn spawn(session_id: String, events: EventStream, sink: Arc<dyn SegmentSink>) -> Self {
        Self {
            sink: sink.name().to_string(),
            handle: spawn_segment_forwarder(session_id, events, sink),
        }
    }
}

/// A live session together with the tasks forwarding its segments
pub struct ManagedSession {
    pub session: RecordingSession,
    pub forwarders: Vec<SinkForwarder>,
}

/// Shared application state for HTTP handlers
#[derive(Clone)]
pub struct AppState {
    /// Active recording sessions (meeting_id → session)
    pub sessions: Arc<RwLock<HashMap<String, ManagedSession>>>,
    /// Meeting ids whose session is still starting
    starting: Arc<Mutex<HashSet<String>>>,
    pub input: Arc<dyn AudioInput>,
    pub capture: CaptureConfig,
    pub storage: StorageConfig,
    pub nats: Option<NatsClient>,
}

/// Claim on a meeting id while its session starts; dropping it frees the id
pub struct Reservation {
    starting: Arc<Mutex<HashSet<String>>>,
    meeting_id: String,
}

impl Drop for Reservation {
    fn drop(&mut self) {
        let mut starting = self.starting.lock().unwrap_or_else(|e| e.into_inner());
        starting.remove(&self.meeting_id);
    }
}

impl AppState {
    pub fn new(input: Arc<dyn AudioInput>, capture: CaptureConfig, storage: StorageConfig) -> Self {
        Self {
            sessions: Arc::new(RwLock::new(HashMap::new())),
            starting: Arc::new(Mutex::new(HashSet::new())),
            input,
            capture,
            storage,
            nats: None,
        }
    }

    pub fn with_nats(mut self, client: NatsClient) -> Self {
        self.nats = Some(client);
        self
    }

    /// Claim `meeting_id` for a new session. `None` if a session with that
    /// id is live or still starting.
    ///
    /// Keep the reservation until the session is in `sessions`.
    pub async fn reserve(&self, meeting_id: &str) -> Option<Reservation> {
        let sessions = self.sessions.read().await;
        let mut starting = self.starting.lock().unwrap_or_else(|e| e.into_inner());

        if sessions.contains_key(meeting_id) || !starting.insert(meeting_id.to_string()) {
            return None;
        }

        Some(Reservation {
            starting: Arc::clone(&self.starting),
            meeting_id: meeting_id.to_string(),
        })
    }

    /// Discard every live session, e.g. on shutdown
    pub async fn discard_all(&self) -> usize {
        let drained: Vec<ManagedSession> = {
            let mut sessions = self.sessions.write().await;
            sessions.drain().map(|(_, managed)| managed).collect()
        };
        let count = drained.len();

        futures::future::join_all(drained.iter().map(|managed| managed.session.discard())).await;

        count
    }
}
