use anyhow::Result;

use super::NatsClient;
use crate::session::Segment;
use crate::sink::SegmentSink;

/// Publishes each segment on `audio.segment.<session>`
pub struct NatsSegmentSink {
    client: NatsClient,
}

impl NatsSegmentSink {
    pub fn new(client: NatsClient) -> Self {
        Self { client }
    }
}

#[async_trait::async_trait]
impl SegmentSink for NatsSegmentSink {
    async fn deliver(&self, session_id: &str, segment: &Segment) -> Result<()> {
        self.client.publish_segment(session_id, segment).await
    }

    fn name(&self) -> &str {
        "nats"
    }
}
