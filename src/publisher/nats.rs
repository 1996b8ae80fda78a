//! JetStream publisher for relayed events
//!
//! Each event lands on `events.{topic}.{event_type}` with the outbox id as
//! `Nats-Msg-Id`. The publish is only considered done once the stream acked
//! it, so an `Ok` from [`NatsPublisher::publish`] means the event is stored by
//! the broker.

use async_nats::{jetstream, HeaderMap};
use async_trait::async_trait;
use tracing::debug;

use super::{EventPublisher, PublishError};
use crate::envelope::IntegrationEvent;
use crate::registry::DecodedEvent;
use crate::subjects::{
    event_subject, EVENTS_ROOT, EVENT_TYPE_HEADER, MSG_ID_HEADER, PARTITION_KEY_HEADER,
};

/// Durable broker adapter
#[derive(Clone)]
pub struct NatsPublisher {
    jetstream: jetstream::Context,
    root: String,
}

impl NatsPublisher {
    pub fn new(jetstream: jetstream::Context) -> Self {
        Self {
            jetstream,
            root: EVENTS_ROOT.to_string(),
        }
    }

    /// Publish under a different subject root
    pub fn with_root(mut self, root: impl Into<String>) -> Self {
        self.root = root.into();
        self
    }

    /// Subject an event is published on
    pub fn subject_for(&self, event: &DecodedEvent) -> String {
        event_subject(&self.root, &event.topic, &event.event_type)
    }
}

/// Headers attached to every published event
pub(crate) fn event_headers(event: &DecodedEvent) -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(MSG_ID_HEADER, event.event_id.to_string().as_str());
    headers.insert(EVENT_TYPE_HEADER, event.event_type.as_str());
    if let Some(key) = &event.partition_key {
        headers.insert(PARTITION_KEY_HEADER, key.as_str());
    }
    headers
}

#[async_trait]
impl EventPublisher for NatsPublisher {
    async fn publish(&self, event: &DecodedEvent) -> Result<(), PublishError> {
        let subject = self.subject_for(event);
        let payload = IntegrationEvent::from_decoded(event).to_bytes()?;

        let ack = self
            .jetstream
            .publish_with_headers(subject.clone(), event_headers(event), payload.into())
            .await
            .map_err(PublishError::broker)?
            .await
            .map_err(PublishError::broker)?;

        debug!(
            subject = %subject,
            event_id = %event.event_id,
            stream_sequence = ack.sequence,
            duplicate = ack.duplicate,
            "Event stored by JetStream"
        );

        Ok(())
    }
}
