//! Transport over a JetStream durable pull consumer
//!
//! Messages are acknowledged explicitly in [`Transport::commit`]. A message
//! that is never committed (process crash mid-handler) is redelivered by the
//! server after the consumer's ack wait.

use async_nats::jetstream::{self, consumer::PullConsumer};
use async_trait::async_trait;
use futures::StreamExt;
use tracing::warn;

use super::{ReceiveError, Transport, TransportMessage};
use crate::errors::{OutboxError, OutboxResult};
use crate::subjects::PARTITION_KEY_HEADER;

/// Pull-based JetStream transport
pub struct NatsTransport {
    name: String,
    messages: jetstream::consumer::pull::Stream,
    pending: Option<jetstream::Message>,
}

impl NatsTransport {
    /// Start pulling from a durable consumer
    pub async fn new(consumer: PullConsumer, name: impl Into<String>) -> OutboxResult<Self> {
        let messages = consumer
            .messages()
            .await
            .map_err(|e| OutboxError::JetStream(e.to_string()))?;

        Ok(Self {
            name: name.into(),
            messages,
            pending: None,
        })
    }
}

#[async_trait]
impl Transport for NatsTransport {
    async fn receive(&mut self) -> Result<Option<TransportMessage>, ReceiveError> {
        let message = match self.messages.next().await {
            Some(Ok(message)) => message,
            Some(Err(err)) => return Err(ReceiveError::transport(err)),
            None => return Ok(None),
        };

        let key = message
            .headers
            .as_ref()
            .and_then(|headers| headers.get(PARTITION_KEY_HEADER))
            .map(|value| value.as_str().to_string());

        let received = TransportMessage {
            subject: message.subject.to_string(),
            key,
            payload: message.payload.clone(),
        };

        if let Some(previous) = self.pending.replace(message) {
            warn!(
                consumer = %self.name,
                subject = %previous.subject,
                "Previous message was never committed, it will be redelivered"
            );
        }

        Ok(Some(received))
    }

    async fn commit(&mut self, _message: &TransportMessage) -> Result<(), ReceiveError> {
        match self.pending.take() {
            Some(message) => message.ack().await.map_err(ReceiveError::commit),
            None => Ok(()),
        }
    }

    fn describe(&self) -> String {
        format!("jetstream:{}", self.name)
    }
}
