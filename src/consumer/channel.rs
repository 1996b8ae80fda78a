//! Transport over an in-memory bus subscription

use async_trait::async_trait;
use tokio::sync::mpsc;

use super::{ReceiveError, Transport, TransportMessage};
use crate::publisher::{BusMessage, InMemoryEventBus};

/// Reads envelopes from an [`InMemoryEventBus`] subscriber channel
///
/// The key is the partition key the bus carried with the payload. The
/// in-memory bus needs no acknowledgement.
#[derive(Debug)]
pub struct ChannelTransport {
    topic: String,
    rx: mpsc::Receiver<BusMessage>,
}

impl ChannelTransport {
    pub fn new(topic: impl Into<String>, rx: mpsc::Receiver<BusMessage>) -> Self {
        Self {
            topic: topic.into(),
            rx,
        }
    }

    /// Subscribe to a bus and wrap the subscription
    pub fn subscribe(bus: &InMemoryEventBus, buffer: usize) -> Self {
        Self::new(bus.topic(), bus.subscribe(buffer))
    }
}

#[async_trait]
impl Transport for ChannelTransport {
    async fn receive(&mut self) -> Result<Option<TransportMessage>, ReceiveError> {
        Ok(self.rx.recv().await.map(|message| TransportMessage {
            subject: self.topic.clone(),
            key: message.key,
            payload: message.payload,
        }))
    }

    async fn commit(&mut self, _message: &TransportMessage) -> Result<(), ReceiveError> {
        Ok(())
    }

    fn describe(&self) -> String {
        format!("memory:{}", self.topic)
    }
}
