//! In-process fan-out bus
//!
//! A bus serves exactly one topic. Every subscriber gets its own bounded
//! channel; `publish` offers the encoded envelope, together with the event's
//! partition key, to each channel without waiting, so a slow or vanished
//! subscriber only loses its own copy.

use async_trait::async_trait;
use bytes::Bytes;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::RwLock;
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{debug, warn};

use super::{EventPublisher, PublishError};
use crate::envelope::IntegrationEvent;
use crate::registry::DecodedEvent;

/// One delivery on the bus
#[derive(Debug, Clone, PartialEq)]
pub struct BusMessage {
    /// Partition key of the event, the in-process stand-in for a broker key
    pub key: Option<String>,
    /// Encoded [`IntegrationEvent`]
    pub payload: Bytes,
}

/// Non-durable fan-out bus for a single topic
#[derive(Debug)]
pub struct InMemoryEventBus {
    topic: String,
    subscribers: RwLock<Vec<mpsc::Sender<BusMessage>>>,
    dropped: AtomicU64,
}

impl InMemoryEventBus {
    pub fn new(topic: impl Into<String>) -> Self {
        Self {
            topic: topic.into(),
            subscribers: RwLock::new(Vec::new()),
            dropped: AtomicU64::new(0),
        }
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Attach a subscriber with its own buffer of `buffer` messages
    pub fn subscribe(&self, buffer: usize) -> mpsc::Receiver<BusMessage> {
        let (tx, rx) = mpsc::channel(buffer.max(1));
        self.write_subscribers().push(tx);
        rx
    }

    /// Number of live subscribers
    pub fn subscriber_count(&self) -> usize {
        self.read_subscribers()
            .iter()
            .filter(|tx| !tx.is_closed())
            .count()
    }

    /// Deliveries skipped because a subscriber buffer was full
    pub fn dropped_count(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    fn read_subscribers(&self) -> std::sync::RwLockReadGuard<'_, Vec<mpsc::Sender<BusMessage>>> {
        self.subscribers
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write_subscribers(&self) -> std::sync::RwLockWriteGuard<'_, Vec<mpsc::Sender<BusMessage>>> {
        self.subscribers
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn distribute(&self, event_id: &uuid::Uuid, message: BusMessage) -> bool {
        let mut saw_closed = false;

        for tx in self.read_subscribers().iter() {
            match tx.try_send(message.clone()) {
                Ok(()) => {}
                Err(TrySendError::Full(_)) => {
                    self.dropped.fetch_add(1, Ordering::Relaxed);
                    warn!(
                        topic = %self.topic,
                        event_id = %event_id,
                        "Subscriber buffer full, delivery dropped"
                    );
                }
                Err(TrySendError::Closed(_)) => saw_closed = true,
            }
        }

        saw_closed
    }
}

#[async_trait]
impl EventPublisher for InMemoryEventBus {
    async fn publish(&self, event: &DecodedEvent) -> Result<(), PublishError> {
        if event.topic != self.topic {
            debug!(
                bus_topic = %self.topic,
                event_topic = %event.topic,
                event_id = %event.event_id,
                "Event not for this bus, ignored"
            );
            return Ok(());
        }

        let message = BusMessage {
            key: event.partition_key.clone(),
            payload: Bytes::from(IntegrationEvent::from_decoded(event).to_bytes()?),
        };

        if self.distribute(&event.event_id, message) {
            self.write_subscribers().retain(|tx| !tx.is_closed());
        }

        debug!(topic = %self.topic, event_id = %event.event_id, "Event distributed");
        Ok(())
    }
}
