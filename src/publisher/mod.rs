// Copyright (c) 2025 - Cowboy AI, Inc.

//! Event publishers
//!
//! One contract, two transports with different guarantees:
//!
//! - [`NatsPublisher`] writes to JetStream and waits for the stream's ack. A
//!   broker failure is handed back unchanged so the relay can apply its retry
//!   policy.
//! - [`InMemoryEventBus`] fans out to local subscribers and never blocks. It is
//!   not durable; end-to-end durability comes from the outbox itself.
//!
//! [`TopicRouter`] puts several single-topic publishers behind one relay.
//!
//! Cancelling a publish means dropping its future.

use async_trait::async_trait;
use thiserror::Error;

use crate::registry::DecodedEvent;

pub mod memory;
pub mod nats;
pub mod router;

pub use memory::{BusMessage, InMemoryEventBus};
pub use nats::NatsPublisher;
pub use router::TopicRouter;

/// Error types for event publishing
#[derive(Debug, Error)]
pub enum PublishError {
    /// Transport or broker failure, passed through untouched
    #[error("Broker error: {0}")]
    Broker(#[source] async_nats::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// No publisher is attached for the event's topic
    #[error("No route for topic '{0}'")]
    NoRoute(String),
}

impl PublishError {
    /// Wrap any transport error
    pub fn broker<E>(err: E) -> Self
    where
        E: Into<async_nats::Error>,
    {
        PublishError::Broker(err.into())
    }
}

/// Sends a decoded event to a transport
#[async_trait]
pub trait EventPublisher: Send + Sync {
    async fn publish(&self, event: &DecodedEvent) -> Result<(), PublishError>;
}
