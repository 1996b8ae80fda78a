//! Transactional outbox relay with idempotent event consumption
//!
//! Write-side services commit an entity change and an outbox row together.
//! A relay worker drains the outbox through a polling loop and an optional
//! push queue, decodes each row through an explicit event registry, and
//! publishes a `{type, timestamp, data}` envelope to JetStream or to an
//! in-process bus. Consumers receive envelopes, dispatch them by type and
//! apply them idempotently.
//!
//! ```text
//! service ──(entity + outbox row)──> outbox ──> relay ──> publisher
//!                                                           │
//!             service replica <── dispatcher <── consumer <─┘
//! ```

pub mod app;
pub mod cache;
pub mod config;
pub mod consumer;
pub mod domain;
pub mod envelope;
pub mod errors;
pub mod jetstream;
pub mod nats;
pub mod outbox;
pub mod publisher;
pub mod registry;
pub mod relay;
pub mod service;
pub mod shutdown;
pub mod subjects;
pub mod tasks;

// Re-export commonly used types
pub use app::OutboxApp;
pub use config::{AppConfig, BusKind, ConsumerConfig, RelayConfig};
pub use consumer::{ConsumerAdapter, DispatchOutcome, EventDispatcher, MessageHandler, Transport};
pub use envelope::IntegrationEvent;
pub use errors::{OutboxError, OutboxResult};
pub use outbox::{InMemoryOutboxStore, OutboxEvent, OutboxStore};
pub use publisher::{
    BusMessage, EventPublisher, InMemoryEventBus, NatsPublisher, PublishError, TopicRouter,
};
pub use registry::{DecodedEvent, EventRegistry, PartitionKey, RegistryError};
pub use relay::{RelayHandle, RelayQueue, RelayWorker};
pub use shutdown::{Shutdown, ShutdownListener};
