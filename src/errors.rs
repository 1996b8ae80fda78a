//! Error types for outbox operations

use thiserror::Error;
use uuid::Uuid;

/// Errors that can occur while storing, relaying or configuring outbox events
#[derive(Debug, Error)]
pub enum OutboxError {
    /// The outbox row does not exist (never written, or deleted on completion)
    #[error("Outbox event not found: {0}")]
    EventNotFound(Uuid),

    /// An outbox row with this id was already written
    #[error("Outbox event already exists: {0}")]
    DuplicateEvent(Uuid),

    /// Storage backend error
    #[error("Outbox store error: {0}")]
    Store(String),

    /// NATS connection error
    #[error("NATS connection error: {0}")]
    NatsConnection(String),

    /// JetStream stream or consumer setup error
    #[error("JetStream setup error: {0}")]
    JetStream(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Configuration(String),
}

/// Result type for outbox operations
pub type OutboxResult<T> = Result<T, OutboxError>;

impl From<async_nats::Error> for OutboxError {
    fn from(err: async_nats::Error) -> Self {
        OutboxError::NatsConnection(err.to_string())
    }
}

impl From<serde_json::Error> for OutboxError {
    fn from(err: serde_json::Error) -> Self {
        OutboxError::Serialization(err.to_string())
    }
}
