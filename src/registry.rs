// Copyright (c) 2025 - Cowboy AI, Inc.

//! Event Type Registry
//!
//! Maps an event type string (`"user.created"`) to the topic it is published
//! on and an explicit decode function for its payload. Each business domain
//! declares its own entries; the process merges them once at startup and hands
//! the resulting immutable [`EventRegistry`] to the relay by `Arc`.
//!
//! ```rust
//! use cim_outbox::registry::{EventRegistry, PartitionKey};
//! use serde::{Deserialize, Serialize};
//!
//! #[derive(Serialize, Deserialize)]
//! struct Pinged {
//!     id: String,
//! }
//!
//! impl PartitionKey for Pinged {
//!     fn partition_key(&self) -> Option<String> {
//!         Some(self.id.clone())
//!     }
//! }
//!
//! let registry = EventRegistry::builder()
//!     .register::<Pinged>("ping.sent", "ping")
//!     .build()
//!     .unwrap();
//! assert!(registry.contains("ping.sent"));
//! ```

use chrono::{DateTime, Utc};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;
use uuid::Uuid;

use crate::outbox::OutboxEvent;

/// Exposes the routing/ordering key of a typed event, if it has one
///
/// The broker publisher forwards the key so messages of one aggregate stay on
/// one partition.
pub trait PartitionKey {
    fn partition_key(&self) -> Option<String> {
        None
    }
}

/// Registry errors
#[derive(Debug, Error)]
pub enum RegistryError {
    /// Two merged domains declared the same event type
    #[error("Event type registered twice: {0}")]
    DuplicateEventType(String),

    /// No entry for the event type
    #[error("Unknown event type: {0}")]
    UnknownEventType(String),

    /// The payload does not decode into the registered shape
    #[error("Malformed payload for {event_type}: {source}")]
    MalformedPayload {
        event_type: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Output of a registered decode function
struct Decoded {
    data: Value,
    partition_key: Option<String>,
}

type DecodeFn = dyn Fn(&Value) -> Result<Decoded, serde_json::Error> + Send + Sync;

fn decode_as<T>(payload: &Value) -> Result<Decoded, serde_json::Error>
where
    T: DeserializeOwned + Serialize + PartitionKey,
{
    let typed = T::deserialize(payload)?;
    Ok(Decoded {
        data: serde_json::to_value(&typed)?,
        partition_key: typed.partition_key(),
    })
}

/// Registry entry for one event type
#[derive(Clone)]
pub struct EventMetadata {
    topic: String,
    target_shape: &'static str,
    decode: Arc<DecodeFn>,
}

impl EventMetadata {
    fn of<T>(topic: String) -> Self
    where
        T: DeserializeOwned + Serialize + PartitionKey + 'static,
    {
        Self {
            topic,
            target_shape: std::any::type_name::<T>(),
            decode: Arc::new(decode_as::<T>),
        }
    }

    /// Topic the event is published on
    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Name of the Rust type the payload decodes into
    pub fn target_shape(&self) -> &'static str {
        self.target_shape
    }
}

impl fmt::Debug for EventMetadata {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventMetadata")
            .field("topic", &self.topic)
            .field("target_shape", &self.target_shape)
            .finish_non_exhaustive()
    }
}

/// An outbox row whose payload passed its registered decoder
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedEvent {
    pub event_id: Uuid,
    pub event_type: String,
    pub topic: String,
    pub aggregate_type: String,
    pub aggregate_id: String,
    pub partition_key: Option<String>,
    pub occurred_at: DateTime<Utc>,
    /// Canonical serialization of the typed event
    pub data: Value,
}

/// Collects declarations from one or more domains
#[derive(Default)]
pub struct EventRegistryBuilder {
    entries: Vec<(String, EventMetadata)>,
}

impl EventRegistryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare `event_type` as decoding into `T` and publishing on `topic`
    pub fn register<T>(mut self, event_type: impl Into<String>, topic: impl Into<String>) -> Self
    where
        T: DeserializeOwned + Serialize + PartitionKey + 'static,
    {
        self.entries
            .push((event_type.into(), EventMetadata::of::<T>(topic.into())));
        self
    }

    /// Take over every declaration of another domain
    pub fn merge(mut self, other: EventRegistryBuilder) -> Self {
        self.entries.extend(other.entries);
        self
    }

    /// Freeze the declarations
    pub fn build(self) -> Result<EventRegistry, RegistryError> {
        let mut entries = HashMap::with_capacity(self.entries.len());
        for (event_type, metadata) in self.entries {
            if entries.contains_key(&event_type) {
                return Err(RegistryError::DuplicateEventType(event_type));
            }
            entries.insert(event_type, metadata);
        }
        Ok(EventRegistry { entries })
    }
}

/// Immutable event type lookup table
#[derive(Debug, Clone, Default)]
pub struct EventRegistry {
    entries: HashMap<String, EventMetadata>,
}

impl EventRegistry {
    pub fn builder() -> EventRegistryBuilder {
        EventRegistryBuilder::new()
    }

    pub fn get(&self, event_type: &str) -> Option<&EventMetadata> {
        self.entries.get(event_type)
    }

    pub fn contains(&self, event_type: &str) -> bool {
        self.entries.contains_key(event_type)
    }

    /// Registered event types, sorted
    pub fn event_types(&self) -> Vec<&str> {
        let mut types: Vec<&str> = self.entries.keys().map(String::as_str).collect();
        types.sort_unstable();
        types
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Resolve and decode an outbox row
    pub fn decode(&self, event: &OutboxEvent) -> Result<DecodedEvent, RegistryError> {
        let metadata = self
            .get(&event.event_type)
            .ok_or_else(|| RegistryError::UnknownEventType(event.event_type.clone()))?;

        let decoded =
            (metadata.decode)(&event.payload).map_err(|source| RegistryError::MalformedPayload {
                event_type: event.event_type.clone(),
                source,
            })?;

        Ok(DecodedEvent {
            event_id: event.id,
            event_type: event.event_type.clone(),
            topic: metadata.topic.clone(),
            aggregate_type: event.aggregate_type.clone(),
            aggregate_id: event.aggregate_id.clone(),
            partition_key: decoded.partition_key,
            occurred_at: event.created_at,
            data: decoded.data,
        })
    }
}
