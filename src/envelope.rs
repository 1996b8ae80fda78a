//! Wire envelope shared by every transport
//!
//! ```json
//! { "type": "user.created", "timestamp": "2026-01-19T12:00:00Z", "data": { ... } }
//! ```
//!
//! `data` stays an opaque JSON value until the receiver picks a decoder for
//! `type`.

use chrono::{DateTime, Utc};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::Value;

use crate::registry::DecodedEvent;

/// Integration event as it travels over the bus
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IntegrationEvent {
    #[serde(rename = "type")]
    pub event_type: String,
    pub timestamp: DateTime<Utc>,
    pub data: Value,
}

impl IntegrationEvent {
    pub fn new(event_type: impl Into<String>, timestamp: DateTime<Utc>, data: Value) -> Self {
        Self {
            event_type: event_type.into(),
            timestamp,
            data,
        }
    }

    /// Wrap a decoded outbox event
    ///
    /// The timestamp is the outbox row's creation time, so redeliveries of the
    /// same row carry identical envelopes.
    pub fn from_decoded(event: &DecodedEvent) -> Self {
        Self::new(event.event_type.clone(), event.occurred_at, event.data.clone())
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }

    pub fn from_slice(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(bytes)
    }

    /// Decode `data` into the event-specific shape
    pub fn decode_data<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        T::deserialize(&self.data)
    }
}
