// Copyright (c) 2025 - Cowboy AI, Inc.

//! Outbox Store
//!
//! The outbox is the durable buffer between a write-side mutation and the event
//! bus. A row is written in the same atomic unit as the aggregate change it
//! describes, so a committed mutation always leaves exactly one pending row and
//! a rolled-back one leaves none.
//!
//! # Lifecycle
//!
//! ```text
//! write-side commit ──> Pending ──(relay: decode + publish ok)──> Processed
//!                          ▲                    │
//!                          └──── failure ───────┘   (retried next poll)
//! ```
//!
//! Only the relay advances a row. Whether completion flips `processed` or
//! deletes the row is a property of the store ([`CompletionPolicy`]); callers
//! treat "absent or processed" as terminal.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::errors::OutboxResult;

pub mod memory;

pub use memory::InMemoryOutboxStore;

/// A pending unit of at-least-once work
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutboxEvent {
    /// Unique id, generated at creation and never reused (UUID v7)
    pub id: Uuid,

    /// Kind of business entity that produced the event (e.g. "user")
    pub aggregate_type: String,

    /// Identity of the business entity
    pub aggregate_id: String,

    /// Registry key (e.g. "user.created")
    pub event_type: String,

    /// Opaque JSON snapshot of the event data
    pub payload: serde_json::Value,

    /// Creation time; drives FIFO order and retry fairness
    pub created_at: DateTime<Utc>,

    /// False until the relay confirmed publish
    #[serde(default)]
    pub processed: bool,
}

impl OutboxEvent {
    /// Create a pending event from an already serialized payload
    pub fn new(
        aggregate_type: impl Into<String>,
        aggregate_id: impl Into<String>,
        event_type: impl Into<String>,
        payload: serde_json::Value,
    ) -> Self {
        Self {
            id: Uuid::now_v7(),
            aggregate_type: aggregate_type.into(),
            aggregate_id: aggregate_id.into(),
            event_type: event_type.into(),
            payload,
            created_at: Utc::now(),
            processed: false,
        }
    }

    /// Create a pending event by serializing a typed integration event
    pub fn for_event<T: Serialize>(
        aggregate_type: impl Into<String>,
        aggregate_id: impl Into<String>,
        event_type: impl Into<String>,
        event: &T,
    ) -> OutboxResult<Self> {
        let payload = serde_json::to_value(event)?;
        Ok(Self::new(aggregate_type, aggregate_id, event_type, payload))
    }

    /// Override the creation timestamp
    pub fn with_created_at(mut self, created_at: DateTime<Utc>) -> Self {
        self.created_at = created_at;
        self
    }

    pub fn is_pending(&self) -> bool {
        !self.processed
    }
}

/// What a store does with a row once the relay completed it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CompletionPolicy {
    /// Keep the row with `processed = true`
    #[default]
    Flag,
    /// Remove the row
    Delete,
}

/// Store contract consumed by the relay
///
/// Writing rows belongs to the write-side repositories and is not part of
/// this contract.
#[async_trait]
pub trait OutboxStore: Send + Sync {
    /// Fetch unprocessed rows, oldest first, at most `limit`
    ///
    /// An empty outbox yields `Ok(vec![])`.
    async fn fetch_pending(&self, limit: usize) -> OutboxResult<Vec<OutboxEvent>>;

    /// Mark a row as processed
    ///
    /// Repeating the call is safe. Returns
    /// [`OutboxError::EventNotFound`](crate::errors::OutboxError::EventNotFound)
    /// if the row does not exist.
    async fn mark_processed(&self, id: Uuid) -> OutboxResult<()>;
}
