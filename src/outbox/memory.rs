// Copyright (c) 2025 - Cowboy AI, Inc.

//! In-memory outbox store
//!
//! Backs tests and single-process topologies. Rows live in a hash map, so the
//! FIFO order returned by [`OutboxStore::fetch_pending`] is produced by sorting,
//! never by insertion order.

use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;
use tracing::debug;
use uuid::Uuid;

use super::{CompletionPolicy, OutboxEvent, OutboxStore};
use crate::errors::{OutboxError, OutboxResult};

/// Hash-map backed outbox
#[derive(Debug, Default)]
pub struct InMemoryOutboxStore {
    rows: RwLock<HashMap<Uuid, OutboxEvent>>,
    policy: CompletionPolicy,
}

impl InMemoryOutboxStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Choose what happens to completed rows
    pub fn with_policy(mut self, policy: CompletionPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn policy(&self) -> CompletionPolicy {
        self.policy
    }

    /// Write a new row
    ///
    /// Write-side repositories call this inside their own critical section.
    pub async fn insert(&self, event: OutboxEvent) -> OutboxResult<()> {
        let mut rows = self.rows.write().await;
        if rows.contains_key(&event.id) {
            return Err(OutboxError::DuplicateEvent(event.id));
        }
        debug!(
            event_id = %event.id,
            event_type = %event.event_type,
            aggregate_id = %event.aggregate_id,
            "Outbox row written"
        );
        rows.insert(event.id, event);
        Ok(())
    }

    /// Look up a row regardless of its state
    pub async fn get(&self, id: Uuid) -> Option<OutboxEvent> {
        self.rows.read().await.get(&id).cloned()
    }

    /// Number of rows still pending
    pub async fn pending_count(&self) -> usize {
        self.rows
            .read()
            .await
            .values()
            .filter(|event| event.is_pending())
            .count()
    }

    /// Number of stored rows, processed ones included
    pub async fn len(&self) -> usize {
        self.rows.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.rows.read().await.is_empty()
    }
}

#[async_trait]
impl OutboxStore for InMemoryOutboxStore {
    async fn fetch_pending(&self, limit: usize) -> OutboxResult<Vec<OutboxEvent>> {
        let rows = self.rows.read().await;

        let mut pending: Vec<OutboxEvent> = rows
            .values()
            .filter(|event| event.is_pending())
            .cloned()
            .collect();

        pending.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        pending.truncate(limit);

        Ok(pending)
    }

    async fn mark_processed(&self, id: Uuid) -> OutboxResult<()> {
        let mut rows = self.rows.write().await;

        match self.policy {
            CompletionPolicy::Flag => {
                let event = rows.get_mut(&id).ok_or(OutboxError::EventNotFound(id))?;
                event.processed = true;
            }
            CompletionPolicy::Delete => {
                rows.remove(&id).ok_or(OutboxError::EventNotFound(id))?;
            }
        }

        Ok(())
    }
}
