// Copyright (c) 2025 - Cowboy AI, Inc.

//! Test Fixtures for cim-outbox
//!
//! Deterministic outbox rows plus scripted stores and publishers that record
//! what the relay asked of them, in order.
#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, NaiveDate, Utc};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use uuid::Uuid;

use cim_outbox::domain::user::{UserCreated, USER_AGGREGATE, USER_CREATED};
use cim_outbox::outbox::{InMemoryOutboxStore, OutboxEvent, OutboxStore};
use cim_outbox::publisher::{EventPublisher, PublishError};
use cim_outbox::registry::{DecodedEvent, EventRegistry};
use cim_outbox::{OutboxError, OutboxResult, RelayConfig};

// Fixed test UUIDs (UUID v7 layout, deterministic)
pub const USER_ID_1: &str = "01934f4a-1000-7000-8000-000000001000";
pub const USER_ID_2: &str = "01934f4a-2000-7000-8000-000000002000";

// Fixed test timestamp (2026-01-19T12:00:00Z)
pub const FIXED_TIMESTAMP: &str = "2026-01-19T12:00:00Z";

pub fn parse_uuid(s: &str) -> Uuid {
    Uuid::parse_str(s).expect("Invalid UUID in test fixture")
}

pub fn fixed_timestamp() -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(FIXED_TIMESTAMP)
        .expect("Invalid timestamp in test fixture")
        .with_timezone(&Utc)
}

pub fn user_created(id: Uuid) -> UserCreated {
    UserCreated {
        id,
        email: "ada@example.com".to_string(),
        name: "Ada".to_string(),
        birth_date: NaiveDate::from_ymd_opt(1990, 3, 14).expect("Invalid date in test fixture"),
    }
}

/// Pending `user.created` row, `offset_secs` after the fixed timestamp
pub fn user_created_row(id: Uuid, offset_secs: i64) -> OutboxEvent {
    OutboxEvent::for_event(USER_AGGREGATE, id.to_string(), USER_CREATED, &user_created(id))
        .expect("Fixture serializes")
        .with_created_at(fixed_timestamp() + ChronoDuration::seconds(offset_secs))
}

/// Merged registry of every domain
pub fn registry() -> Arc<EventRegistry> {
    Arc::new(cim_outbox::domain::event_registry().expect("Domain registry builds"))
}

/// Relay settings that keep tests fast: no push path, no retry delay
pub fn fast_relay_config() -> RelayConfig {
    RelayConfig::default()
        .with_poll_interval(Duration::from_millis(10))
        .with_queue_capacity(0)
        .with_retry_delay(Duration::ZERO)
}

/// Everything the relay did against the fixtures, in order
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Fetch(usize),
    Publish(Uuid),
    Mark(Uuid),
}

pub type CallLog = Arc<Mutex<Vec<Call>>>;

pub fn call_log() -> CallLog {
    Arc::new(Mutex::new(Vec::new()))
}

pub fn calls(log: &CallLog) -> Vec<Call> {
    log.lock().expect("call log lock").clone()
}

pub fn publishes(log: &CallLog) -> usize {
    calls(log)
        .iter()
        .filter(|call| matches!(call, Call::Publish(_)))
        .count()
}

pub fn marks(log: &CallLog) -> usize {
    calls(log)
        .iter()
        .filter(|call| matches!(call, Call::Mark(_)))
        .count()
}

/// In-memory store that records calls and can refuse to mark
pub struct RecordingStore {
    pub inner: InMemoryOutboxStore,
    log: CallLog,
    failing_marks: AtomicU32,
}

impl RecordingStore {
    pub fn new(log: CallLog) -> Self {
        Self {
            inner: InMemoryOutboxStore::new(),
            log,
            failing_marks: AtomicU32::new(0),
        }
    }

    /// The next `n` marks fail
    pub fn fail_next_marks(self, n: u32) -> Self {
        self.failing_marks.store(n, Ordering::SeqCst);
        self
    }
}

#[async_trait]
impl OutboxStore for RecordingStore {
    async fn fetch_pending(&self, limit: usize) -> OutboxResult<Vec<OutboxEvent>> {
        self.log.lock().expect("call log lock").push(Call::Fetch(limit));
        self.inner.fetch_pending(limit).await
    }

    async fn mark_processed(&self, id: Uuid) -> OutboxResult<()> {
        self.log.lock().expect("call log lock").push(Call::Mark(id));
        let remaining = self.failing_marks.load(Ordering::SeqCst);
        if remaining > 0 {
            self.failing_marks.store(remaining - 1, Ordering::SeqCst);
            return Err(OutboxError::Store("database is locked".to_string()));
        }
        self.inner.mark_processed(id).await
    }
}

/// Publisher that fails its first `failures` calls, then records successes
pub struct ScriptedPublisher {
    log: CallLog,
    failures: AtomicU32,
    pub published: Mutex<Vec<DecodedEvent>>,
}

impl ScriptedPublisher {
    pub fn succeeding(log: CallLog) -> Self {
        Self::failing_first(log, 0)
    }

    pub fn failing_first(log: CallLog, failures: u32) -> Self {
        Self {
            log,
            failures: AtomicU32::new(failures),
            published: Mutex::new(Vec::new()),
        }
    }

    pub fn always_failing(log: CallLog) -> Self {
        Self::failing_first(log, u32::MAX)
    }

    pub fn published_ids(&self) -> Vec<Uuid> {
        self.published
            .lock()
            .expect("published lock")
            .iter()
            .map(|event| event.event_id)
            .collect()
    }
}

#[async_trait]
impl EventPublisher for ScriptedPublisher {
    async fn publish(&self, event: &DecodedEvent) -> Result<(), PublishError> {
        self.log
            .lock()
            .expect("call log lock")
            .push(Call::Publish(event.event_id));

        let remaining = self.failures.load(Ordering::SeqCst);
        if remaining > 0 {
            if remaining != u32::MAX {
                self.failures.store(remaining - 1, Ordering::SeqCst);
            }
            return Err(PublishError::broker("nats: no responders"));
        }

        self.published
            .lock()
            .expect("published lock")
            .push(event.clone());
        Ok(())
    }
}

/// Poll `check` every millisecond until it holds or a second has passed
pub async fn eventually<F, Fut>(mut check: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    let deadline = tokio::time::Instant::now() + Duration::from_secs(1);
    while tokio::time::Instant::now() < deadline {
        if check().await {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(1)).await;
    }
    check().await
}
