// Copyright (c) 2025 - Cowboy AI, Inc.

//! JetStream configuration and setup for relayed events
//!
//! The durable broker side of the relay is a single JetStream stream capturing
//! `events.>`. Publishers attach the outbox event id as `Nats-Msg-Id`, so a
//! redelivery that lands inside the stream's duplicate window is discarded by
//! the server. Redeliveries outside the window still reach consumers, which are
//! idempotent.
//!
//! # Example
//!
//! ```rust,no_run
//! use cim_outbox::jetstream::{ensure_event_stream, EventStreamConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let client = async_nats::connect("nats://localhost:4222").await?;
//!     let jetstream = async_nats::jetstream::new(client);
//!
//!     let stream = ensure_event_stream(&jetstream, &EventStreamConfig::default()).await?;
//!     Ok(())
//! }
//! ```

use async_nats::jetstream::{self, consumer::PullConsumer, stream::Stream};
use std::time::Duration;
use tracing::info;

use crate::errors::{OutboxError, OutboxResult};
use crate::subjects::EVENTS_ROOT;

/// Configuration for the relayed events stream
#[derive(Debug, Clone)]
pub struct EventStreamConfig {
    /// Stream name
    pub stream_name: String,

    /// Subjects this stream will capture (defaults to "events.>")
    pub subjects: Vec<String>,

    /// Maximum age of messages (default: 7 days)
    pub max_age: Duration,

    /// Window in which repeated `Nats-Msg-Id` values are dropped (default: 2 minutes)
    pub duplicate_window: Duration,

    /// Storage type (File or Memory)
    pub storage: StorageType,

    /// Number of replicas (for clustered NATS)
    pub replicas: usize,
}

impl Default for EventStreamConfig {
    fn default() -> Self {
        Self {
            stream_name: "OUTBOX_EVENTS".to_string(),
            subjects: vec![format!("{}.>", EVENTS_ROOT)],
            max_age: Duration::from_secs(7 * 24 * 60 * 60), // 7 days
            duplicate_window: Duration::from_secs(120),
            storage: StorageType::File,
            replicas: 1,
        }
    }
}

/// Storage type for JetStream
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageType {
    /// File-based storage (persistent across restarts)
    File,
    /// Memory-based storage (faster, but lost on restart)
    Memory,
}

/// Create or update the events stream
///
/// Idempotent: an existing stream is returned as is.
pub async fn ensure_event_stream(
    jetstream: &jetstream::Context,
    config: &EventStreamConfig,
) -> OutboxResult<Stream> {
    let storage = match config.storage {
        StorageType::File => jetstream::stream::StorageType::File,
        StorageType::Memory => jetstream::stream::StorageType::Memory,
    };

    let stream_config = jetstream::stream::Config {
        name: config.stream_name.clone(),
        subjects: config.subjects.clone(),
        max_age: config.max_age,
        duplicate_window: config.duplicate_window,
        storage,
        num_replicas: config.replicas,
        ..Default::default()
    };

    let stream = jetstream
        .get_or_create_stream(stream_config)
        .await
        .map_err(|e| OutboxError::JetStream(e.to_string()))?;

    info!(stream = %config.stream_name, "Event stream ready");
    Ok(stream)
}

/// Durable pull consumer configuration
#[derive(Debug, Clone)]
pub struct DurableConsumerConfig {
    /// Durable name (survives restarts)
    pub name: String,

    /// Filter subject (e.g., "events.user.>")
    pub filter_subject: String,

    /// How long the server waits for an ack before redelivering
    pub ack_wait: Duration,

    /// Maximum number of unacknowledged messages
    pub max_ack_pending: i64,
}

impl DurableConsumerConfig {
    pub fn new(name: impl Into<String>, filter_subject: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            filter_subject: filter_subject.into(),
            ack_wait: Duration::from_secs(30),
            max_ack_pending: 1000,
        }
    }
}

/// Create or attach to a durable pull consumer with explicit acks
pub async fn ensure_pull_consumer(
    stream: &Stream,
    config: &DurableConsumerConfig,
) -> OutboxResult<PullConsumer> {
    let consumer = stream
        .get_or_create_consumer(
            &config.name,
            jetstream::consumer::pull::Config {
                durable_name: Some(config.name.clone()),
                filter_subject: config.filter_subject.clone(),
                ack_policy: jetstream::consumer::AckPolicy::Explicit,
                ack_wait: config.ack_wait,
                max_ack_pending: config.max_ack_pending,
                ..Default::default()
            },
        )
        .await
        .map_err(|e| OutboxError::JetStream(e.to_string()))?;

    info!(
        consumer = %config.name,
        filter = %config.filter_subject,
        "Durable consumer ready"
    );
    Ok(consumer)
}
