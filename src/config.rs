// Copyright (c) 2025 - Cowboy AI, Inc.

//! Runtime configuration for the relay, the consumers and the binary
//!
//! Every tunable of the relay is supplied from outside. The [`Default`]
//! implementations are the documented fallbacks:
//!
//! | Setting                  | Default | Env var                        |
//! |--------------------------|---------|--------------------------------|
//! | poll interval            | 1s      | `OUTBOX_POLL_INTERVAL_MS`      |
//! | batch size               | 10      | `OUTBOX_BATCH_SIZE`            |
//! | push queue capacity      | 100     | `OUTBOX_QUEUE_CAPACITY`        |
//! | publish attempts / pass  | 3       | `OUTBOX_MAX_PUBLISH_ATTEMPTS`  |
//! | delay between attempts   | 50ms    | `OUTBOX_RETRY_DELAY_MS`        |
//! | stuck threshold          | 5       | `OUTBOX_STUCK_THRESHOLD`       |
//! | consumer handler timeout | 500ms   | `CONSUMER_HANDLER_TIMEOUT_MS`  |
//! | consumer error backoff   | 1s      | `CONSUMER_ERROR_BACKOFF_MS`    |

use std::str::FromStr;
use std::time::Duration;

use crate::errors::{OutboxError, OutboxResult};
use crate::jetstream::EventStreamConfig;
use crate::nats::NatsConfig;

/// Relay worker configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayConfig {
    /// Interval between polling passes
    pub poll_interval: Duration,

    /// Maximum rows fetched per polling pass
    pub batch_size: usize,

    /// Capacity of the push queue; 0 disables the push path
    pub queue_capacity: usize,

    /// Publish attempts per event within one processing pass
    pub max_publish_attempts: u32,

    /// Fixed delay between publish attempts
    pub retry_delay: Duration,

    /// Consecutive undecodable passes before an event is reported as stuck
    pub stuck_threshold: u32,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(1),
            batch_size: 10,
            queue_capacity: 100,
            max_publish_attempts: 3,
            retry_delay: Duration::from_millis(50),
            stuck_threshold: 5,
        }
    }
}

impl RelayConfig {
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn with_batch_size(mut self, size: usize) -> Self {
        self.batch_size = size;
        self
    }

    pub fn with_queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity;
        self
    }

    pub fn with_max_publish_attempts(mut self, attempts: u32) -> Self {
        self.max_publish_attempts = attempts;
        self
    }

    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    pub fn with_stuck_threshold(mut self, threshold: u32) -> Self {
        self.stuck_threshold = threshold;
        self
    }

    /// Whether producers may hand events directly to the worker
    pub fn push_enabled(&self) -> bool {
        self.queue_capacity > 0
    }

    /// Reject values the relay cannot run with
    pub fn validate(&self) -> OutboxResult<()> {
        if self.poll_interval.is_zero() {
            return Err(OutboxError::Configuration(
                "poll_interval must be greater than zero".to_string(),
            ));
        }
        if self.batch_size == 0 {
            return Err(OutboxError::Configuration(
                "batch_size must be greater than zero".to_string(),
            ));
        }
        if self.max_publish_attempts == 0 {
            return Err(OutboxError::Configuration(
                "max_publish_attempts must be at least 1".to_string(),
            ));
        }
        if self.stuck_threshold == 0 {
            return Err(OutboxError::Configuration(
                "stuck_threshold must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// Consumer-side configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsumerConfig {
    /// Upper bound for a single handler invocation
    pub handler_timeout: Duration,

    /// Pause after a transient receive error
    pub error_backoff: Duration,

    /// Buffer of each in-memory bus subscription
    pub subscription_buffer: usize,
}

impl Default for ConsumerConfig {
    fn default() -> Self {
        Self {
            handler_timeout: Duration::from_millis(500),
            error_backoff: Duration::from_secs(1),
            subscription_buffer: 100,
        }
    }
}

impl ConsumerConfig {
    pub fn with_handler_timeout(mut self, timeout: Duration) -> Self {
        self.handler_timeout = timeout;
        self
    }

    pub fn with_error_backoff(mut self, backoff: Duration) -> Self {
        self.error_backoff = backoff;
        self
    }

    pub fn validate(&self) -> OutboxResult<()> {
        if self.handler_timeout.is_zero() {
            return Err(OutboxError::Configuration(
                "handler_timeout must be greater than zero".to_string(),
            ));
        }
        if self.subscription_buffer == 0 {
            return Err(OutboxError::Configuration(
                "subscription_buffer must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

/// Which event bus the binary wires up
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BusKind {
    /// In-process fan-out bus; the push path is used for low latency
    Memory,
    /// NATS JetStream broker
    Nats,
}

impl FromStr for BusKind {
    type Err = OutboxError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "memory" | "inmemory" | "in-memory" => Ok(BusKind::Memory),
            "nats" | "jetstream" => Ok(BusKind::Nats),
            other => Err(OutboxError::Configuration(format!(
                "unknown event bus '{}', expected 'memory' or 'nats'",
                other
            ))),
        }
    }
}

/// Complete configuration of the relay binary
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub bus: BusKind,
    pub relay: RelayConfig,
    pub consumer: ConsumerConfig,
    pub nats: NatsConfig,
    pub stream: EventStreamConfig,
    /// Durable consumer name prefix for NATS transports
    pub consumer_name: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            bus: BusKind::Memory,
            relay: RelayConfig::default(),
            consumer: ConsumerConfig::default(),
            nats: NatsConfig::default(),
            stream: EventStreamConfig::default(),
            consumer_name: "outbox-consumer".to_string(),
        }
    }
}

impl AppConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> OutboxResult<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration through an arbitrary key lookup
    pub fn from_lookup<F>(lookup: F) -> OutboxResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = AppConfig::default();

        if let Some(bus) = lookup("EVENT_BUS") {
            config.bus = bus.parse()?;
        }

        if let Some(ms) = parse_var::<u64, _>(&lookup, "OUTBOX_POLL_INTERVAL_MS")? {
            config.relay.poll_interval = Duration::from_millis(ms);
        }
        if let Some(size) = parse_var(&lookup, "OUTBOX_BATCH_SIZE")? {
            config.relay.batch_size = size;
        }
        if let Some(capacity) = parse_var(&lookup, "OUTBOX_QUEUE_CAPACITY")? {
            config.relay.queue_capacity = capacity;
        }
        if let Some(attempts) = parse_var(&lookup, "OUTBOX_MAX_PUBLISH_ATTEMPTS")? {
            config.relay.max_publish_attempts = attempts;
        }
        if let Some(ms) = parse_var::<u64, _>(&lookup, "OUTBOX_RETRY_DELAY_MS")? {
            config.relay.retry_delay = Duration::from_millis(ms);
        }
        if let Some(threshold) = parse_var(&lookup, "OUTBOX_STUCK_THRESHOLD")? {
            config.relay.stuck_threshold = threshold;
        }
        if let Some(ms) = parse_var::<u64, _>(&lookup, "CONSUMER_HANDLER_TIMEOUT_MS")? {
            config.consumer.handler_timeout = Duration::from_millis(ms);
        }
        if let Some(ms) = parse_var::<u64, _>(&lookup, "CONSUMER_ERROR_BACKOFF_MS")? {
            config.consumer.error_backoff = Duration::from_millis(ms);
        }

        if let Some(url) = lookup("NATS_URL") {
            config.nats.servers = url
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect();
        }
        if let Some(stream) = lookup("NATS_STREAM") {
            config.stream.stream_name = stream;
        }
        if let Some(name) = lookup("NATS_CONSUMER") {
            config.consumer_name = name;
        }

        config.relay.validate()?;
        config.consumer.validate()?;
        if config.nats.servers.is_empty() {
            return Err(OutboxError::Configuration(
                "NATS_URL must name at least one server".to_string(),
            ));
        }

        Ok(config)
    }
}

fn parse_var<T, F>(lookup: &F, key: &str) -> OutboxResult<Option<T>>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        None => Ok(None),
        Some(raw) => raw.trim().parse::<T>().map(Some).map_err(|e| {
            OutboxError::Configuration(format!("invalid value '{}' for {}: {}", raw, key, e))
        }),
    }
}
