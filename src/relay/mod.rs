// Copyright (c) 2025 - Cowboy AI, Inc.

//! Relay Worker
//!
//! Drains the outbox into an [`EventPublisher`]. Two triggers start the same
//! oldest-first pass:
//!
//! ```text
//!   interval tick ───────────────────────┐
//!                                        ├──> fetch_pending(batch_size) ──> process_event ──> publish ──> mark_processed
//!   RelayQueue::enqueue ──> bounded mpsc ┘
//! ```
//!
//! A pushed event is a wake-up, not a work item: the queue loop answers it
//! with the same oldest-first pass the timer runs, and passes never overlap.
//! Pushing therefore only lowers latency and cannot publish an aggregate's
//! events out of `created_at` order. When the queue is full the signal is
//! dropped and the next polling pass picks the row up, so delivery is
//! delayed, never lost.
//!
//! # Per-event state machine
//!
//! - decode via the registry; an unknown type or malformed payload leaves the
//!   row pending and is counted against the stuck threshold
//! - publish with a bounded number of in-pass attempts; exhaustion leaves the
//!   row pending for the next pass
//! - mark processed only after a successful publish; a failed mark is logged
//!   and turns into a duplicate delivery on the next pass
//!
//! Running several workers against one store is correct but doubles publish
//! volume. Consumers are idempotent and absorb the duplicates.

use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::config::RelayConfig;
use crate::outbox::{OutboxEvent, OutboxStore};
use crate::publisher::EventPublisher;
use crate::registry::{EventRegistry, RegistryError};
use crate::shutdown::ShutdownListener;

pub mod retry;

use retry::retry;

/// Result of processing one outbox event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessOutcome {
    /// Published and marked processed
    Published,
    /// Published, but marking failed; it will be published again
    PublishedUnmarked,
    /// Every in-pass attempt failed; the row stays pending
    PublishFailed { attempts: u32 },
    /// No registry entry; the row stays pending
    UnknownEventType,
    /// Payload does not decode; the row stays pending
    MalformedPayload,
}

impl ProcessOutcome {
    pub fn is_published(&self) -> bool {
        matches!(
            self,
            ProcessOutcome::Published | ProcessOutcome::PublishedUnmarked
        )
    }
}

/// Summary of one polling pass
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct BatchReport {
    pub fetched: usize,
    pub published: usize,
    pub failed: usize,
    pub skipped: usize,
}

impl BatchReport {
    fn record(&mut self, outcome: ProcessOutcome) {
        match outcome {
            ProcessOutcome::Published | ProcessOutcome::PublishedUnmarked => self.published += 1,
            ProcessOutcome::PublishFailed { .. } => self.failed += 1,
            ProcessOutcome::UnknownEventType | ProcessOutcome::MalformedPayload => {
                self.skipped += 1
            }
        }
    }
}

/// Snapshot of the worker counters
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RelayStats {
    pub batches: u64,
    pub published: u64,
    pub publish_failures: u64,
    pub unknown_type: u64,
    pub malformed: u64,
    pub mark_failures: u64,
    pub queue_enqueued: u64,
    pub queue_dropped: u64,
}

#[derive(Debug, Default)]
struct RelayCounters {
    batches: AtomicU64,
    published: AtomicU64,
    publish_failures: AtomicU64,
    unknown_type: AtomicU64,
    malformed: AtomicU64,
    mark_failures: AtomicU64,
    queue_enqueued: AtomicU64,
    queue_dropped: AtomicU64,
}

impl RelayCounters {
    fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    fn snapshot(&self) -> RelayStats {
        RelayStats {
            batches: self.batches.load(Ordering::Relaxed),
            published: self.published.load(Ordering::Relaxed),
            publish_failures: self.publish_failures.load(Ordering::Relaxed),
            unknown_type: self.unknown_type.load(Ordering::Relaxed),
            malformed: self.malformed.load(Ordering::Relaxed),
            mark_failures: self.mark_failures.load(Ordering::Relaxed),
            queue_enqueued: self.queue_enqueued.load(Ordering::Relaxed),
            queue_dropped: self.queue_dropped.load(Ordering::Relaxed),
        }
    }
}

/// Producer handle of the push path
///
/// Cheap to clone; write-side services hold one and call
/// [`RelayQueue::enqueue`] after their commit.
#[derive(Debug, Clone)]
pub struct RelayQueue {
    tx: mpsc::Sender<OutboxEvent>,
    counters: Arc<RelayCounters>,
}

impl RelayQueue {
    /// Hand a committed event to the worker without waiting
    ///
    /// Returns `false` when the queue is full or the worker is gone. The
    /// event is still in the outbox and the polling path will deliver it.
    pub fn enqueue(&self, event: OutboxEvent) -> bool {
        match self.tx.try_send(event) {
            Ok(()) => {
                RelayCounters::bump(&self.counters.queue_enqueued);
                true
            }
            Err(TrySendError::Full(event)) => {
                RelayCounters::bump(&self.counters.queue_dropped);
                debug!(event_id = %event.id, "Relay queue full, left to polling");
                false
            }
            Err(TrySendError::Closed(event)) => {
                RelayCounters::bump(&self.counters.queue_dropped);
                debug!(event_id = %event.id, "Relay queue closed, left to polling");
                false
            }
        }
    }
}

/// Consecutive undecodable passes of one pending row
#[derive(Debug, Clone, Copy)]
struct Undecodable {
    passes: u32,
    created_at: DateTime<Utc>,
}

/// Outbox relay worker
pub struct RelayWorker {
    store: Arc<dyn OutboxStore>,
    publisher: Arc<dyn EventPublisher>,
    registry: Arc<EventRegistry>,
    config: RelayConfig,
    counters: Arc<RelayCounters>,
    queue_tx: Option<mpsc::Sender<OutboxEvent>>,
    queue_rx: Mutex<Option<mpsc::Receiver<OutboxEvent>>>,
    undecodable: Mutex<HashMap<Uuid, Undecodable>>,
    pass_lock: tokio::sync::Mutex<()>,
}

impl RelayWorker {
    pub fn new(
        store: Arc<dyn OutboxStore>,
        publisher: Arc<dyn EventPublisher>,
        registry: Arc<EventRegistry>,
        config: RelayConfig,
    ) -> Self {
        let (queue_tx, queue_rx) = if config.push_enabled() {
            let (tx, rx) = mpsc::channel(config.queue_capacity);
            (Some(tx), Some(rx))
        } else {
            (None, None)
        };

        Self {
            store,
            publisher,
            registry,
            config,
            counters: Arc::new(RelayCounters::default()),
            queue_tx,
            queue_rx: Mutex::new(queue_rx),
            undecodable: Mutex::new(HashMap::new()),
            pass_lock: tokio::sync::Mutex::new(()),
        }
    }

    pub fn config(&self) -> &RelayConfig {
        &self.config
    }

    /// Producer handle for the push path, `None` when it is disabled
    pub fn queue(&self) -> Option<RelayQueue> {
        self.queue_tx.as_ref().map(|tx| RelayQueue {
            tx: tx.clone(),
            counters: Arc::clone(&self.counters),
        })
    }

    pub fn stats(&self) -> RelayStats {
        self.counters.snapshot()
    }

    /// Events whose consecutive undecodable passes reached the stuck threshold
    pub fn stuck_events(&self) -> Vec<Uuid> {
        let threshold = self.config.stuck_threshold;
        let mut stuck: Vec<Uuid> = lock(&self.undecodable)
            .iter()
            .filter(|(_, entry)| entry.passes >= threshold)
            .map(|(id, _)| *id)
            .collect();
        stuck.sort_unstable();
        stuck
    }

    /// Decode, publish and mark a single event
    pub async fn process_event(&self, event: &OutboxEvent) -> ProcessOutcome {
        let decoded = match self.registry.decode(event) {
            Ok(decoded) => {
                lock(&self.undecodable).remove(&event.id);
                decoded
            }
            Err(err) => return self.skip_undecodable(event, err),
        };

        let publisher = &self.publisher;
        let target = &decoded;
        let result = retry(
            self.config.max_publish_attempts,
            self.config.retry_delay,
            |attempt| async move {
                let result = publisher.publish(target).await;
                if let Err(err) = &result {
                    warn!(
                        event_id = %target.event_id,
                        event_type = %target.event_type,
                        attempt = attempt,
                        error = %err,
                        "Publish attempt failed"
                    );
                }
                result
            },
        )
        .await;

        if let Err(err) = result {
            RelayCounters::bump(&self.counters.publish_failures);
            warn!(
                event_id = %event.id,
                event_type = %event.event_type,
                attempts = self.config.max_publish_attempts,
                error = %err,
                "Publish failed, event left pending"
            );
            return ProcessOutcome::PublishFailed {
                attempts: self.config.max_publish_attempts.max(1),
            };
        }

        RelayCounters::bump(&self.counters.published);

        match self.store.mark_processed(event.id).await {
            Ok(()) => {
                info!(
                    event_id = %event.id,
                    event_type = %event.event_type,
                    topic = %decoded.topic,
                    "Event published and marked"
                );
                ProcessOutcome::Published
            }
            Err(err) => {
                RelayCounters::bump(&self.counters.mark_failures);
                warn!(
                    event_id = %event.id,
                    event_type = %event.event_type,
                    error = %err,
                    "Event published but not marked, it will be published again"
                );
                ProcessOutcome::PublishedUnmarked
            }
        }
    }

    /// Run one polling pass
    ///
    /// A fetch error is logged and yields an empty report.
    pub async fn process_batch(&self) -> BatchReport {
        self.run_batch(None).await
    }

    async fn run_batch(&self, stop: Option<&ShutdownListener>) -> BatchReport {
        let _pass = self.pass_lock.lock().await;
        RelayCounters::bump(&self.counters.batches);

        let events = match self.store.fetch_pending(self.config.batch_size).await {
            Ok(events) => events,
            Err(err) => {
                warn!(error = %err, "Failed to fetch pending outbox events");
                return BatchReport::default();
            }
        };

        let mut report = BatchReport {
            fetched: events.len(),
            ..Default::default()
        };

        for event in &events {
            if stop.is_some_and(ShutdownListener::is_cancelled) {
                debug!("Outbox pass interrupted by shutdown");
                break;
            }
            report.record(self.process_event(event).await);
        }

        self.forget_departed(&events);

        if report.fetched > 0 {
            debug!(
                fetched = report.fetched,
                published = report.published,
                failed = report.failed,
                skipped = report.skipped,
                "Outbox pass finished"
            );
        }

        report
    }

    /// Drop stuck tracking for rows that left the outbox
    ///
    /// A short fetch saw every pending row. A full one saw every pending row up
    /// to its last position, so only tracked rows past that point are kept.
    fn forget_departed(&self, events: &[OutboxEvent]) {
        let seen: HashSet<Uuid> = events.iter().map(|event| event.id).collect();
        let horizon = if events.len() < self.config.batch_size {
            None
        } else {
            events.last().map(|event| (event.created_at, event.id))
        };

        lock(&self.undecodable).retain(|id, entry| {
            seen.contains(id) || horizon.is_some_and(|last| (entry.created_at, *id) > last)
        });
    }

    fn skip_undecodable(&self, event: &OutboxEvent, err: RegistryError) -> ProcessOutcome {
        let outcome = match err {
            RegistryError::MalformedPayload { .. } => {
                RelayCounters::bump(&self.counters.malformed);
                ProcessOutcome::MalformedPayload
            }
            _ => {
                RelayCounters::bump(&self.counters.unknown_type);
                ProcessOutcome::UnknownEventType
            }
        };

        let passes = {
            let mut undecodable = lock(&self.undecodable);
            let entry = undecodable.entry(event.id).or_insert(Undecodable {
                passes: 0,
                created_at: event.created_at,
            });
            entry.passes += 1;
            entry.passes
        };

        if passes >= self.config.stuck_threshold {
            error!(
                event_id = %event.id,
                event_type = %event.event_type,
                aggregate_id = %event.aggregate_id,
                passes = passes,
                stuck = true,
                error = %err,
                "Undecodable event is stuck in the outbox"
            );
        } else {
            warn!(
                event_id = %event.id,
                event_type = %event.event_type,
                passes = passes,
                error = %err,
                "Undecodable event skipped, left pending"
            );
        }

        outcome
    }

    /// Spawn the polling loop and, if enabled, the queue loop
    ///
    /// The queue receiver can only be taken once; a second `start` runs the
    /// polling loop alone.
    pub fn start(self: Arc<Self>, shutdown: ShutdownListener) -> RelayHandle {
        let queue_rx = lock(&self.queue_rx).take();

        let queue = queue_rx
            .map(|rx| tokio::spawn(Arc::clone(&self).queue_loop(rx, shutdown.clone())));
        let poller = tokio::spawn(self.poll_loop(shutdown));

        RelayHandle { poller, queue }
    }

    async fn poll_loop(self: Arc<Self>, mut shutdown: ShutdownListener) {
        let period = self.config.poll_interval;
        let mut ticker = interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!(
            interval_ms = period.as_millis() as u64,
            batch_size = self.config.batch_size,
            "Outbox polling loop started"
        );

        loop {
            tokio::select! {
                biased;
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => {
                    self.run_batch(Some(&shutdown)).await;
                }
            }
        }

        info!("Outbox polling loop stopped");
    }

    /// Run passes until one comes back short or publishes nothing
    async fn drain(&self, stop: &ShutdownListener) {
        loop {
            let report = self.run_batch(Some(stop)).await;
            if report.fetched < self.config.batch_size
                || report.published == 0
                || stop.is_cancelled()
            {
                break;
            }
        }
    }

    async fn queue_loop(
        self: Arc<Self>,
        mut rx: mpsc::Receiver<OutboxEvent>,
        mut shutdown: ShutdownListener,
    ) {
        info!(capacity = self.config.queue_capacity, "Outbox queue loop started");

        loop {
            tokio::select! {
                biased;
                _ = shutdown.cancelled() => break,
                received = rx.recv() => match received {
                    Some(event) => {
                        debug!(event_id = %event.id, "Outbox push received, running a pass");
                        while rx.try_recv().is_ok() {}
                        self.drain(&shutdown).await;
                    }
                    None => break,
                },
            }
        }

        info!("Outbox queue loop stopped");
    }
}

/// Join handle for a started worker
#[derive(Debug)]
pub struct RelayHandle {
    poller: JoinHandle<()>,
    queue: Option<JoinHandle<()>>,
}

impl RelayHandle {
    /// Whether the push path loop is running
    pub fn has_queue_loop(&self) -> bool {
        self.queue.is_some()
    }

    /// Wait for every loop to exit
    pub async fn join(self) {
        if let Err(err) = self.poller.await {
            error!(error = %err, "Outbox polling loop panicked");
        }
        if let Some(queue) = self.queue {
            if let Err(err) = queue.await {
                error!(error = %err, "Outbox queue loop panicked");
            }
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::outbox::InMemoryOutboxStore;
    use crate::publisher::{InMemoryEventBus, PublishError};
    use crate::registry::{DecodedEvent, PartitionKey};
    use crate::shutdown::Shutdown;
    use async_trait::async_trait;
    use serde::{Deserialize, Serialize};
    use serde_json::json;
    use std::sync::atomic::AtomicU32;
    use std::time::Duration;

    #[derive(Serialize, Deserialize)]
    struct Pinged {
        id: String,
    }

    impl PartitionKey for Pinged {}

    struct FailingPublisher {
        calls: AtomicU32,
    }

    #[async_trait]
    impl EventPublisher for FailingPublisher {
        async fn publish(&self, _event: &DecodedEvent) -> Result<(), PublishError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Err(PublishError::broker("broker unreachable"))
        }
    }

    fn registry() -> Arc<EventRegistry> {
        Arc::new(
            EventRegistry::builder()
                .register::<Pinged>("ping.sent", "ping")
                .build()
                .unwrap(),
        )
    }

    fn fast_config() -> RelayConfig {
        RelayConfig::default()
            .with_poll_interval(Duration::from_millis(20))
            .with_retry_delay(Duration::from_millis(1))
            .with_stuck_threshold(2)
    }

    fn ping() -> OutboxEvent {
        OutboxEvent::new("ping", "p-1", "ping.sent", json!({"id": "p-1"}))
    }

    #[tokio::test]
    async fn test_process_event_publishes_and_marks() {
        let store = Arc::new(InMemoryOutboxStore::new());
        let bus = Arc::new(InMemoryEventBus::new("ping"));
        let mut rx = bus.subscribe(4);
        let worker = RelayWorker::new(store.clone(), bus, registry(), fast_config());

        let event = ping();
        store.insert(event.clone()).await.unwrap();

        assert_eq!(worker.process_event(&event).await, ProcessOutcome::Published);
        assert_eq!(store.pending_count().await, 0);
        assert!(rx.recv().await.is_some());
        assert_eq!(worker.stats().published, 1);
    }

    #[tokio::test]
    async fn test_failed_publish_leaves_event_pending() {
        let store = Arc::new(InMemoryOutboxStore::new());
        let publisher = Arc::new(FailingPublisher {
            calls: AtomicU32::new(0),
        });
        let worker = RelayWorker::new(store.clone(), publisher.clone(), registry(), fast_config());

        let event = ping();
        store.insert(event.clone()).await.unwrap();

        assert_eq!(
            worker.process_event(&event).await,
            ProcessOutcome::PublishFailed { attempts: 3 }
        );
        assert_eq!(publisher.calls.load(Ordering::SeqCst), 3);
        assert_eq!(store.pending_count().await, 1);
    }

    #[tokio::test]
    async fn test_unknown_type_becomes_stuck() {
        let store = Arc::new(InMemoryOutboxStore::new());
        let bus = Arc::new(InMemoryEventBus::new("ping"));
        let worker = RelayWorker::new(store.clone(), bus, registry(), fast_config());

        let event = OutboxEvent::new("ping", "p-1", "ping.lost", json!({}));
        store.insert(event.clone()).await.unwrap();

        assert_eq!(worker.process_event(&event).await, ProcessOutcome::UnknownEventType);
        assert!(worker.stuck_events().is_empty());

        worker.process_event(&event).await;
        assert_eq!(worker.stuck_events(), vec![event.id]);
        assert_eq!(worker.stats().unknown_type, 2);
    }

    #[tokio::test]
    async fn test_malformed_payload_is_skipped() {
        let store = Arc::new(InMemoryOutboxStore::new());
        let bus = Arc::new(InMemoryEventBus::new("ping"));
        let worker = RelayWorker::new(store.clone(), bus, registry(), fast_config());

        let event = OutboxEvent::new("ping", "p-1", "ping.sent", json!({"id": 1}));
        store.insert(event.clone()).await.unwrap();

        let report = worker.process_batch().await;
        assert_eq!(
            report,
            BatchReport {
                fetched: 1,
                skipped: 1,
                ..Default::default()
            }
        );
        assert_eq!(worker.stats().malformed, 1);
        assert_eq!(store.pending_count().await, 1);
    }

    #[tokio::test]
    async fn test_queue_disabled_with_zero_capacity() {
        let worker = RelayWorker::new(
            Arc::new(InMemoryOutboxStore::new()),
            Arc::new(InMemoryEventBus::new("ping")),
            registry(),
            fast_config().with_queue_capacity(0),
        );
        assert!(worker.queue().is_none());

        let shutdown = Shutdown::new();
        let handle = Arc::new(worker).start(shutdown.listener());
        assert!(!handle.has_queue_loop());
        shutdown.trigger();
        handle.join().await;
    }

    #[tokio::test]
    async fn test_full_queue_drops_without_blocking() {
        let worker = RelayWorker::new(
            Arc::new(InMemoryOutboxStore::new()),
            Arc::new(InMemoryEventBus::new("ping")),
            registry(),
            fast_config().with_queue_capacity(1),
        );
        let queue = worker.queue().unwrap();

        assert!(queue.enqueue(ping()));
        assert!(!queue.enqueue(ping()));
        assert_eq!(worker.stats().queue_dropped, 1);
        assert_eq!(worker.stats().queue_enqueued, 1);
    }

    #[tokio::test]
    async fn test_loops_exit_on_shutdown() {
        let store = Arc::new(InMemoryOutboxStore::new());
        let worker = Arc::new(RelayWorker::new(
            store.clone(),
            Arc::new(InMemoryEventBus::new("ping")),
            registry(),
            fast_config(),
        ));

        let shutdown = Shutdown::new();
        let handle = Arc::clone(&worker).start(shutdown.listener());
        assert!(handle.has_queue_loop());

        store.insert(ping()).await.unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(store.pending_count().await, 0);

        shutdown.trigger();
        tokio::time::timeout(Duration::from_secs(1), handle.join())
            .await
            .unwrap();
    }
}
