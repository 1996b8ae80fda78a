// Copyright (c) 2025 - Cowboy AI, Inc.

//! Process wiring
//!
//! [`OutboxApp::start`] builds one complete outbox topology from an
//! [`AppConfig`]: the outbox, the write-side services that stage into it, the
//! relay, and one consumer per topic applying events to replicas. Embedders
//! write through [`OutboxApp::users`] and [`OutboxApp::tasks`]; the
//! `outbox-relay` binary just starts the app and waits for Ctrl-C.

use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{error, info};

use crate::cache::TtlCache;
use crate::config::{AppConfig, BusKind};
use crate::consumer::{
    ChannelTransport, ConsumerAdapter, MessageHandler, NatsTransport, TaskConsumer, UserConsumer,
};
use crate::domain::{self, task::TASK_TOPIC, user::USER_TOPIC};
use crate::errors::{OutboxError, OutboxResult};
use crate::jetstream::{ensure_event_stream, ensure_pull_consumer, DurableConsumerConfig};
use crate::nats::connect_jetstream;
use crate::outbox::InMemoryOutboxStore;
use crate::publisher::{EventPublisher, InMemoryEventBus, NatsPublisher, TopicRouter};
use crate::relay::{RelayHandle, RelayStats, RelayWorker};
use crate::service::{InMemoryTaskService, InMemoryUserService};
use crate::shutdown::Shutdown;
use crate::subjects::{topic_wildcard, EVENTS_ROOT};
use crate::tasks::BackgroundTasks;

const CACHE_TTL: Duration = Duration::from_secs(300);
const BACKGROUND_QUEUE_CAPACITY: usize = 256;
const BACKGROUND_TASK_TIMEOUT: Duration = Duration::from_secs(5);

/// A running outbox topology
pub struct OutboxApp {
    shutdown: Shutdown,
    outbox: Arc<InMemoryOutboxStore>,
    users: Arc<InMemoryUserService>,
    tasks: Arc<InMemoryTaskService>,
    user_replica: Arc<InMemoryUserService>,
    task_replica: Arc<InMemoryTaskService>,
    worker: Arc<RelayWorker>,
    relay: RelayHandle,
    consumers: Vec<JoinHandle<()>>,
    background: JoinHandle<()>,
}

impl OutboxApp {
    /// Build and start everything `config` describes
    pub async fn start(config: AppConfig) -> OutboxResult<Self> {
        config.relay.validate()?;
        config.consumer.validate()?;

        let registry = Arc::new(
            domain::event_registry().map_err(|e| OutboxError::Configuration(e.to_string()))?,
        );
        info!(event_types = ?registry.event_types(), "Event registry built");

        let shutdown = Shutdown::new();
        let outbox = Arc::new(InMemoryOutboxStore::new());

        let user_replica = Arc::new(InMemoryUserService::replica());
        let task_replica = Arc::new(InMemoryTaskService::replica());
        let timeout = config.consumer.handler_timeout;
        let user_handler: Arc<dyn MessageHandler> =
            Arc::new(UserConsumer::new(user_replica.clone(), timeout));
        let task_handler: Arc<dyn MessageHandler> =
            Arc::new(TaskConsumer::new(task_replica.clone(), timeout));

        let mut consumers = Vec::new();
        let publisher: Arc<dyn EventPublisher> = match config.bus {
            BusKind::Memory => {
                let user_bus = Arc::new(InMemoryEventBus::new(USER_TOPIC));
                let task_bus = Arc::new(InMemoryEventBus::new(TASK_TOPIC));
                let buffer = config.consumer.subscription_buffer;

                for (bus, handler) in [(&user_bus, user_handler), (&task_bus, task_handler)] {
                    consumers.push(
                        ConsumerAdapter::new(ChannelTransport::subscribe(bus, buffer), handler)
                            .with_error_backoff(config.consumer.error_backoff)
                            .spawn(shutdown.listener()),
                    );
                }

                Arc::new(TopicRouter::new().with_bus(user_bus).with_bus(task_bus))
            }
            BusKind::Nats => {
                info!(servers = ?config.nats.servers, "Connecting to NATS");
                let jetstream = connect_jetstream(&config.nats).await?;
                let stream = ensure_event_stream(&jetstream, &config.stream).await?;

                for (topic, handler) in [(USER_TOPIC, user_handler), (TASK_TOPIC, task_handler)] {
                    let durable = DurableConsumerConfig::new(
                        format!("{}-{}", config.consumer_name, topic),
                        topic_wildcard(EVENTS_ROOT, topic),
                    );
                    let pull = ensure_pull_consumer(&stream, &durable).await?;
                    let transport = NatsTransport::new(pull, durable.name.clone()).await?;

                    consumers.push(
                        ConsumerAdapter::new(transport, handler)
                            .with_error_backoff(config.consumer.error_backoff)
                            .spawn(shutdown.listener()),
                    );
                }

                Arc::new(NatsPublisher::new(jetstream))
            }
        };

        let worker = Arc::new(RelayWorker::new(
            outbox.clone(),
            publisher,
            registry,
            config.relay.clone(),
        ));

        let (background_tasks, background) = BackgroundTasks::start(
            BACKGROUND_QUEUE_CAPACITY,
            BACKGROUND_TASK_TIMEOUT,
            shutdown.listener(),
        );
        let mut users = InMemoryUserService::new(outbox.clone())
            .with_cache(Arc::new(TtlCache::new(CACHE_TTL)), background_tasks);
        let mut tasks = InMemoryTaskService::new(outbox.clone());
        if let Some(queue) = worker.queue() {
            users = users.with_relay_queue(queue.clone());
            tasks = tasks.with_relay_queue(queue);
        }

        let relay = Arc::clone(&worker).start(shutdown.listener());
        info!(
            bus = ?config.bus,
            push_path = relay.has_queue_loop(),
            consumers = consumers.len(),
            "Outbox app running"
        );

        Ok(Self {
            shutdown,
            outbox,
            users: Arc::new(users),
            tasks: Arc::new(tasks),
            user_replica,
            task_replica,
            worker,
            relay,
            consumers,
            background,
        })
    }

    /// Producing user service; every mutation stages an outbox row
    pub fn users(&self) -> Arc<InMemoryUserService> {
        self.users.clone()
    }

    /// Producing task service
    pub fn tasks(&self) -> Arc<InMemoryTaskService> {
        self.tasks.clone()
    }

    /// Users as the consumer has applied them
    pub fn user_replica(&self) -> Arc<InMemoryUserService> {
        self.user_replica.clone()
    }

    pub fn task_replica(&self) -> Arc<InMemoryTaskService> {
        self.task_replica.clone()
    }

    pub fn outbox(&self) -> Arc<InMemoryOutboxStore> {
        self.outbox.clone()
    }

    pub fn relay(&self) -> Arc<RelayWorker> {
        self.worker.clone()
    }

    /// Trigger shutdown, wait for every loop and report the relay counters
    pub async fn shutdown(self) -> RelayStats {
        self.shutdown.trigger();

        self.relay.join().await;
        for consumer in self.consumers {
            if let Err(err) = consumer.await {
                error!(error = %err, "Consumer task panicked");
            }
        }
        if let Err(err) = self.background.await {
            error!(error = %err, "Background runner panicked");
        }

        self.worker.stats()
    }
}
