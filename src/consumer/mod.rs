// Copyright (c) 2025 - Cowboy AI, Inc.

//! Consumer Adapter
//!
//! Bridges a transport's blocking receive to a [`MessageHandler`]. The adapter
//! knows nothing about envelopes or event types; it passes the raw key and
//! payload bytes through and commits the message afterwards.
//!
//! ```text
//! Transport::receive ──> MessageHandler::handle_message(key, payload) ──> Transport::commit
//!        │
//!        └── error ──> log, back off, receive again
//! ```
//!
//! Decode and dispatch failures are the handler's business. The adapter
//! commits regardless, so a poison message is not redelivered forever.

use async_trait::async_trait;
use bytes::Bytes;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::shutdown::ShutdownListener;

pub mod channel;
pub mod dispatch;
pub mod nats;
pub mod task;
pub mod user;

pub use channel::ChannelTransport;
pub use dispatch::{DispatchOutcome, EventDispatcher, HandleOutcome, HandlerError};
pub use nats::NatsTransport;
pub use task::TaskConsumer;
pub use user::UserConsumer;

/// A message as delivered by a transport
#[derive(Debug, Clone, PartialEq)]
pub struct TransportMessage {
    pub subject: String,
    /// Partition/routing key, if the transport carries one
    pub key: Option<String>,
    pub payload: Bytes,
}

/// Errors that can occur while receiving or committing
#[derive(Debug, Error)]
pub enum ReceiveError {
    #[error("Transport error: {0}")]
    Transport(#[source] async_nats::Error),

    #[error("Commit failed: {0}")]
    Commit(#[source] async_nats::Error),
}

impl ReceiveError {
    pub fn transport<E: Into<async_nats::Error>>(err: E) -> Self {
        ReceiveError::Transport(err.into())
    }

    pub fn commit<E: Into<async_nats::Error>>(err: E) -> Self {
        ReceiveError::Commit(err.into())
    }
}

/// Source of raw messages
#[async_trait]
pub trait Transport: Send {
    /// Wait for the next message; `Ok(None)` means the transport is closed
    async fn receive(&mut self) -> Result<Option<TransportMessage>, ReceiveError>;

    /// Acknowledge a message handed out by [`Transport::receive`]
    async fn commit(&mut self, message: &TransportMessage) -> Result<(), ReceiveError>;

    /// Human readable description for logs
    fn describe(&self) -> String;
}

/// Receiver of raw messages
#[async_trait]
pub trait MessageHandler: Send + Sync {
    async fn handle_message(&self, key: Option<&str>, payload: &[u8]);
}

/// Receive loop around one transport and one handler
pub struct ConsumerAdapter<T> {
    transport: T,
    handler: Arc<dyn MessageHandler>,
    error_backoff: Duration,
}

impl<T: Transport> ConsumerAdapter<T> {
    pub fn new(transport: T, handler: Arc<dyn MessageHandler>) -> Self {
        Self {
            transport,
            handler,
            error_backoff: Duration::from_secs(1),
        }
    }

    /// Pause after a receive error before trying again
    pub fn with_error_backoff(mut self, backoff: Duration) -> Self {
        self.error_backoff = backoff;
        self
    }

    /// Run until shutdown or until the transport closes
    pub async fn run(mut self, mut shutdown: ShutdownListener) {
        let source = self.transport.describe();
        info!(source = %source, "Consumer started");

        loop {
            let received = tokio::select! {
                biased;
                _ = shutdown.cancelled() => break,
                received = self.transport.receive() => received,
            };

            match received {
                Ok(Some(message)) => {
                    debug!(
                        source = %source,
                        subject = %message.subject,
                        payload_size = message.payload.len(),
                        "Message received"
                    );

                    self.handler
                        .handle_message(message.key.as_deref(), &message.payload)
                        .await;

                    if let Err(err) = self.transport.commit(&message).await {
                        warn!(source = %source, error = %err, "Failed to commit message");
                    }
                }
                Ok(None) => {
                    warn!(source = %source, "Transport closed");
                    break;
                }
                Err(err) => {
                    error!(source = %source, error = %err, "Error receiving message");
                    tokio::select! {
                        biased;
                        _ = shutdown.cancelled() => break,
                        _ = tokio::time::sleep(self.error_backoff) => {}
                    }
                }
            }
        }

        info!(source = %source, "Consumer stopped");
    }
}

impl<T: Transport + 'static> ConsumerAdapter<T> {
    /// Run on a background task
    pub fn spawn(self, shutdown: ShutdownListener) -> JoinHandle<()> {
        tokio::spawn(self.run(shutdown))
    }
}
