// Copyright (c) 2025 - Cowboy AI, Inc.

//! Envelope decoding and per-type dispatch
//!
//! [`EventDispatcher`] is a decode-and-dispatch table: each event type maps to
//! a closure that decodes `data` into the handler's input type and returns the
//! handler's future. The table is filled at construction and never changes.
//!
//! Nothing that goes wrong here propagates to the transport. The event is
//! already durably published, so a bad message is logged and dropped:
//!
//! | Situation                         | Outcome                 |
//! |-----------------------------------|-------------------------|
//! | envelope is not valid JSON        | `MalformedEnvelope`     |
//! | `type` has no handler             | `UnknownEventType`      |
//! | `data` does not fit the handler   | `MalformedData`         |
//! | handler exceeded its time budget  | `TimedOut`              |
//! | handler reported `AlreadyExists`  | `Duplicate` (success)   |
//! | any other handler error           | `Failed`                |

use async_trait::async_trait;
use futures::future::BoxFuture;
use futures::FutureExt;
use serde::{de::DeserializeOwned, Deserialize};
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

use super::MessageHandler;
use crate::envelope::IntegrationEvent;

/// Successful handler results
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandleOutcome {
    /// The side effect was applied
    Applied,
    /// The event had been applied before; nothing changed
    Duplicate,
}

/// Handler failures
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum HandlerError {
    /// A uniqueness guard rejected the write; treated as a duplicate
    #[error("Already exists: {0}")]
    AlreadyExists(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid event: {0}")]
    Invalid(String),

    #[error("Handler error: {0}")]
    Other(String),
}

/// What happened to one delivered message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    Applied,
    Duplicate,
    MalformedEnvelope,
    UnknownEventType,
    MalformedData,
    Failed,
    TimedOut,
}

impl DispatchOutcome {
    /// Applied or recognised as already applied
    pub fn is_success(&self) -> bool {
        matches!(self, DispatchOutcome::Applied | DispatchOutcome::Duplicate)
    }
}

type HandlerFuture = BoxFuture<'static, Result<HandleOutcome, HandlerError>>;
type DecodeAndHandle = dyn Fn(&Value) -> Result<HandlerFuture, serde_json::Error> + Send + Sync;

/// Per-consumer dispatch table
pub struct EventDispatcher {
    name: String,
    handler_timeout: Duration,
    handlers: HashMap<String, Arc<DecodeAndHandle>>,
}

impl EventDispatcher {
    pub fn new(name: impl Into<String>, handler_timeout: Duration) -> Self {
        Self {
            name: name.into(),
            handler_timeout,
            handlers: HashMap::new(),
        }
    }

    /// Route `event_type` to `handler`, decoding `data` into `T` first
    pub fn on<T, F, Fut>(mut self, event_type: impl Into<String>, handler: F) -> Self
    where
        T: DeserializeOwned + Send + 'static,
        F: Fn(T) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<HandleOutcome, HandlerError>> + Send + 'static,
    {
        let entry = move |data: &Value| -> Result<HandlerFuture, serde_json::Error> {
            let input = T::deserialize(data)?;
            Ok(handler(input).boxed())
        };
        self.handlers.insert(event_type.into(), Arc::new(entry));
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Event types this dispatcher handles, sorted
    pub fn event_types(&self) -> Vec<&str> {
        let mut types: Vec<&str> = self.handlers.keys().map(String::as_str).collect();
        types.sort_unstable();
        types
    }

    /// Decode a raw envelope and run its handler
    pub async fn dispatch(&self, key: Option<&str>, payload: &[u8]) -> DispatchOutcome {
        let envelope = match IntegrationEvent::from_slice(payload) {
            Ok(envelope) => envelope,
            Err(err) => {
                warn!(
                    consumer = %self.name,
                    key = ?key,
                    error = %err,
                    "Failed to decode integration event"
                );
                return DispatchOutcome::MalformedEnvelope;
            }
        };

        let Some(entry) = self.handlers.get(&envelope.event_type) else {
            warn!(
                consumer = %self.name,
                key = ?key,
                event_type = %envelope.event_type,
                "Unknown event type"
            );
            return DispatchOutcome::UnknownEventType;
        };

        let handling = match entry(&envelope.data) {
            Ok(handling) => handling,
            Err(err) => {
                warn!(
                    consumer = %self.name,
                    key = ?key,
                    event_type = %envelope.event_type,
                    error = %err,
                    "Failed to decode event data"
                );
                return DispatchOutcome::MalformedData;
            }
        };

        let result = match tokio::time::timeout(self.handler_timeout, handling).await {
            Ok(result) => result,
            Err(_) => {
                warn!(
                    consumer = %self.name,
                    key = ?key,
                    event_type = %envelope.event_type,
                    timeout_ms = self.handler_timeout.as_millis() as u64,
                    "Event handler timed out"
                );
                return DispatchOutcome::TimedOut;
            }
        };

        match result {
            Ok(HandleOutcome::Applied) => {
                info!(
                    consumer = %self.name,
                    key = ?key,
                    event_type = %envelope.event_type,
                    "Event applied"
                );
                DispatchOutcome::Applied
            }
            Ok(HandleOutcome::Duplicate) => {
                info!(
                    consumer = %self.name,
                    key = ?key,
                    event_type = %envelope.event_type,
                    "Duplicate event ignored"
                );
                DispatchOutcome::Duplicate
            }
            Err(HandlerError::AlreadyExists(id)) => {
                info!(
                    consumer = %self.name,
                    event_type = %envelope.event_type,
                    id = %id,
                    "Duplicate event rejected by store"
                );
                DispatchOutcome::Duplicate
            }
            Err(err) => {
                warn!(
                    consumer = %self.name,
                    key = ?key,
                    event_type = %envelope.event_type,
                    error = %err,
                    "Failed to process event"
                );
                DispatchOutcome::Failed
            }
        }
    }
}

impl fmt::Debug for EventDispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventDispatcher")
            .field("name", &self.name)
            .field("handler_timeout", &self.handler_timeout)
            .field("event_types", &self.event_types())
            .finish()
    }
}

#[async_trait]
impl MessageHandler for EventDispatcher {
    async fn handle_message(&self, key: Option<&str>, payload: &[u8]) {
        let outcome = self.dispatch(key, payload).await;
        debug!(consumer = %self.name, outcome = ?outcome, "Message handled");
    }
}
