// Copyright (c) 2025 - Cowboy AI, Inc.

//! NATS subject hierarchy for relayed integration events
//!
//! Every relayed event is published on:
//!
//! ```text
//! events.{topic}.{event_type}
//! ```
//!
//! Event types are dotted already (`user.created`), so a topic wildcard
//! (`events.user.>`) captures every event of one domain.
//!
//! # Examples
//!
//! ```rust
//! use cim_outbox::subjects::SubjectBuilder;
//!
//! let subject = SubjectBuilder::new()
//!     .topic("user")
//!     .event_type("user.created")
//!     .build();
//! assert_eq!(subject, "events.user.user.created");
//!
//! let wildcard = SubjectBuilder::new().topic("task").build_wildcard();
//! assert_eq!(wildcard, "events.task.>");
//! ```

/// Root namespace for all relayed events
pub const EVENTS_ROOT: &str = "events";

/// Header carrying the event id (JetStream duplicate suppression)
pub const MSG_ID_HEADER: &str = "Nats-Msg-Id";

/// Header carrying the partition/routing key
pub const PARTITION_KEY_HEADER: &str = "Partition-Key";

/// Header carrying the event type
pub const EVENT_TYPE_HEADER: &str = "Event-Type";

/// Builder for event subjects
#[derive(Debug, Clone)]
pub struct SubjectBuilder {
    root: String,
    topic: Option<String>,
    event_type: Option<String>,
}

impl SubjectBuilder {
    /// Create a builder rooted at [`EVENTS_ROOT`]
    pub fn new() -> Self {
        Self {
            root: EVENTS_ROOT.to_string(),
            topic: None,
            event_type: None,
        }
    }

    /// Use a custom root namespace
    pub fn root(mut self, root: impl Into<String>) -> Self {
        self.root = root.into();
        self
    }

    /// Set the topic (domain) segment
    pub fn topic(mut self, topic: impl Into<String>) -> Self {
        self.topic = Some(topic.into());
        self
    }

    /// Set the event type segment
    pub fn event_type(mut self, event_type: impl Into<String>) -> Self {
        self.event_type = Some(event_type.into());
        self
    }

    /// Build the concrete subject
    pub fn build(&self) -> String {
        let mut parts = vec![sanitize(&self.root)];
        if let Some(topic) = &self.topic {
            parts.push(sanitize(topic));
        }
        if let Some(event_type) = &self.event_type {
            parts.push(sanitize(event_type));
        }
        parts.join(".")
    }

    /// Build a wildcard covering everything below the configured segments
    pub fn build_wildcard(&self) -> String {
        let mut parts = vec![sanitize(&self.root)];
        if let Some(topic) = &self.topic {
            parts.push(sanitize(topic));
        }
        parts.push(">".to_string());
        parts.join(".")
    }
}

impl Default for SubjectBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Subject for one event type on one topic
pub fn event_subject(root: &str, topic: &str, event_type: &str) -> String {
    SubjectBuilder::new()
        .root(root)
        .topic(topic)
        .event_type(event_type)
        .build()
}

/// Wildcard subject for every event on one topic
pub fn topic_wildcard(root: &str, topic: &str) -> String {
    SubjectBuilder::new().root(root).topic(topic).build_wildcard()
}

// NATS tokens may not contain whitespace or wildcard characters.
fn sanitize(segment: &str) -> String {
    segment
        .trim_matches('.')
        .chars()
        .map(|c| match c {
            '*' | '>' => '_',
            c if c.is_whitespace() => '_',
            c => c,
        })
        .collect()
}
