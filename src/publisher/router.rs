//! Topic based routing across publishers

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;

use super::{EventPublisher, InMemoryEventBus, PublishError};
use crate::registry::DecodedEvent;

/// Publishes each event through the publisher attached to its topic
#[derive(Default)]
pub struct TopicRouter {
    routes: HashMap<String, Arc<dyn EventPublisher>>,
}

impl TopicRouter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach `publisher` to `topic`, replacing any previous route
    pub fn route(mut self, topic: impl Into<String>, publisher: Arc<dyn EventPublisher>) -> Self {
        self.routes.insert(topic.into(), publisher);
        self
    }

    /// Attach a bus under its own topic
    pub fn with_bus(self, bus: Arc<InMemoryEventBus>) -> Self {
        let topic = bus.topic().to_string();
        self.route(topic, bus)
    }

    /// Routed topics, sorted
    pub fn topics(&self) -> Vec<&str> {
        let mut topics: Vec<&str> = self.routes.keys().map(String::as_str).collect();
        topics.sort_unstable();
        topics
    }
}

impl std::fmt::Debug for TopicRouter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TopicRouter")
            .field("topics", &self.topics())
            .finish()
    }
}

#[async_trait]
impl EventPublisher for TopicRouter {
    async fn publish(&self, event: &DecodedEvent) -> Result<(), PublishError> {
        let publisher = self
            .routes
            .get(&event.topic)
            .ok_or_else(|| PublishError::NoRoute(event.topic.clone()))?;
        publisher.publish(event).await
    }
}
