//! NATS connection setup shared by the broker publisher and the consumer transport

use async_nats::{jetstream, Client, ConnectOptions};
use std::time::Duration;
use tracing::info;

use crate::errors::{OutboxError, OutboxResult};

/// Configuration for NATS connection
#[derive(Debug, Clone)]
pub struct NatsConfig {
    /// NATS server URLs
    pub servers: Vec<String>,
    /// Client name
    pub name: String,
    /// Connection timeout
    pub connect_timeout: Duration,
    /// Request timeout (also bounds JetStream publish acks)
    pub request_timeout: Duration,
}

impl Default for NatsConfig {
    fn default() -> Self {
        Self {
            servers: vec!["nats://localhost:4222".to_string()],
            name: "cim-outbox".to_string(),
            connect_timeout: Duration::from_secs(10),
            request_timeout: Duration::from_secs(5),
        }
    }
}

/// Connect to NATS with the given configuration
pub async fn connect(config: &NatsConfig) -> OutboxResult<Client> {
    let connect_options = ConnectOptions::new()
        .name(&config.name)
        .connection_timeout(config.connect_timeout)
        .request_timeout(Some(config.request_timeout));

    let client = async_nats::connect_with_options(config.servers.join(","), connect_options)
        .await
        .map_err(|e| OutboxError::NatsConnection(e.to_string()))?;

    info!(servers = ?config.servers, "Connected to NATS");

    Ok(client)
}

/// Connect and return a JetStream context
pub async fn connect_jetstream(config: &NatsConfig) -> OutboxResult<jetstream::Context> {
    let client = connect(config).await?;
    Ok(jetstream::new(client))
}
