// Copyright (c) 2025 - Cowboy AI, Inc.

//! Outbox Relay Service
//!
//! Runs the outbox relay for the user and task domains together with one
//! consumer per topic.
//!
//! - `EVENT_BUS=memory` (default): in-process buses, push path enabled,
//!   consumers read bus subscriptions.
//! - `EVENT_BUS=nats`: JetStream stream and durable pull consumers.
//!
//! Run with: cargo run --bin outbox-relay
//!
//! Stops on Ctrl-C after every loop has drained its current message.

use anyhow::{Context, Result};
use tracing::info;

use cim_outbox::{AppConfig, OutboxApp};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    info!("🚀 Starting Outbox Relay Service");

    let config = AppConfig::from_env().context("Failed to load configuration")?;
    info!(
        bus = ?config.bus,
        poll_interval_ms = config.relay.poll_interval.as_millis() as u64,
        batch_size = config.relay.batch_size,
        queue_capacity = config.relay.queue_capacity,
        "📋 Configuration loaded"
    );

    let app = OutboxApp::start(config)
        .await
        .context("Failed to start outbox app")?;
    let relay = app.relay();
    info!("✅ Relay running");

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for Ctrl-C")?;
    info!("🛑 Shutdown requested");

    let stats = app.shutdown().await;
    info!(
        published = stats.published,
        publish_failures = stats.publish_failures,
        unknown_type = stats.unknown_type,
        malformed = stats.malformed,
        stuck = relay.stuck_events().len(),
        "📊 Relay stopped"
    );
    Ok(())
}
