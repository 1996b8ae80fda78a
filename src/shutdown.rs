// Copyright (c) 2025 - Cowboy AI, Inc.

//! Cooperative shutdown signal shared by relay loops, consumers and
//! background tasks.
//!
//! A single [`Shutdown`] owns the signal; every long-running loop holds its own
//! [`ShutdownListener`] and selects on [`ShutdownListener::cancelled`] next to its
//! data-ready future. Triggering never interrupts work already in progress; the
//! loops simply stop picking up new work.

use tokio::sync::watch;
use tracing::info;

/// Owner of the shutdown signal
#[derive(Debug)]
pub struct Shutdown {
    tx: watch::Sender<bool>,
}

impl Shutdown {
    /// Create a new, untriggered shutdown signal
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self { tx }
    }

    /// Create a listener for a background loop
    pub fn listener(&self) -> ShutdownListener {
        ShutdownListener {
            rx: self.tx.subscribe(),
        }
    }

    /// Signal every listener to stop
    pub fn trigger(&self) {
        info!("Shutdown requested");
        self.tx.send_replace(true);
    }

    /// Whether the signal has been triggered
    pub fn is_triggered(&self) -> bool {
        *self.tx.borrow()
    }
}

impl Default for Shutdown {
    fn default() -> Self {
        Self::new()
    }
}

/// Receiving side of the shutdown signal
#[derive(Debug, Clone)]
pub struct ShutdownListener {
    rx: watch::Receiver<bool>,
}

impl ShutdownListener {
    /// Resolve once shutdown was triggered.
    ///
    /// A dropped [`Shutdown`] counts as triggered.
    pub async fn cancelled(&mut self) {
        while !*self.rx.borrow_and_update() {
            if self.rx.changed().await.is_err() {
                return;
            }
        }
    }

    /// Non-blocking check
    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_listener_resolves_after_trigger() {
        let shutdown = Shutdown::new();
        let mut listener = shutdown.listener();
        assert!(!listener.is_cancelled());

        shutdown.trigger();

        tokio::time::timeout(Duration::from_secs(1), listener.cancelled())
            .await
            .expect("listener should resolve");
        assert!(listener.is_cancelled());
        assert!(shutdown.is_triggered());
    }

    #[tokio::test]
    async fn test_dropped_owner_counts_as_cancelled() {
        let shutdown = Shutdown::new();
        let mut listener = shutdown.listener();
        drop(shutdown);

        tokio::time::timeout(Duration::from_secs(1), listener.cancelled())
            .await
            .expect("listener should resolve when owner is dropped");
    }

    #[tokio::test]
    async fn test_listener_created_after_trigger() {
        let shutdown = Shutdown::new();
        shutdown.trigger();

        let mut late = shutdown.listener();
        tokio::time::timeout(Duration::from_secs(1), late.cancelled())
            .await
            .expect("late listener should see the trigger");
    }
}
