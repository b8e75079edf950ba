//! Graceful shutdown handling.
//!
//! 1. Signal background tasks (heartbeat) to stop
//! 2. Terminate every registered connection
//! 3. Wait, bounded, until the registry is empty

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::broadcast;
use tokio::time::timeout;

use crate::connection_manager::ConnectionManager;

#[derive(Debug, Clone)]
pub struct ShutdownConfig {
    /// Upper bound on waiting for the registry to drain (default: 10 seconds)
    pub drain_timeout: Duration,
    /// Delay between drain checks (default: 50 ms)
    pub poll_interval: Duration,
}

impl Default for ShutdownConfig {
    fn default() -> Self {
        Self {
            drain_timeout: Duration::from_secs(10),
            poll_interval: Duration::from_millis(50),
        }
    }
}

pub struct GracefulShutdown {
    connection_manager: Arc<ConnectionManager>,
    shutdown_tx: broadcast::Sender<()>,
    config: ShutdownConfig,
}

impl GracefulShutdown {
    pub fn new(connection_manager: Arc<ConnectionManager>, shutdown_tx: broadcast::Sender<()>) -> Self {
        Self::with_config(connection_manager, shutdown_tx, ShutdownConfig::default())
    }

    pub fn with_config(
        connection_manager: Arc<ConnectionManager>,
        shutdown_tx: broadcast::Sender<()>,
        config: ShutdownConfig,
    ) -> Self {
        Self {
            connection_manager,
            shutdown_tx,
            config,
        }
    }

    #[tracing::instrument(
        name = "graceful_shutdown",
        skip(self),
        fields(total_connections = self.connection_manager.stats().total_connections)
    )]
    pub async fn execute(&self, reason: &str) -> ShutdownResult {
        let start = Instant::now();
        let mut result = ShutdownResult::default();

        tracing::info!(reason = %reason, "Starting graceful shutdown - Phase 1: Stopping background tasks");
        // No receivers left is fine
        let _ = self.shutdown_tx.send(());

        tracing::info!("Phase 2: Terminating connections");
        result.connections_closed = self.connection_manager.disconnect_all();

        tracing::info!("Phase 3: Waiting for registry to drain");
        match timeout(self.config.drain_timeout, self.drain()).await {
            Ok(late) => {
                result.connections_closed += late;
                result.drained = true;
            }
            Err(_) => {
                tracing::warn!(
                    remaining = self.connection_manager.stats().total_connections,
                    "Drain timeout, some connections are still registered"
                );
            }
        }

        result.duration = start.elapsed();

        tracing::info!(
            connections_closed = result.connections_closed,
            drained = result.drained,
            duration_ms = result.duration.as_millis() as u64,
            "Graceful shutdown completed"
        );

        result
    }

    /// Close stragglers accepted while the listener was stopping
    async fn drain(&self) -> usize {
        let mut closed = 0;
        loop {
            if self.connection_manager.stats().total_connections == 0 {
                return closed;
            }
            closed += self.connection_manager.disconnect_all();
            tokio::time::sleep(self.config.poll_interval).await;
        }
    }
}

#[derive(Debug, Default)]
pub struct ShutdownResult {
    pub connections_closed: usize,
    /// Registry was empty before the drain timeout
    pub drained: bool,
    pub duration: Duration,
}
