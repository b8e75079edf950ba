use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::broadcast;

use crate::config::WebSocketConfig;
use crate::connection_manager::ConnectionManager;
use crate::metrics::{HeartbeatMetrics, MemoryMetrics, PresenceMetrics};

/// Background liveness sweep.
///
/// Each tick closes connections that never answered the previous probe and
/// probes the rest, so a dead peer is gone within two intervals.
pub struct HeartbeatTask {
    interval: Duration,
    connection_manager: Arc<ConnectionManager>,
    shutdown: broadcast::Receiver<()>,
}

impl HeartbeatTask {
    pub fn new(
        config: &WebSocketConfig,
        connection_manager: Arc<ConnectionManager>,
        shutdown: broadcast::Receiver<()>,
    ) -> Self {
        Self::with_interval(
            Duration::from_secs(config.heartbeat_interval),
            connection_manager,
            shutdown,
        )
    }

    pub fn with_interval(
        interval: Duration,
        connection_manager: Arc<ConnectionManager>,
        shutdown: broadcast::Receiver<()>,
    ) -> Self {
        Self {
            interval,
            connection_manager,
            shutdown,
        }
    }

    pub async fn run(mut self) {
        let mut timer = tokio::time::interval(self.interval);
        // Skip immediate first tick
        timer.tick().await;

        tracing::info!(interval_ms = self.interval.as_millis() as u64, "Heartbeat task started");

        loop {
            tokio::select! {
                _ = self.shutdown.recv() => {
                    tracing::info!("Heartbeat task received shutdown signal");
                    break;
                }
                _ = timer.tick() => self.sweep(),
            }
        }

        tracing::info!("Heartbeat task stopped");
    }

    fn sweep(&self) {
        let start = Instant::now();
        let report = self.connection_manager.heartbeat_sweep();
        let elapsed_ms = start.elapsed().as_millis() as u64;

        HeartbeatMetrics::record_sweep(&report, elapsed_ms);
        PresenceMetrics::update(&self.connection_manager.stats());
        MemoryMetrics::update_process_memory();

        if report.terminated > 0 {
            tracing::info!(
                probed = report.probed,
                terminated = report.terminated,
                elapsed_ms = elapsed_ms,
                "Heartbeat sweep terminated dead connections"
            );
        } else {
            tracing::debug!(probed = report.probed, elapsed_ms = elapsed_ms, "Heartbeat sweep completed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::websocket::OutboundMessage;
    use tokio::sync::mpsc;

    #[tokio::test]
    async fn test_heartbeat_task_shutdown() {
        let connection_manager = Arc::new(ConnectionManager::new());
        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);

        let task = HeartbeatTask::new(&WebSocketConfig::default(), connection_manager, shutdown_rx);
        let handle = tokio::spawn(task.run());

        tokio::time::sleep(Duration::from_millis(50)).await;
        shutdown_tx.send(()).unwrap();

        tokio::time::timeout(Duration::from_secs(2), handle)
            .await
            .expect("Task should complete")
            .expect("Task should not panic");
    }

    #[tokio::test]
    async fn test_heartbeat_probes_connections() {
        let connection_manager = Arc::new(ConnectionManager::new());
        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);

        let (tx, mut rx) = mpsc::channel::<OutboundMessage>(10);
        let _handle = connection_manager.accept(tx).unwrap();
        let _ = rx.recv().await;

        let task = HeartbeatTask::with_interval(Duration::from_millis(50), connection_manager, shutdown_rx);
        let task_handle = tokio::spawn(task.run());

        let msg = tokio::time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .expect("Should receive probe")
            .expect("Channel should not be closed");
        assert!(matches!(msg, OutboundMessage::Probe));

        shutdown_tx.send(()).unwrap();
        let _ = task_handle.await;
    }

    #[tokio::test]
    async fn test_silent_connection_is_reaped() {
        let connection_manager = Arc::new(ConnectionManager::new());
        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);

        let (tx, _rx) = mpsc::channel::<OutboundMessage>(10);
        let handle = connection_manager.accept(tx).unwrap();
        connection_manager.authenticate(handle.id, "u1").unwrap();

        let task = HeartbeatTask::with_interval(Duration::from_millis(20), connection_manager.clone(), shutdown_rx);
        let task_handle = tokio::spawn(task.run());

        tokio::time::timeout(Duration::from_secs(2), handle.terminated())
            .await
            .expect("Silent connection should be terminated");
        assert!(connection_manager.get_connection(handle.id).is_none());
        assert_eq!(connection_manager.user_session_count("u1"), 0);

        shutdown_tx.send(()).unwrap();
        let _ = task_handle.await;
    }
}
