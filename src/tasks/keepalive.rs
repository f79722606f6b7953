use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;

use crate::config::WebSocketConfig;
use crate::connections::ConnectionSet;
use crate::websocket::OutboundFrame;

/// Background task that pings every connection at a fixed interval.
///
/// The relay never expires sessions on its own; disconnect is the only
/// teardown trigger. The pings make dead transports surface as socket
/// errors, which end the connection tasks and run the ordinary
/// disconnect path.
pub struct KeepaliveTask {
    config: WebSocketConfig,
    connections: Arc<ConnectionSet>,
    shutdown: broadcast::Receiver<()>,
}

impl KeepaliveTask {
    pub fn new(
        config: WebSocketConfig,
        connections: Arc<ConnectionSet>,
        shutdown: broadcast::Receiver<()>,
    ) -> Self {
        Self {
            config,
            connections,
            shutdown,
        }
    }

    /// Run the keepalive loop until shutdown
    pub async fn run(mut self) {
        if self.config.keepalive_interval == 0 {
            tracing::info!("Keepalive task disabled");
            let _ = self.shutdown.recv().await;
            return;
        }

        let mut timer =
            tokio::time::interval(Duration::from_secs(self.config.keepalive_interval));

        // Skip immediate first tick
        timer.tick().await;

        tracing::info!(
            interval_secs = self.config.keepalive_interval,
            "Keepalive task started"
        );

        loop {
            tokio::select! {
                _ = self.shutdown.recv() => {
                    tracing::info!("Keepalive task received shutdown signal");
                    break;
                }
                _ = timer.tick() => {
                    self.ping_all();
                }
            }
        }

        tracing::info!("Keepalive task stopped");
    }

    /// Offer a ping to every connection's queue without waiting.
    fn ping_all(&self) {
        let connections = self.connections.all();
        let total = connections.len();

        if total == 0 {
            return;
        }

        let mut failed = 0;
        for handle in &connections {
            if handle.try_send_frame(OutboundFrame::Ping).is_err() {
                failed += 1;
                tracing::debug!(
                    connection_id = %handle.id,
                    "Failed to queue ping, connection may be dead"
                );
            }
        }

        tracing::debug!(total = total, failed = failed, "Keepalive round completed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    #[tokio::test]
    async fn test_keepalive_task_shutdown() {
        let config = WebSocketConfig::default();
        let connections = Arc::new(ConnectionSet::new());
        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);

        let task = KeepaliveTask::new(config, connections, shutdown_rx);

        // Spawn the task
        let handle = tokio::spawn(async move {
            task.run().await;
        });

        // Wait a bit then send shutdown
        tokio::time::sleep(Duration::from_millis(100)).await;
        shutdown_tx.send(()).unwrap();

        // Task should complete
        tokio::time::timeout(Duration::from_secs(2), handle)
            .await
            .expect("Task should complete")
            .expect("Task should not panic");
    }

    #[tokio::test]
    async fn test_keepalive_pings_connections() {
        let config = WebSocketConfig {
            keepalive_interval: 1,
            ..Default::default()
        };
        let connections = Arc::new(ConnectionSet::new());
        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);

        let (tx, mut rx) = mpsc::channel::<OutboundFrame>(10);
        connections.register(tx);

        let task = KeepaliveTask::new(config, connections, shutdown_rx);

        let task_handle = tokio::spawn(async move {
            task.run().await;
        });

        // Wait for a ping
        let frame = tokio::time::timeout(Duration::from_secs(3), rx.recv())
            .await
            .expect("Should receive ping")
            .expect("Channel should not be closed");

        assert!(matches!(frame, OutboundFrame::Ping));

        // Shutdown
        shutdown_tx.send(()).unwrap();
        let _ = task_handle.await;
    }

    #[tokio::test]
    async fn test_keepalive_disabled_sends_nothing() {
        let config = WebSocketConfig {
            keepalive_interval: 0,
            ..Default::default()
        };
        let connections = Arc::new(ConnectionSet::new());
        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);

        let (tx, mut rx) = mpsc::channel::<OutboundFrame>(10);
        connections.register(tx);

        let task = KeepaliveTask::new(config, connections, shutdown_rx);
        let task_handle = tokio::spawn(async move {
            task.run().await;
        });

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(rx.try_recv().is_err());

        shutdown_tx.send(()).unwrap();
        tokio::time::timeout(Duration::from_secs(2), task_handle)
            .await
            .expect("Task should complete")
            .expect("Task should not panic");
    }
}
