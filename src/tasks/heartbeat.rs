use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::broadcast;

use crate::config::WebSocketConfig;
use crate::connection::{ConnectionManager, OutboundFrame};
use crate::notification::ServerMessage;

/// Background task for heartbeat and connection cleanup.
///
/// Covers both registries: the heartbeat frame keeps intermediaries from
/// closing idle sockets, and the cleanup pass drops connections whose
/// activity timestamp went stale from routing.
pub struct HeartbeatTask {
    config: WebSocketConfig,
    collab_connections: Arc<ConnectionManager>,
    notify_connections: Arc<ConnectionManager>,
    shutdown: broadcast::Receiver<()>,
}

impl HeartbeatTask {
    pub fn new(
        config: WebSocketConfig,
        collab_connections: Arc<ConnectionManager>,
        notify_connections: Arc<ConnectionManager>,
        shutdown: broadcast::Receiver<()>,
    ) -> Self {
        Self {
            config,
            collab_connections,
            notify_connections,
            shutdown,
        }
    }

    /// Run the heartbeat and cleanup loops until shutdown.
    pub async fn run(mut self) {
        let heartbeat_interval = Duration::from_secs(self.config.heartbeat_interval);
        let cleanup_interval = Duration::from_secs(self.config.cleanup_interval);
        let connection_timeout = self.config.connection_timeout;

        let mut heartbeat_timer = tokio::time::interval(heartbeat_interval);
        let mut cleanup_timer = tokio::time::interval(cleanup_interval);

        // Skip immediate first tick
        heartbeat_timer.tick().await;
        cleanup_timer.tick().await;

        tracing::info!(
            heartbeat_interval_secs = self.config.heartbeat_interval,
            cleanup_interval_secs = self.config.cleanup_interval,
            connection_timeout_secs = connection_timeout,
            "Heartbeat task started"
        );

        loop {
            tokio::select! {
                _ = self.shutdown.recv() => {
                    tracing::info!("Heartbeat task received shutdown signal");
                    break;
                }
                _ = heartbeat_timer.tick() => {
                    self.send_heartbeats();
                }
                _ = cleanup_timer.tick() => {
                    self.cleanup_stale_connections(connection_timeout);
                }
            }
        }

        tracing::info!("Heartbeat task stopped");
    }

    /// Send a heartbeat frame to every connection of both services.
    fn send_heartbeats(&self) {
        let frame = match OutboundFrame::encode(&ServerMessage::Heartbeat) {
            Ok(frame) => frame,
            Err(e) => {
                tracing::error!(error = %e, "Failed to serialize heartbeat frame");
                return;
            }
        };

        let start = Instant::now();
        let mut sent = 0usize;
        let mut failed = 0usize;

        for manager in [&self.collab_connections, &self.notify_connections] {
            for handle in manager.all_connections() {
                if handle.try_send(frame.clone()) {
                    sent += 1;
                } else {
                    failed += 1;
                    tracing::debug!(
                        connection_id = %handle.id,
                        "Failed to send heartbeat, connection may be dead"
                    );
                }
            }
        }

        if sent + failed > 0 {
            tracing::debug!(
                sent = sent,
                failed = failed,
                elapsed_ms = start.elapsed().as_millis() as u64,
                "Heartbeat round completed"
            );
        }
    }

    /// Drop connections without recent activity from both registries.
    fn cleanup_stale_connections(&self, timeout_secs: u64) {
        let removed = self.collab_connections.cleanup_stale_connections(timeout_secs)
            + self.notify_connections.cleanup_stale_connections(timeout_secs);

        if removed > 0 {
            tracing::info!(
                removed = removed,
                timeout_secs = timeout_secs,
                "Cleaned up stale connections"
            );
        }
    }
}
