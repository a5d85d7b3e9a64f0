//! Best-effort fan-out of pre-serialized frames.
//!
//! All addressing modes resolve recipients through the connection manager at
//! dispatch time and enqueue without blocking: a closed or full recipient
//! channel is skipped silently and never aborts the rest of the fan-out.

use std::sync::Arc;

use crate::connection::{ConnectionHandle, ConnectionManager, OutboundFrame};
use crate::metrics::DeliveryMetrics;

pub struct Broadcaster {
    connections: Arc<ConnectionManager>,
}

impl Broadcaster {
    pub fn new(connections: Arc<ConnectionManager>) -> Self {
        Self { connections }
    }

    /// Send to every live connection of one user. Returns the number of
    /// connections the frame was enqueued to; 0 for an offline user.
    pub fn to_user(&self, user_id: &str, frame: &OutboundFrame) -> usize {
        let connections = self.connections.user_connections(user_id);
        self.deliver(&connections, None, frame)
    }

    /// Room fan-out: resolve each member id to its live connections and send,
    /// optionally excluding one user (e.g. the triggering sender).
    pub fn to_users(
        &self,
        user_ids: &[String],
        exclude_user_id: Option<&str>,
        frame: &OutboundFrame,
    ) -> usize {
        let mut delivered = 0;
        for user_id in user_ids {
            if exclude_user_id == Some(user_id.as_str()) {
                continue;
            }
            delivered += self.to_user(user_id, frame);
        }
        delivered
    }

    /// Send to every connection subscribed to a channel.
    pub fn to_channel(&self, channel: &str, frame: &OutboundFrame) -> usize {
        let connections = self.connections.channel_connections(channel);
        self.deliver(&connections, None, frame)
    }

    /// Send to every registered connection.
    pub fn to_all(&self, frame: &OutboundFrame) -> usize {
        let connections = self.connections.all_connections();
        self.deliver(&connections, None, frame)
    }

    fn deliver(
        &self,
        connections: &[Arc<ConnectionHandle>],
        exclude_user_id: Option<&str>,
        frame: &OutboundFrame,
    ) -> usize {
        let mut delivered = 0;
        let mut dropped = 0;

        for connection in connections {
            if exclude_user_id == Some(connection.user.id.as_str()) {
                continue;
            }
            if connection.try_send(frame.clone()) {
                delivered += 1;
            } else {
                dropped += 1;
                tracing::debug!(
                    connection_id = %connection.id,
                    user_id = %connection.user.id,
                    "Skipping undeliverable recipient"
                );
            }
        }

        DeliveryMetrics::record(delivered as u64, dropped as u64);
        delivered
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::User;
    use tokio::sync::mpsc;

    fn frame() -> OutboundFrame {
        OutboundFrame::encode(&serde_json::json!({"type": "test"})).unwrap()
    }

    fn register(
        manager: &ConnectionManager,
        id: &str,
    ) -> (Arc<ConnectionHandle>, mpsc::Receiver<OutboundFrame>) {
        let (tx, rx) = mpsc::channel(8);
        (manager.register(User::new(id, id), tx), rx)
    }

    #[tokio::test]
    async fn test_to_user_reaches_every_connection_of_the_user() {
        let manager = Arc::new(ConnectionManager::new());
        let broadcaster = Broadcaster::new(manager.clone());

        let (_h1, mut rx1) = register(&manager, "u1");
        let (_h2, mut rx2) = register(&manager, "u1");

        assert_eq!(broadcaster.to_user("u1", &frame()), 2);
        assert!(rx1.try_recv().is_ok());
        assert!(rx2.try_recv().is_ok());
    }

    #[tokio::test]
    async fn test_to_user_offline_is_silent_noop() {
        let manager = Arc::new(ConnectionManager::new());
        let broadcaster = Broadcaster::new(manager);

        assert_eq!(broadcaster.to_user("nobody", &frame()), 0);
    }

    #[tokio::test]
    async fn test_to_users_excludes_sender() {
        let manager = Arc::new(ConnectionManager::new());
        let broadcaster = Broadcaster::new(manager.clone());

        let (_h1, mut rx1) = register(&manager, "u1");
        let (_h2, mut rx2) = register(&manager, "u2");

        let members = vec!["u1".to_string(), "u2".to_string()];
        assert_eq!(broadcaster.to_users(&members, Some("u1"), &frame()), 1);
        assert!(rx1.try_recv().is_err());
        assert!(rx2.try_recv().is_ok());
    }

    #[tokio::test]
    async fn test_closed_recipient_does_not_abort_fanout() {
        let manager = Arc::new(ConnectionManager::new());
        let broadcaster = Broadcaster::new(manager.clone());

        let (_h1, rx1) = register(&manager, "u1");
        let (_h2, mut rx2) = register(&manager, "u2");
        drop(rx1);

        let members = vec!["u1".to_string(), "u2".to_string()];
        assert_eq!(broadcaster.to_users(&members, None, &frame()), 1);
        assert!(rx2.try_recv().is_ok());
    }

    #[tokio::test]
    async fn test_to_all() {
        let manager = Arc::new(ConnectionManager::new());
        let broadcaster = Broadcaster::new(manager.clone());

        let (_h1, mut rx1) = register(&manager, "u1");
        let (_h2, mut rx2) = register(&manager, "u2");

        assert_eq!(broadcaster.to_all(&frame()), 2);
        assert!(rx1.try_recv().is_ok());
        assert!(rx2.try_recv().is_ok());
    }
}
