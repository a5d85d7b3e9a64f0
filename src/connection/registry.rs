use chrono::Utc;
use dashmap::DashMap;
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::mpsc;
use uuid::Uuid;

use super::types::{ConnectionHandle, OutboundFrame, User};

/// Manages all active WebSocket connections of one service.
///
/// The collaboration and notification services each own an instance, so a
/// user id addresses only connections of the service being dispatched to.
pub struct ConnectionManager {
    /// connection_id -> ConnectionHandle
    connections: DashMap<Uuid, Arc<ConnectionHandle>>,
    /// user_id -> Set<connection_id> (a user may hold several connections)
    user_index: DashMap<String, HashSet<Uuid>>,
    /// channel_name -> Set<connection_id>
    channel_index: DashMap<String, HashSet<Uuid>>,
}

impl ConnectionManager {
    pub fn new() -> Self {
        Self {
            connections: DashMap::new(),
            user_index: DashMap::new(),
            channel_index: DashMap::new(),
        }
    }

    /// Register a new connection
    pub fn register(&self, user: User, sender: mpsc::Sender<OutboundFrame>) -> Arc<ConnectionHandle> {
        let handle = Arc::new(ConnectionHandle::new(user, sender));
        let conn_id = handle.id;

        self.connections.insert(conn_id, handle.clone());

        self.user_index
            .entry(handle.user.id.clone())
            .or_default()
            .insert(conn_id);

        tracing::info!(connection_id = %conn_id, user_id = %handle.user.id, "Connection registered");

        handle
    }

    /// Unregister a connection
    pub fn unregister(&self, connection_id: Uuid) {
        if let Some((_, handle)) = self.connections.remove(&connection_id) {
            // Remove from user index
            if let Some(mut user_conns) = self.user_index.get_mut(&handle.user.id) {
                user_conns.remove(&connection_id);
                if user_conns.is_empty() {
                    drop(user_conns);
                    self.user_index.remove(&handle.user.id);
                }
            }

            // Remove from all channel subscriptions
            for mut entry in self.channel_index.iter_mut() {
                entry.value_mut().remove(&connection_id);
            }

            // Clean up empty channels
            self.channel_index.retain(|_, conns| !conns.is_empty());

            tracing::info!(connection_id = %connection_id, user_id = %handle.user.id, "Connection unregistered");
        }
    }

    /// Subscribe a connection to a channel
    pub async fn join_channel(&self, connection_id: Uuid, channel: &str) {
        if let Some(handle) = self.connections.get(&connection_id) {
            handle.memberships.write().await.insert(channel.to_string());

            self.channel_index
                .entry(channel.to_string())
                .or_default()
                .insert(connection_id);

            tracing::debug!(connection_id = %connection_id, channel = %channel, "Joined channel");
        }
    }

    /// Unsubscribe a connection from a channel
    pub async fn leave_channel(&self, connection_id: Uuid, channel: &str) {
        if let Some(handle) = self.connections.get(&connection_id) {
            handle.memberships.write().await.remove(channel);

            if let Some(mut channel_conns) = self.channel_index.get_mut(channel) {
                channel_conns.remove(&connection_id);
                if channel_conns.is_empty() {
                    drop(channel_conns);
                    self.channel_index.remove(channel);
                }
            }

            tracing::debug!(connection_id = %connection_id, channel = %channel, "Left channel");
        }
    }

    /// Get all connections for a user
    pub fn user_connections(&self, user_id: &str) -> Vec<Arc<ConnectionHandle>> {
        self.user_index
            .get(user_id)
            .map(|conn_ids| {
                conn_ids
                    .iter()
                    .filter_map(|id| self.connections.get(id).map(|h| h.clone()))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Get all connections subscribed to a channel
    pub fn channel_connections(&self, channel: &str) -> Vec<Arc<ConnectionHandle>> {
        self.channel_index
            .get(channel)
            .map(|conn_ids| {
                conn_ids
                    .iter()
                    .filter_map(|id| self.connections.get(id).map(|h| h.clone()))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Get all connections
    pub fn all_connections(&self) -> Vec<Arc<ConnectionHandle>> {
        self.connections.iter().map(|r| r.value().clone()).collect()
    }

    pub fn is_user_connected(&self, user_id: &str) -> bool {
        self.user_index.contains_key(user_id)
    }

    /// Get statistics
    pub fn stats(&self) -> ConnectionStats {
        let mut channel_counts = std::collections::HashMap::new();
        for entry in self.channel_index.iter() {
            channel_counts.insert(entry.key().clone(), entry.value().len());
        }

        ConnectionStats {
            total_connections: self.connections.len(),
            unique_users: self.user_index.len(),
            channels: channel_counts,
        }
    }

    /// Find connections that have been inactive for longer than the timeout
    pub fn find_stale_connections(&self, timeout_secs: u64) -> Vec<Uuid> {
        let now = Utc::now();
        let timeout = chrono::Duration::seconds(timeout_secs as i64);

        self.connections
            .iter()
            .filter(|entry| now.signed_duration_since(entry.value().last_activity()) > timeout)
            .map(|entry| *entry.key())
            .collect()
    }

    /// Remove stale connections from routing and return the removed count.
    /// The socket task itself reaps the connection on its next I/O failure.
    pub fn cleanup_stale_connections(&self, timeout_secs: u64) -> usize {
        let stale = self.find_stale_connections(timeout_secs);
        let count = stale.len();

        for conn_id in stale {
            tracing::info!(connection_id = %conn_id, "Removing stale connection due to timeout");
            self.unregister(conn_id);
        }

        count
    }
}

impl Default for ConnectionManager {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct ConnectionStats {
    pub total_connections: usize,
    pub unique_users: usize,
    pub channels: std::collections::HashMap<String, usize>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn register_test_user(manager: &ConnectionManager, id: &str) -> Arc<ConnectionHandle> {
        // These tests only inspect the indexes, so the receiver can drop.
        let (tx, _rx) = mpsc::channel(8);
        manager.register(User::new(id, id), tx)
    }

    #[test]
    fn test_register_and_unregister_updates_indexes() {
        let manager = ConnectionManager::new();
        let handle = register_test_user(&manager, "u1");

        assert_eq!(manager.stats().total_connections, 1);
        assert!(manager.is_user_connected("u1"));

        manager.unregister(handle.id);
        assert_eq!(manager.stats().total_connections, 0);
        assert!(!manager.is_user_connected("u1"));
    }

    #[test]
    fn test_multiple_connections_per_user() {
        let manager = ConnectionManager::new();
        let first = register_test_user(&manager, "u1");
        let _second = register_test_user(&manager, "u1");

        assert_eq!(manager.user_connections("u1").len(), 2);
        assert_eq!(manager.stats().unique_users, 1);

        manager.unregister(first.id);
        assert_eq!(manager.user_connections("u1").len(), 1);
        assert!(manager.is_user_connected("u1"));
    }

    #[tokio::test]
    async fn test_channel_join_and_leave() {
        let manager = ConnectionManager::new();
        let handle = register_test_user(&manager, "u1");

        manager.join_channel(handle.id, "announcements").await;
        assert_eq!(manager.channel_connections("announcements").len(), 1);
        assert!(handle.memberships.read().await.contains("announcements"));

        manager.leave_channel(handle.id, "announcements").await;
        assert!(manager.channel_connections("announcements").is_empty());
        assert_eq!(manager.stats().channels.len(), 0);
    }

    #[tokio::test]
    async fn test_unregister_removes_channel_subscriptions() {
        let manager = ConnectionManager::new();
        let handle = register_test_user(&manager, "u1");

        manager.join_channel(handle.id, "topic-1").await;
        manager.unregister(handle.id);

        assert!(manager.channel_connections("topic-1").is_empty());
        assert_eq!(manager.stats().channels.len(), 0);
    }
}
