//! Connection handle and related types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, RwLock};
use uuid::Uuid;

use crate::auth::Claims;

/// Authenticated identity attached to a connection, immutable for its lifetime.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub username: String,
}

impl User {
    pub fn new(id: impl Into<String>, username: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            username: username.into(),
        }
    }

    pub fn from_claims(claims: &Claims) -> Self {
        let username = if claims.username.is_empty() {
            claims.sub.clone()
        } else {
            claims.username.clone()
        };
        Self {
            id: claims.sub.clone(),
            username,
        }
    }
}

/// A frame serialized once and shared by every recipient of a fan-out.
#[derive(Debug, Clone)]
pub struct OutboundFrame(Arc<str>);

impl OutboundFrame {
    pub fn encode<T: Serialize>(message: &T) -> Result<Self, serde_json::Error> {
        Ok(Self(serde_json::to_string(message)?.into()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Handle for a single WebSocket connection
pub struct ConnectionHandle {
    pub id: Uuid,
    pub user: User,
    pub sender: mpsc::Sender<OutboundFrame>,
    pub connected_at: DateTime<Utc>,
    /// Last activity timestamp (Unix seconds) - AtomicI64 for lock-free updates
    last_activity: AtomicI64,
    /// Rooms (collaboration) or channels (notification) this connection joined
    pub memberships: RwLock<HashSet<String>>,
}

impl ConnectionHandle {
    pub fn new(user: User, sender: mpsc::Sender<OutboundFrame>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            user,
            sender,
            connected_at: now,
            last_activity: AtomicI64::new(now.timestamp()),
            memberships: RwLock::new(HashSet::new()),
        }
    }

    pub fn update_activity(&self) {
        self.last_activity
            .store(Utc::now().timestamp(), Ordering::Relaxed);
    }

    pub fn last_activity(&self) -> DateTime<Utc> {
        DateTime::from_timestamp(self.last_activity.load(Ordering::Relaxed), 0)
            .unwrap_or_else(Utc::now)
    }

    /// Send a frame, waiting for channel capacity. Used for direct replies
    /// to this connection (initial room state, error frames).
    pub async fn send(
        &self,
        frame: OutboundFrame,
    ) -> Result<(), mpsc::error::SendError<OutboundFrame>> {
        self.sender.send(frame).await
    }

    /// Non-blocking send used by fan-out paths. A closed or full channel
    /// counts as an undeliverable recipient, never as an error.
    pub fn try_send(&self, frame: OutboundFrame) -> bool {
        self.sender.try_send(frame).is_ok()
    }
}
