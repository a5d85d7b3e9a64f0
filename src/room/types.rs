use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};

use crate::connection::User;

/// Most recent chat messages retained per room; older entries are evicted.
pub const CHAT_HISTORY_CAPACITY: usize = 50;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    pub id: String,
    pub user_id: String,
    pub username: String,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

impl ChatMessage {
    /// Id is time- and user-derived; uniqueness is best-effort.
    pub fn new(user: &User, content: String) -> Self {
        let timestamp = Utc::now();
        Self {
            id: format!("{}-{}", timestamp.timestamp_millis(), user.id),
            user_id: user.id.clone(),
            username: user.username.clone(),
            content,
            timestamp,
        }
    }
}

/// Room state. Exists in the registry iff it has at least one member.
#[derive(Debug, Default)]
pub(crate) struct Room {
    /// user_id -> User; rejoining replaces the prior entry
    pub members: HashMap<String, User>,
    pub chat_history: VecDeque<ChatMessage>,
}

/// State handed to a joining client so it can render the room.
#[derive(Debug, Clone)]
pub struct RoomSnapshot {
    pub users: Vec<User>,
    pub chat_history: Vec<ChatMessage>,
}
