use dashmap::DashMap;

use crate::connection::User;

use super::types::{ChatMessage, Room, RoomSnapshot, CHAT_HISTORY_CAPACITY};

/// Owns the room_id -> room mapping.
///
/// Rooms are created lazily on first join and removed synchronously when the
/// last member leaves, so a room is present iff its member count is above
/// zero. Mutation of one room is serialized by the map's per-entry locking;
/// snapshots are copied out so no lock is ever held across a socket send.
/// This registry never broadcasts - fan-out is the caller's concern.
pub struct RoomRegistry {
    rooms: DashMap<String, Room>,
}

impl RoomRegistry {
    pub fn new() -> Self {
        Self {
            rooms: DashMap::new(),
        }
    }

    /// Add a user to a room, creating the room if needed. Rejoining with the
    /// same user id replaces the prior entry instead of duplicating it.
    /// Returns the member list and chat history for the joiner's initial render.
    pub fn join(&self, room_id: &str, user: User) -> RoomSnapshot {
        let mut room = self
            .rooms
            .entry(room_id.to_string())
            .or_insert_with(Room::default);

        room.members.insert(user.id.clone(), user);

        let snapshot = RoomSnapshot {
            users: room.members.values().cloned().collect(),
            chat_history: room.chat_history.iter().cloned().collect(),
        };

        tracing::debug!(
            room_id = %room_id,
            members = room.members.len(),
            "User joined room"
        );

        snapshot
    }

    /// Remove a member; deletes the room once it empties (history discarded).
    /// Returns false for an unknown room or a user that never joined.
    pub fn leave(&self, room_id: &str, user_id: &str) -> bool {
        let removed = match self.rooms.get_mut(room_id) {
            Some(mut room) => room.members.remove(user_id).is_some(),
            None => return false,
        };

        if self
            .rooms
            .remove_if(room_id, |_, room| room.members.is_empty())
            .is_some()
        {
            tracing::debug!(room_id = %room_id, "Removed empty room");
        }

        removed
    }

    /// Append to the room's history, evicting from the front past capacity.
    /// Returns false if the room does not exist. Does not broadcast.
    pub fn append_chat(&self, room_id: &str, message: ChatMessage) -> bool {
        match self.rooms.get_mut(room_id) {
            Some(mut room) => {
                room.chat_history.push_back(message);
                if room.chat_history.len() > CHAT_HISTORY_CAPACITY {
                    room.chat_history.pop_front();
                }
                true
            }
            None => false,
        }
    }

    /// Current member ids of a room; empty if the room does not exist.
    pub fn member_ids(&self, room_id: &str) -> Vec<String> {
        self.rooms
            .get(room_id)
            .map(|room| room.members.keys().cloned().collect())
            .unwrap_or_default()
    }

    pub fn contains(&self, room_id: &str) -> bool {
        self.rooms.contains_key(room_id)
    }

    pub fn member_count(&self, room_id: &str) -> usize {
        self.rooms
            .get(room_id)
            .map(|room| room.members.len())
            .unwrap_or(0)
    }

    pub fn room_count(&self) -> usize {
        self.rooms.len()
    }
}

impl Default for RoomRegistry {
    fn default() -> Self {
        Self::new()
    }
}
