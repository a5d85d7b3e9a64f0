use serde::{Deserialize, Serialize};

/// Control-plane messages on the notification socket: ad hoc room membership
/// beyond the implicit personal room. No join/leave broadcasts here.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    JoinRoom { room: String },
    LeaveRoom { room: String },
}

/// Non-event frames the channel sends. Events themselves go out as
/// [`PlatformEvent`](super::PlatformEvent).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    Heartbeat,
    Error { message: String },
}

impl ServerMessage {
    pub fn error(message: impl Into<String>) -> Self {
        Self::Error {
            message: message.into(),
        }
    }
}
