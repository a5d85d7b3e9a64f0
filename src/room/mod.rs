//! Collaboration rooms: member sets and bounded chat history.

mod registry;
mod types;

pub use registry::RoomRegistry;
pub use types::{ChatMessage, RoomSnapshot, CHAT_HISTORY_CAPACITY};
