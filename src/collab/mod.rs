//! Collaborative editing service: rooms with chat and live code-change relay.

mod handler;
mod message;

pub use handler::collab_ws_handler;
pub use message::{ClientMessage, CodeChange, CodeOperation, ServerMessage};
