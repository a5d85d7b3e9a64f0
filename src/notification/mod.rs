//! Notification channel: per-user platform event delivery.
//!
//! Every authenticated connection doubles as its user's "personal room";
//! platform services publish typed events through [`EventPublisher`] and the
//! channel fans them out best-effort, with no queuing for offline users.

mod dispatcher;
mod handler;
mod message;
mod types;

pub use dispatcher::{EventPublisher, PublisherStatsSnapshot};
pub use handler::notify_ws_handler;
pub use message::{ClientMessage, ServerMessage};
pub use types::{EventKind, PlatformEvent};
