//! Connection registry shared by the collaboration and notification services.

mod registry;
mod types;

pub use registry::{ConnectionManager, ConnectionStats};
pub use types::{ConnectionHandle, OutboundFrame, User};
