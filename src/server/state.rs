use std::sync::Arc;

use crate::auth::JwtValidator;
use crate::broadcast::Broadcaster;
use crate::config::Settings;
use crate::connection::ConnectionManager;
use crate::notification::EventPublisher;
use crate::room::RoomRegistry;

/// Explicitly constructed service state, injected into every handler.
/// Each WebSocket service owns its own connection registry, so user ids
/// address only connections of the service being dispatched to.
#[derive(Clone)]
pub struct AppState {
    pub settings: Arc<Settings>,
    pub jwt_validator: Arc<JwtValidator>,
    pub collab_connections: Arc<ConnectionManager>,
    pub notify_connections: Arc<ConnectionManager>,
    pub rooms: Arc<RoomRegistry>,
    /// Fan-out over the collaboration connections
    pub broadcaster: Arc<Broadcaster>,
    /// Publish primitive over the notification connections
    pub publisher: Arc<EventPublisher>,
}

impl AppState {
    pub fn new(settings: Settings) -> Self {
        let jwt_validator = Arc::new(JwtValidator::new(&settings.jwt));
        let collab_connections = Arc::new(ConnectionManager::new());
        let notify_connections = Arc::new(ConnectionManager::new());
        let rooms = Arc::new(RoomRegistry::new());
        let broadcaster = Arc::new(Broadcaster::new(collab_connections.clone()));
        let publisher = Arc::new(EventPublisher::new(notify_connections.clone()));

        Self {
            settings: Arc::new(settings),
            jwt_validator,
            collab_connections,
            notify_connections,
            rooms,
            broadcaster,
            publisher,
        }
    }
}
