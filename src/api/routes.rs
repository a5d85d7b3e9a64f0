use axum::{
    middleware,
    routing::{get, post},
    Router,
};

use crate::server::{api_key_auth, AppState};

use super::health::{health, stats};
use super::metrics::prometheus_metrics;
use super::publish::{broadcast_event, channel_event, publish_event};

pub fn api_routes(state: AppState) -> Router<AppState> {
    // Publish endpoints are for platform services, not browsers
    let events = Router::new()
        .route("/events/publish", post(publish_event))
        .route("/events/broadcast", post(broadcast_event))
        .route("/events/channel", post(channel_event))
        .layer(middleware::from_fn_with_state(state, api_key_auth));

    Router::new()
        // Health & Stats
        .route("/health", get(health))
        .route("/stats", get(stats))
        .route("/metrics", get(prometheus_metrics))
        .nest("/api/v1", events)
}
