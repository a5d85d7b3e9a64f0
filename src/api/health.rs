use axum::{extract::State, Json};
use serde::Serialize;

use crate::connection::ConnectionStats;
use crate::notification::PublisherStatsSnapshot;
use crate::server::AppState;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

#[derive(Debug, Serialize)]
pub struct StatsResponse {
    pub collab: ConnectionStats,
    pub notifications: ConnectionStats,
    pub rooms: usize,
    pub publisher: PublisherStatsSnapshot,
}

pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

pub async fn stats(State(state): State<AppState>) -> Json<StatsResponse> {
    Json(StatsResponse {
        collab: state.collab_connections.stats(),
        notifications: state.notify_connections.stats(),
        rooms: state.rooms.room_count(),
        publisher: state.publisher.stats(),
    })
}
