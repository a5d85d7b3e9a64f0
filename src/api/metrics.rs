use axum::{
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
};

use crate::metrics::{
    encode_metrics, CHANNELS_ACTIVE, CONNECTIONS_TOTAL, ROOMS_ACTIVE, USERS_CONNECTED,
};
use crate::server::AppState;

/// Prometheus metrics endpoint. Gauges are refreshed from live registry
/// state on every scrape; counters are maintained at their call sites.
pub async fn prometheus_metrics(State(state): State<AppState>) -> Response {
    let collab = state.collab_connections.stats();
    let notify = state.notify_connections.stats();

    CONNECTIONS_TOTAL
        .with_label_values(&["collab"])
        .set(collab.total_connections as i64);
    CONNECTIONS_TOTAL
        .with_label_values(&["notify"])
        .set(notify.total_connections as i64);
    USERS_CONNECTED
        .with_label_values(&["collab"])
        .set(collab.unique_users as i64);
    USERS_CONNECTED
        .with_label_values(&["notify"])
        .set(notify.unique_users as i64);
    ROOMS_ACTIVE.set(state.rooms.room_count() as i64);
    CHANNELS_ACTIVE.set(notify.channels.len() as i64);

    match encode_metrics() {
        Ok(body) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            body,
        )
            .into_response(),
        Err(e) => {
            tracing::error!(error = %e, "Failed to encode metrics");
            (StatusCode::INTERNAL_SERVER_ERROR, "encoding error").into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ApiConfig, JwtConfig, ServerConfig, Settings, WebSocketConfig};
    use crate::connection::User;
    use tokio::sync::mpsc;

    fn test_state() -> AppState {
        AppState::new(Settings {
            server: ServerConfig::default(),
            jwt: JwtConfig {
                secret: "test-secret-key-for-testing".to_string(),
                issuer: None,
                audience: None,
            },
            api: ApiConfig::default(),
            websocket: WebSocketConfig::default(),
        })
    }

    #[tokio::test]
    async fn test_scrape_refreshes_gauges_from_live_state() {
        let state = test_state();
        let (tx, _rx) = mpsc::channel(8);
        let handle = state
            .notify_connections
            .register(User::new("u1", "alice"), tx);
        state
            .notify_connections
            .join_channel(handle.id, "contest-42")
            .await;
        state
            .notify_connections
            .join_channel(handle.id, "announcements")
            .await;

        let response = prometheus_metrics(State(state)).await;
        assert_eq!(response.status(), StatusCode::OK);

        // The channel gauge counts distinct channels, not subscriber entries
        assert_eq!(CHANNELS_ACTIVE.get(), 2);
        assert_eq!(CONNECTIONS_TOTAL.with_label_values(&["notify"]).get(), 1);
        assert_eq!(USERS_CONNECTED.with_label_values(&["notify"]).get(), 1);
    }
}
