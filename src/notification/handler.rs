use std::sync::Arc;

use axum::{
    extract::{
        ws::{Message, WebSocket},
        Query, State, WebSocketUpgrade,
    },
    http::HeaderMap,
    response::Response,
};
use futures::{SinkExt, StreamExt};
use serde_json::json;
use tokio::sync::mpsc;

use crate::auth::{
    extract_token, policy_close_frame, Claims, WsQuery, REASON_AUTH_FAILED, REASON_AUTH_REQUIRED,
};
use crate::connection::{ConnectionHandle, OutboundFrame, User};
use crate::metrics::{ConnectionMetrics, RouterMetrics};
use crate::server::AppState;

use super::message::{ClientMessage, ServerMessage};
use super::types::{EventKind, PlatformEvent};

const CHANNEL_BUFFER_SIZE: usize = 32;
const SERVICE: &str = "notify";

/// WebSocket upgrade handler for the notification channel
#[tracing::instrument(
    name = "notify.upgrade",
    skip(ws, state, query, headers),
    fields(has_query_token = query.token.is_some())
)]
pub async fn notify_ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    Query(query): Query<WsQuery>,
    headers: HeaderMap,
) -> Response {
    // The notification channel has no deferred credential path: the token
    // must be presented at upgrade or the socket closes with 1008
    let Some(token) = extract_token(&query, &headers) else {
        ConnectionMetrics::record_auth_rejected(SERVICE);
        return ws.on_upgrade(|mut socket| async move {
            let _ = socket.send(policy_close_frame(REASON_AUTH_REQUIRED)).await;
        });
    };

    let claims = match state.jwt_validator.validate(&token) {
        Ok(claims) => claims,
        Err(e) => {
            tracing::warn!(error = %e, "JWT validation failed");
            ConnectionMetrics::record_auth_rejected(SERVICE);
            return ws.on_upgrade(|mut socket| async move {
                let _ = socket.send(policy_close_frame(REASON_AUTH_FAILED)).await;
            });
        }
    };

    ws.on_upgrade(move |socket| handle_socket(socket, state, claims))
}

/// Handle an established notification WebSocket connection
#[tracing::instrument(
    name = "notify.connection",
    skip(socket, state, claims),
    fields(user_id = %claims.sub)
)]
async fn handle_socket(socket: WebSocket, state: AppState, claims: Claims) {
    let user = User::from_claims(&claims);

    let (tx, mut rx) = mpsc::channel::<OutboundFrame>(CHANNEL_BUFFER_SIZE);

    // Registration in the user index is the implicit personal room
    let handle = state.notify_connections.register(user.clone(), tx);
    let connection_id = handle.id;

    ConnectionMetrics::record_opened(SERVICE);
    tracing::info!(
        connection_id = %connection_id,
        user_id = %user.id,
        "Notification connection established"
    );

    // Welcome event confirms the subscription to the client
    let welcome = PlatformEvent::for_user(
        EventKind::Connected,
        json!({"message": "Connected to notification service"}),
        user.id.clone(),
    );
    if let Some(frame) = state.publisher.encode(&welcome) {
        let _ = handle.send(frame).await;
    }

    let (mut ws_sender, mut ws_receiver) = socket.split();

    // Task for sending frames from the channel to the WebSocket
    let send_task = tokio::spawn(async move {
        while let Some(frame) = rx.recv().await {
            if ws_sender
                .send(Message::Text(frame.as_str().to_owned().into()))
                .await
                .is_err()
            {
                break;
            }
        }
    });

    // Task for receiving control-plane frames from the WebSocket
    let state_clone = state.clone();
    let handle_clone = handle.clone();
    let recv_task = tokio::spawn(async move {
        while let Some(result) = ws_receiver.next().await {
            match result {
                Ok(msg) => {
                    if !process_frame(msg, &state_clone, &handle_clone).await {
                        break;
                    }
                }
                Err(e) => {
                    tracing::warn!(error = %e, "WebSocket receive error");
                    break;
                }
            }
        }
    });

    // Wait for either task to complete
    tokio::select! {
        _ = send_task => {
            tracing::debug!(connection_id = %connection_id, "Send task completed");
        }
        _ = recv_task => {
            tracing::debug!(connection_id = %connection_id, "Receive task completed");
        }
    }

    state.notify_connections.unregister(connection_id);

    ConnectionMetrics::record_closed(SERVICE);
    tracing::info!(
        connection_id = %connection_id,
        user_id = %user.id,
        "Notification connection closed"
    );
}

/// Process a received WebSocket message
/// Returns false if the connection should be closed
async fn process_frame(msg: Message, state: &AppState, handle: &Arc<ConnectionHandle>) -> bool {
    match msg {
        Message::Text(text) => {
            handle.update_activity();

            // Non-JSON gets an error frame back; valid JSON that is not a
            // known control message is dropped without ceremony
            let value: serde_json::Value = match serde_json::from_str(&text) {
                Ok(value) => value,
                Err(e) => {
                    tracing::warn!(error = %e, "Failed to parse frame");
                    send_error(handle, format!("Invalid message: {}", e)).await;
                    return true;
                }
            };

            match serde_json::from_value::<ClientMessage>(value) {
                Ok(msg) => handle_client_message(msg, state, handle).await,
                Err(_) => {
                    tracing::debug!(connection_id = %handle.id, "Ignoring unknown message type");
                }
            }
            true
        }
        Message::Binary(_) => {
            send_error(handle, "Binary messages are not supported").await;
            true
        }
        Message::Ping(_) | Message::Pong(_) => {
            handle.update_activity();
            true
        }
        Message::Close(_) => {
            tracing::debug!(connection_id = %handle.id, "Received close frame");
            false
        }
    }
}

/// Handle a parsed control-plane message
#[tracing::instrument(
    name = "notify.message",
    skip(msg, state, handle),
    fields(connection_id = %handle.id, user_id = %handle.user.id)
)]
async fn handle_client_message(msg: ClientMessage, state: &AppState, handle: &Arc<ConnectionHandle>) {
    match msg {
        ClientMessage::JoinRoom { room } => {
            RouterMetrics::record("notify_join_room");
            if !is_valid_channel_name(&room) {
                tracing::warn!(connection_id = %handle.id, room = %room, "Invalid room name");
                send_error(handle, format!("Invalid room name: {}", room)).await;
                return;
            }
            state.notify_connections.join_channel(handle.id, &room).await;
        }
        ClientMessage::LeaveRoom { room } => {
            RouterMetrics::record("notify_leave_room");
            state.notify_connections.leave_channel(handle.id, &room).await;
        }
    }
}

async fn send_error(handle: &Arc<ConnectionHandle>, message: impl Into<String>) {
    if let Ok(frame) = OutboundFrame::encode(&ServerMessage::error(message)) {
        let _ = handle.send(frame).await;
    }
}

/// Validate an ad hoc room name
fn is_valid_channel_name(name: &str) -> bool {
    if name.is_empty() || name.len() > 64 {
        return false;
    }

    // Only allow alphanumeric, dash, underscore, and dot
    name.chars()
        .all(|c| c.is_alphanumeric() || c == '-' || c == '_' || c == '.')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_channel_names() {
        assert!(is_valid_channel_name("contest-42"));
        assert!(is_valid_channel_name("rank_updates"));
        assert!(is_valid_channel_name("v1.announcements"));
        assert!(is_valid_channel_name("Topic123"));
    }

    #[test]
    fn test_invalid_channel_names() {
        assert!(!is_valid_channel_name(""));
        assert!(!is_valid_channel_name("room with spaces"));
        assert!(!is_valid_channel_name("room/path"));
        assert!(!is_valid_channel_name("room@special"));
        // Too long
        assert!(!is_valid_channel_name(&"a".repeat(65)));
    }
}
