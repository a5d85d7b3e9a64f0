use std::sync::Arc;

use axum::{
    extract::{
        ws::{Message, WebSocket},
        Query, State, WebSocketUpgrade,
    },
    http::HeaderMap,
    response::Response,
};
use futures::stream::SplitStream;
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;

use crate::auth::{
    extract_token, policy_close_frame, Claims, JwtValidator, WsQuery, REASON_AUTH_FAILED,
    REASON_AUTH_REQUIRED,
};
use crate::connection::{ConnectionHandle, OutboundFrame, User};
use crate::metrics::{ConnectionMetrics, RouterMetrics};
use crate::room::ChatMessage;
use crate::server::AppState;

use super::message::{ClientMessage, CodeChange, ServerMessage};

const CHANNEL_BUFFER_SIZE: usize = 32;
const SERVICE: &str = "collab";

/// WebSocket upgrade handler for the collaboration service
#[tracing::instrument(
    name = "collab.upgrade",
    skip(ws, state, query, headers),
    fields(has_query_token = query.token.is_some())
)]
pub async fn collab_ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    Query(query): Query<WsQuery>,
    headers: HeaderMap,
) -> Response {
    // A credential may also arrive in the first join_room frame, so a missing
    // token does not reject the upgrade here; an invalid one does.
    let claims = match extract_token(&query, &headers) {
        Some(token) => match state.jwt_validator.validate(&token) {
            Ok(claims) => Some(claims),
            Err(e) => {
                tracing::warn!(error = %e, "JWT validation failed");
                ConnectionMetrics::record_auth_rejected(SERVICE);
                return ws.on_upgrade(|mut socket| async move {
                    let _ = socket.send(policy_close_frame(REASON_AUTH_FAILED)).await;
                });
            }
        },
        None => None,
    };

    ws.on_upgrade(move |socket| handle_socket(socket, state, claims))
}

/// Handle an established collaboration WebSocket connection
#[tracing::instrument(name = "collab.connection", skip(socket, state, claims))]
async fn handle_socket(socket: WebSocket, state: AppState, claims: Option<Claims>) {
    let (mut ws_sender, mut ws_receiver) = socket.split();

    // Gatekeeper: nothing is routed before a verified identity is attached
    let (user, deferred_join) = match claims {
        Some(claims) => (User::from_claims(&claims), None),
        None => match first_frame_auth(&mut ws_receiver, &state).await {
            Ok((user, join)) => (user, Some(join)),
            Err(reason) => {
                ConnectionMetrics::record_auth_rejected(SERVICE);
                let _ = ws_sender.send(policy_close_frame(reason)).await;
                return;
            }
        },
    };

    let (tx, mut rx) = mpsc::channel::<OutboundFrame>(CHANNEL_BUFFER_SIZE);
    let handle = state.collab_connections.register(user.clone(), tx);
    let connection_id = handle.id;

    ConnectionMetrics::record_opened(SERVICE);
    tracing::info!(
        connection_id = %connection_id,
        user_id = %user.id,
        "Collaboration connection established"
    );

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

    // A join_room that carried the credential is routed before anything else,
    // preserving frame-arrival order on this connection
    if let Some(join) = deferred_join {
        handle_client_message(join, &state, &handle).await;
    }

    // Task for receiving frames from the WebSocket
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

    leave_all_rooms(&state, &handle).await;
    state.collab_connections.unregister(connection_id);

    ConnectionMetrics::record_closed(SERVICE);
    tracing::info!(
        connection_id = %connection_id,
        user_id = %user.id,
        "Collaboration connection closed"
    );
}

/// Wait for the first frame on a connection that presented no credential at
/// upgrade. Only a join_room frame carrying a valid token opens the gate.
async fn first_frame_auth(
    receiver: &mut SplitStream<WebSocket>,
    state: &AppState,
) -> Result<(User, ClientMessage), &'static str> {
    while let Some(result) = receiver.next().await {
        let msg = match result {
            Ok(msg) => msg,
            Err(_) => return Err(REASON_AUTH_REQUIRED),
        };

        match msg {
            Message::Text(text) => {
                return authenticate_first_frame(&text, &state.jwt_validator);
            }
            Message::Ping(_) | Message::Pong(_) => continue,
            _ => return Err(REASON_AUTH_REQUIRED),
        }
    }

    Err(REASON_AUTH_REQUIRED)
}

/// Decide whether a first text frame opens the gate. Only a join_room frame
/// carrying a valid token does; the token is stripped before routing.
fn authenticate_first_frame(
    text: &str,
    validator: &JwtValidator,
) -> Result<(User, ClientMessage), &'static str> {
    match serde_json::from_str::<ClientMessage>(text) {
        Ok(ClientMessage::JoinRoom {
            room_id,
            token: Some(token),
        }) => match validator.validate(&token) {
            Ok(claims) => Ok((
                User::from_claims(&claims),
                ClientMessage::JoinRoom {
                    room_id,
                    token: None,
                },
            )),
            Err(e) => {
                tracing::warn!(error = %e, "JWT validation failed");
                Err(REASON_AUTH_FAILED)
            }
        },
        _ => Err(REASON_AUTH_REQUIRED),
    }
}

/// Process a received WebSocket message
/// Returns false if the connection should be closed
async fn process_frame(msg: Message, state: &AppState, handle: &Arc<ConnectionHandle>) -> bool {
    match msg {
        Message::Text(text) => {
            handle.update_activity();

            // Malformed and unrecognized frames are answered with an error
            // frame to the sender only; the connection stays open
            let client_msg: ClientMessage = match serde_json::from_str(&text) {
                Ok(msg) => msg,
                Err(e) => {
                    tracing::warn!(error = %e, "Failed to parse client message");
                    send_error(handle, format!("Invalid message: {}", e)).await;
                    return true;
                }
            };

            handle_client_message(client_msg, state, handle).await;
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

/// Handle a parsed client message
#[tracing::instrument(
    name = "collab.message",
    skip(msg, state, handle),
    fields(connection_id = %handle.id, user_id = %handle.user.id)
)]
async fn handle_client_message(msg: ClientMessage, state: &AppState, handle: &Arc<ConnectionHandle>) {
    match msg {
        ClientMessage::JoinRoom { room_id, token: _ } => {
            RouterMetrics::record("join_room");
            handle_join_room(room_id, state, handle).await;
        }
        ClientMessage::ChatMessage { room_id, content } => {
            RouterMetrics::record("chat_message");
            handle_chat_message(room_id, content, state, handle).await;
        }
        ClientMessage::CodeChange { room_id, change } => {
            RouterMetrics::record("code_change");
            handle_code_change(room_id, change, state, handle).await;
        }
    }
}

async fn handle_join_room(room_id: String, state: &AppState, handle: &Arc<ConnectionHandle>) {
    let snapshot = state.rooms.join(&room_id, handle.user.clone());
    handle.memberships.write().await.insert(room_id.clone());

    // Initial room state is unicast to the joiner, not broadcast
    if let Ok(frame) = OutboundFrame::encode(&ServerMessage::RoomJoined {
        room_id: room_id.clone(),
        users: snapshot.users,
        chat_messages: snapshot.chat_history,
    }) {
        let _ = handle.send(frame).await;
    }

    broadcast_to_room(
        state,
        &room_id,
        Some(&handle.user.id),
        &ServerMessage::UserJoined {
            user: handle.user.clone(),
        },
    );

    tracing::info!(room_id = %room_id, user_id = %handle.user.id, "User joined room");
}

async fn handle_chat_message(
    room_id: String,
    content: String,
    state: &AppState,
    handle: &Arc<ConnectionHandle>,
) {
    let message = ChatMessage::new(&handle.user, content);

    // Chat to a room that does not exist is a no-op
    if !state.rooms.append_chat(&room_id, message.clone()) {
        return;
    }

    // Sender included: clients expect the echo as delivery confirmation
    broadcast_to_room(state, &room_id, None, &ServerMessage::ChatMessage { message });
}

async fn handle_code_change(
    room_id: String,
    change: CodeChange,
    state: &AppState,
    handle: &Arc<ConnectionHandle>,
) {
    if !state.rooms.contains(&room_id) {
        return;
    }

    // Sender excluded: relaying the edit back would cause rebound edits
    broadcast_to_room(
        state,
        &room_id,
        Some(&handle.user.id),
        &ServerMessage::CodeChange {
            user_id: handle.user.id.clone(),
            change,
        },
    );
}

/// Serialize once, then fan out to the room's current members.
fn broadcast_to_room(
    state: &AppState,
    room_id: &str,
    exclude_user_id: Option<&str>,
    message: &ServerMessage,
) {
    let frame = match OutboundFrame::encode(message) {
        Ok(frame) => frame,
        Err(e) => {
            tracing::error!(error = %e, "Failed to serialize frame");
            return;
        }
    };

    let members = state.rooms.member_ids(room_id);
    state.broadcaster.to_users(&members, exclude_user_id, &frame);
}

/// Close-time cleanup: leave every joined room and notify remaining members.
/// Room membership is user-keyed, so the user stays a member as long as any
/// other of their connections is still joined to the room.
async fn leave_all_rooms(state: &AppState, handle: &Arc<ConnectionHandle>) {
    let joined: Vec<String> = handle.memberships.read().await.iter().cloned().collect();

    for room_id in joined {
        if user_still_in_room(state, handle, &room_id).await {
            continue;
        }
        if state.rooms.leave(&room_id, &handle.user.id) {
            broadcast_to_room(
                state,
                &room_id,
                None,
                &ServerMessage::UserLeft {
                    user_id: handle.user.id.clone(),
                },
            );
        }
    }
}

/// True if another live connection of the same user is joined to the room.
/// The closing connection is still registered at this point, so it is
/// filtered out by id.
async fn user_still_in_room(
    state: &AppState,
    closing: &Arc<ConnectionHandle>,
    room_id: &str,
) -> bool {
    for other in state.collab_connections.user_connections(&closing.user.id) {
        if other.id != closing.id && other.memberships.read().await.contains(room_id) {
            return true;
        }
    }
    false
}

async fn send_error(handle: &Arc<ConnectionHandle>, message: impl Into<String>) {
    if let Ok(frame) = OutboundFrame::encode(&ServerMessage::error(message)) {
        let _ = handle.send(frame).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ApiConfig, JwtConfig, ServerConfig, Settings, WebSocketConfig};
    use jsonwebtoken::{encode, EncodingKey, Header};

    const SECRET: &str = "test-secret-key-for-testing";

    fn test_state() -> AppState {
        AppState::new(Settings {
            server: ServerConfig::default(),
            jwt: JwtConfig {
                secret: SECRET.to_string(),
                issuer: None,
                audience: None,
            },
            api: ApiConfig::default(),
            websocket: WebSocketConfig::default(),
        })
    }

    fn test_token(sub: &str, secret: &str) -> String {
        let claims = Claims {
            sub: sub.to_string(),
            username: "alice".to_string(),
            exp: chrono::Utc::now().timestamp() + 3600,
            iat: chrono::Utc::now().timestamp(),
            extra: Default::default(),
        };
        encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(secret.as_bytes()),
        )
        .unwrap()
    }

    #[test]
    fn test_first_frame_join_with_valid_token_opens_gate() {
        let state = test_state();
        let frame = format!(
            r#"{{"type":"join_room","roomId":"r1","token":"{}"}}"#,
            test_token("u1", SECRET)
        );

        let (user, join) = authenticate_first_frame(&frame, &state.jwt_validator).unwrap();
        assert_eq!(user.id, "u1");
        // The credential is stripped before the frame is routed
        assert!(matches!(
            join,
            ClientMessage::JoinRoom { ref room_id, token: None } if room_id == "r1"
        ));
    }

    #[test]
    fn test_first_frame_with_invalid_token_is_rejected() {
        let state = test_state();
        let frame = format!(
            r#"{{"type":"join_room","roomId":"r1","token":"{}"}}"#,
            test_token("u1", "some-other-secret")
        );

        let result = authenticate_first_frame(&frame, &state.jwt_validator);
        assert_eq!(result.err(), Some(REASON_AUTH_FAILED));
    }

    #[test]
    fn test_first_frame_without_credential_is_rejected() {
        let state = test_state();

        // join_room without a token
        let result = authenticate_first_frame(
            r#"{"type":"join_room","roomId":"r1"}"#,
            &state.jwt_validator,
        );
        assert_eq!(result.err(), Some(REASON_AUTH_REQUIRED));

        // Any other message type before authentication
        let result = authenticate_first_frame(
            r#"{"type":"chat_message","roomId":"r1","content":"hi"}"#,
            &state.jwt_validator,
        );
        assert_eq!(result.err(), Some(REASON_AUTH_REQUIRED));

        // Unparseable frame
        let result = authenticate_first_frame("not json", &state.jwt_validator);
        assert_eq!(result.err(), Some(REASON_AUTH_REQUIRED));
    }

    #[test]
    fn test_rejected_token_never_reaches_membership() {
        let state = test_state();
        let frame = format!(
            r#"{{"type":"join_room","roomId":"r1","token":"{}"}}"#,
            test_token("u1", "some-other-secret")
        );

        assert!(authenticate_first_frame(&frame, &state.jwt_validator).is_err());
        assert!(!state.rooms.contains("r1"));
        assert_eq!(state.collab_connections.stats().total_connections, 0);
    }

    #[tokio::test]
    async fn test_close_keeps_user_in_room_while_other_connection_remains() {
        let state = test_state();
        let user = User::new("u1", "alice");

        let (tx1, _rx1) = mpsc::channel(8);
        let (tx2, _rx2) = mpsc::channel(8);
        let first = state.collab_connections.register(user.clone(), tx1);
        let second = state.collab_connections.register(user.clone(), tx2);

        state.rooms.join("r1", user.clone());
        first.memberships.write().await.insert("r1".to_string());
        second.memberships.write().await.insert("r1".to_string());

        // First connection closes; the user's other connection keeps the seat
        leave_all_rooms(&state, &first).await;
        state.collab_connections.unregister(first.id);
        assert!(state.rooms.contains("r1"));
        assert_eq!(state.rooms.member_count("r1"), 1);

        // Last connection closes; now the user leaves and the room dies
        leave_all_rooms(&state, &second).await;
        state.collab_connections.unregister(second.id);
        assert!(!state.rooms.contains("r1"));
    }
}
