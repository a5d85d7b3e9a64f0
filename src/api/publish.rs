use axum::{extract::State, http::StatusCode, Json};
use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};
use crate::notification::EventKind;
use crate::server::AppState;

/// Request body for publishing an event to a single user.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PublishRequest {
    pub user_id: String,
    pub event_type: EventKind,
    #[serde(default)]
    pub payload: serde_json::Value,
}

/// Request body for broadcasting an event to every connection.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BroadcastRequest {
    pub event_type: EventKind,
    #[serde(default)]
    pub payload: serde_json::Value,
}

/// Request body for publishing an event to a channel.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChannelRequest {
    pub channel: String,
    pub event_type: EventKind,
    #[serde(default)]
    pub payload: serde_json::Value,
}

#[derive(Debug, Serialize)]
pub struct PublishResponse {
    pub delivered: usize,
}

/// Publish an event to one user's personal room. Succeeds with
/// `delivered: 0` when the user has no open connection.
pub async fn publish_event(
    State(state): State<AppState>,
    Json(req): Json<PublishRequest>,
) -> Result<(StatusCode, Json<PublishResponse>)> {
    if req.user_id.is_empty() {
        return Err(AppError::Validation("userId must not be empty".to_string()));
    }

    let delivered = state
        .publisher
        .publish(&req.user_id, req.event_type, req.payload);

    Ok((StatusCode::ACCEPTED, Json(PublishResponse { delivered })))
}

/// Broadcast an event to every authenticated notification connection.
pub async fn broadcast_event(
    State(state): State<AppState>,
    Json(req): Json<BroadcastRequest>,
) -> Result<(StatusCode, Json<PublishResponse>)> {
    let delivered = state.publisher.broadcast(req.event_type, req.payload);

    Ok((StatusCode::ACCEPTED, Json(PublishResponse { delivered })))
}

/// Publish an event to every subscriber of an ad hoc channel.
pub async fn channel_event(
    State(state): State<AppState>,
    Json(req): Json<ChannelRequest>,
) -> Result<(StatusCode, Json<PublishResponse>)> {
    if req.channel.is_empty() {
        return Err(AppError::Validation(
            "channel must not be empty".to_string(),
        ));
    }

    let delivered = state
        .publisher
        .publish_to_channel(&req.channel, req.event_type, req.payload);

    Ok((StatusCode::ACCEPTED, Json(PublishResponse { delivered })))
}
