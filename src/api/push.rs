//! Server-initiated push endpoints.
//!
//! Background subsystems (transcription workers, summary jobs) notify a
//! room or a single connection through these routes instead of talking to
//! sockets directly. The hub treats these pushes exactly like any other
//! fan-out: per-recipient failures are absorbed and dead connections are
//! reaped lazily.

use axum::extract::{Path, State};
use axum::Json;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use uuid::Uuid;

use crate::error::{AppError, Result};
use crate::server::AppState;

/// Request to push an event into a room.
#[derive(Debug, Deserialize)]
pub struct RoomPushRequest {
    /// Event type tag, e.g. "transcription_complete"
    pub event_type: String,
    /// Event payload
    #[serde(default)]
    pub payload: serde_json::Value,
    /// Connection ids to skip
    #[serde(default)]
    pub exclude: Vec<Uuid>,
}

/// Request to push an event to one connection.
#[derive(Debug, Deserialize)]
pub struct ConnectionPushRequest {
    pub event_type: String,
    #[serde(default)]
    pub payload: serde_json::Value,
}

#[derive(Debug, Serialize)]
pub struct RoomPushResponse {
    pub room_id: String,
    pub delivered_to: usize,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct ConnectionPushResponse {
    pub connection_id: Uuid,
    pub delivered: bool,
    pub timestamp: DateTime<Utc>,
}

fn envelope(event_type: &str, payload: serde_json::Value) -> serde_json::Value {
    json!({
        "type": event_type,
        "payload": payload,
        "timestamp": Utc::now(),
    })
}

/// Broadcast an event to every member of a room.
pub async fn push_to_room(
    State(state): State<AppState>,
    Path(room_id): Path<String>,
    Json(request): Json<RoomPushRequest>,
) -> Result<Json<RoomPushResponse>> {
    if request.event_type.is_empty() {
        return Err(AppError::Validation("event_type must not be empty".into()));
    }

    let message = envelope(&request.event_type, request.payload);
    let delivered_to = state.hub.broadcast(&room_id, message, &request.exclude).await;

    tracing::info!(
        room_id = %room_id,
        event_type = %request.event_type,
        delivered_to = delivered_to,
        "Server push to room"
    );

    Ok(Json(RoomPushResponse {
        room_id,
        delivered_to,
        timestamp: Utc::now(),
    }))
}

/// Push an event to a single connection.
pub async fn push_to_connection(
    State(state): State<AppState>,
    Path(connection_id): Path<Uuid>,
    Json(request): Json<ConnectionPushRequest>,
) -> Result<Json<ConnectionPushResponse>> {
    if request.event_type.is_empty() {
        return Err(AppError::Validation("event_type must not be empty".into()));
    }

    if !state.hub.is_connected(connection_id) {
        return Err(AppError::NotFound(format!("connection {connection_id}")));
    }

    let message = envelope(&request.event_type, request.payload);
    let delivered = state.hub.send(connection_id, message).await;

    Ok(Json(ConnectionPushResponse {
        connection_id,
        delivered,
        timestamp: Utc::now(),
    }))
}
