//! Built-in message handlers.
//!
//! Each handler is a thin policy layer over `RoomIndex::broadcast`: it
//! validates its own required fields, shapes the outbound event, and decides
//! whether the sender is excluded from the fan-out. The handler table is
//! built once at startup and never mutated, so dispatch takes no lock.
//!
//! Validation friction is deliberately uneven: `chat` and the recording
//! controls answer missing fields with an `error` frame, while the
//! high-frequency best-effort types (`cursor`, `note_sync`) drop bad frames
//! silently.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;

use chrono::Utc;
use serde_json::{json, Value};
use uuid::Uuid;

use crate::protocol::ServerMessage;

use super::Hub;

pub type HandlerFuture<'a> = Pin<Box<dyn Future<Output = anyhow::Result<()>> + Send + 'a>>;
pub type HandlerFn = Box<dyn for<'a> Fn(&'a Hub, Uuid, Value) -> HandlerFuture<'a> + Send + Sync>;
pub type HandlerTable = HashMap<&'static str, HandlerFn>;

/// The process-wide handler table, populated before any connection is
/// accepted.
pub fn builtin_handlers() -> HandlerTable {
    let mut table = HandlerTable::new();
    table.insert("start_recording", Box::new(start_recording_handler) as HandlerFn);
    table.insert("stop_recording", Box::new(stop_recording_handler) as HandlerFn);
    table.insert("chat", Box::new(chat_handler) as HandlerFn);
    table.insert("cursor", Box::new(cursor_handler) as HandlerFn);
    table.insert("note_sync", Box::new(note_sync_handler) as HandlerFn);
    table
}

fn start_recording_handler(hub: &Hub, sender: Uuid, payload: Value) -> HandlerFuture<'_> {
    Box::pin(recording_status(hub, sender, payload, "start_recording", "recording_started"))
}

fn stop_recording_handler(hub: &Hub, sender: Uuid, payload: Value) -> HandlerFuture<'_> {
    Box::pin(recording_status(hub, sender, payload, "stop_recording", "recording_stopped"))
}

fn chat_handler(hub: &Hub, sender: Uuid, payload: Value) -> HandlerFuture<'_> {
    Box::pin(chat(hub, sender, payload))
}

fn cursor_handler(hub: &Hub, sender: Uuid, payload: Value) -> HandlerFuture<'_> {
    Box::pin(cursor(hub, sender, payload))
}

fn note_sync_handler(hub: &Hub, sender: Uuid, payload: Value) -> HandlerFuture<'_> {
    Box::pin(note_sync(hub, sender, payload))
}

fn room_of(payload: &Value) -> Option<&str> {
    payload.get("room_id").and_then(Value::as_str)
}

fn sender_user(hub: &Hub, sender: Uuid) -> Option<String> {
    hub.registry().get(sender).and_then(|h| h.user_id.clone())
}

/// Recording start/stop: announce the status change to the whole room,
/// initiator included, so every client converges on the same state.
async fn recording_status(
    hub: &Hub,
    sender: Uuid,
    payload: Value,
    tag: &str,
    event: &str,
) -> anyhow::Result<()> {
    let Some(room_id) = room_of(&payload) else {
        hub.reply(sender, ServerMessage::error(format!("{tag} requires room_id"))).await;
        return Ok(());
    };

    let message = json!({
        "type": event,
        "room_id": room_id,
        "connection_id": sender,
        "user_id": sender_user(hub, sender),
        "timestamp": Utc::now(),
    });
    hub.rooms().broadcast(room_id, &message.into(), &[]).await;
    Ok(())
}

/// Chat: room-wide broadcast with sender attribution. The sender receives
/// its own message back; clients rely on the echo as the delivery
/// confirmation.
async fn chat(hub: &Hub, sender: Uuid, payload: Value) -> anyhow::Result<()> {
    let Some(room_id) = room_of(&payload) else {
        hub.reply(sender, ServerMessage::error("chat requires room_id")).await;
        return Ok(());
    };
    let Some(text) = payload.get("message").and_then(Value::as_str) else {
        hub.reply(sender, ServerMessage::error("chat requires message")).await;
        return Ok(());
    };

    let timestamp = payload
        .get("timestamp")
        .cloned()
        .unwrap_or_else(|| json!(Utc::now()));
    let message = json!({
        "type": "chat",
        "room_id": room_id,
        "connection_id": sender,
        "user_id": sender_user(hub, sender),
        "message": text,
        "timestamp": timestamp,
    });
    hub.rooms().broadcast(room_id, &message.into(), &[]).await;
    Ok(())
}

/// Cursor presence: high-frequency and best-effort. Bad frames are dropped
/// without a reply, and the sender is excluded from the fan-out since it
/// already has its own cursor state.
async fn cursor(hub: &Hub, sender: Uuid, payload: Value) -> anyhow::Result<()> {
    let (Some(room_id), Some(position)) = (room_of(&payload), payload.get("position")) else {
        tracing::debug!(connection_id = %sender, "Dropping cursor frame with missing fields");
        return Ok(());
    };

    let message = json!({
        "type": "cursor",
        "room_id": room_id,
        "connection_id": sender,
        "user_id": sender_user(hub, sender),
        "position": position,
    });
    hub.rooms().broadcast(room_id, &message.into(), &[sender]).await;
    Ok(())
}

/// Note synchronization: create/update/delete deltas, sender excluded (the
/// sender already applied the change locally). Best-effort like cursor.
async fn note_sync(hub: &Hub, sender: Uuid, payload: Value) -> anyhow::Result<()> {
    let (Some(room_id), Some(note_data), Some(action)) = (
        room_of(&payload),
        payload.get("note_data"),
        payload.get("action").and_then(Value::as_str),
    ) else {
        tracing::debug!(connection_id = %sender, "Dropping note_sync frame with missing fields");
        return Ok(());
    };

    let message = json!({
        "type": "note_sync",
        "room_id": room_id,
        "connection_id": sender,
        "user_id": sender_user(hub, sender),
        "note_data": note_data,
        "action": action,
        "timestamp": Utc::now(),
    });
    hub.rooms().broadcast(room_id, &message.into(), &[sender]).await;
    Ok(())
}
