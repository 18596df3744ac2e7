//! Inbound frame decode and dispatch.
//!
//! Malformed input is an expected case, not an exception: decoding returns a
//! tagged result and every failure path answers the sender with an `error`
//! frame while the connection stays open. Handler faults are caught at this
//! boundary so one bad message can never take down a connection's read loop.

use serde_json::Value;
use thiserror::Error;
use uuid::Uuid;

use crate::protocol::ServerMessage;

use super::Hub;

/// Reserved liveness tag, answered directly by the router.
const PING_TAG: &str = "ping";

#[derive(Debug, Error)]
enum DecodeError {
    #[error("frame is not valid JSON")]
    NotJson,
    #[error("frame is not a JSON object")]
    NotObject,
    #[error("frame has no string `type` tag")]
    MissingType,
}

/// Decode a raw frame into its message-type tag and payload.
fn decode_frame(raw: &str) -> Result<(String, Value), DecodeError> {
    let value: Value = serde_json::from_str(raw).map_err(|_| DecodeError::NotJson)?;
    if !value.is_object() {
        return Err(DecodeError::NotObject);
    }
    let tag = value
        .get("type")
        .and_then(Value::as_str)
        .ok_or(DecodeError::MissingType)?
        .to_string();
    Ok((tag, value))
}

impl Hub {
    /// Route one inbound frame from a connection.
    pub async fn handle_message(&self, connection_id: Uuid, raw: &str) {
        let (tag, payload) = match decode_frame(raw) {
            Ok(decoded) => decoded,
            Err(e) => {
                tracing::warn!(connection_id = %connection_id, error = %e, "Malformed inbound frame");
                self.reply(connection_id, ServerMessage::error("malformed message")).await;
                return;
            }
        };

        // Any decodable traffic counts as liveness, not just pings.
        self.registry().touch(connection_id).await;

        if tag == PING_TAG {
            self.reply(connection_id, ServerMessage::pong()).await;
            return;
        }

        let Some(handler) = self.handlers.get(tag.as_str()) else {
            tracing::debug!(connection_id = %connection_id, message_type = %tag, "Unknown message type");
            self.reply(
                connection_id,
                ServerMessage::error(format!("unknown message type: {tag}")),
            )
            .await;
            return;
        };

        if let Err(e) = handler(self, connection_id, payload).await {
            tracing::error!(
                connection_id = %connection_id,
                message_type = %tag,
                error = %e,
                "Message handler failed"
            );
            self.reply(connection_id, ServerMessage::error("internal error")).await;
        }
    }

    /// Best-effort control reply to one sender. A failed reply means the
    /// peer is already gone; the heartbeat sweep will reap it.
    pub(crate) async fn reply(&self, connection_id: Uuid, message: ServerMessage) {
        let _ = self.registry().send(connection_id, &message.into()).await;
    }
}
