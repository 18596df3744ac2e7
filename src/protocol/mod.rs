//! Wire protocol for the collaboration hub.
//!
//! Every frame on the wire is a JSON object with a `type` tag. Control
//! frames originated by the hub itself are modeled as [`ServerMessage`];
//! feature broadcasts built by message handlers (chat, cursor, note sync,
//! recording status) travel as raw JSON values so handlers stay free to
//! shape their own payloads.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Control messages sent from the hub to a client.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    ConnectionEstablished {
        connection_id: Uuid,
    },
    Pong {
        timestamp: DateTime<Utc>,
    },
    Heartbeat {
        timestamp: DateTime<Utc>,
    },
    Error {
        message: String,
    },
    UserJoined {
        connection_id: Uuid,
        user_id: Option<String>,
        timestamp: DateTime<Utc>,
    },
    UserLeft {
        connection_id: Uuid,
        user_id: Option<String>,
        timestamp: DateTime<Utc>,
    },
}

impl ServerMessage {
    pub fn error(message: impl Into<String>) -> Self {
        Self::Error {
            message: message.into(),
        }
    }

    pub fn pong() -> Self {
        Self::Pong {
            timestamp: Utc::now(),
        }
    }

    pub fn heartbeat() -> Self {
        Self::Heartbeat {
            timestamp: Utc::now(),
        }
    }
}

/// Anything the registry can put on the wire: a hub control frame or a
/// handler-built JSON event.
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum OutboundMessage {
    Control(ServerMessage),
    Event(serde_json::Value),
}

impl OutboundMessage {
    pub fn to_text(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

impl From<ServerMessage> for OutboundMessage {
    fn from(msg: ServerMessage) -> Self {
        Self::Control(msg)
    }
}

impl From<serde_json::Value> for OutboundMessage {
    fn from(value: serde_json::Value) -> Self {
        Self::Event(value)
    }
}

/// Room key for a meeting. The hub treats room ids as opaque strings; this
/// is the one place the `meeting_<id>` convention lives.
pub fn meeting_room(meeting_id: &str) -> String {
    format!("meeting_{meeting_id}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn server_message_tags() {
        let msg = ServerMessage::error("bad frame");
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["type"], "error");
        assert_eq!(json["message"], "bad frame");

        let msg = ServerMessage::ConnectionEstablished {
            connection_id: Uuid::new_v4(),
        };
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["type"], "connection_established");
        assert!(json["connection_id"].is_string());

        let json = serde_json::to_value(ServerMessage::heartbeat()).unwrap();
        assert_eq!(json["type"], "heartbeat");
        assert!(json["timestamp"].is_string());
    }

    #[test]
    fn outbound_event_serializes_untagged() {
        let msg = OutboundMessage::Event(serde_json::json!({
            "type": "chat",
            "message": "hi",
        }));
        let text = msg.to_text().unwrap();
        let value: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(value["type"], "chat");
        assert_eq!(value["message"], "hi");
    }

    #[test]
    fn meeting_room_key() {
        assert_eq!(meeting_room("42"), "meeting_42");
    }
}
