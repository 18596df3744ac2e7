//! Fire-and-forget lifecycle events.
//!
//! The hub publishes connect/disconnect events to an [`EventSink`] so an
//! out-of-process bus (or just the log) can observe session churn. Publishing
//! is never awaited for correctness; a sink that drops events cannot affect
//! hub state.

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum HubEvent {
    ClientConnected {
        connection_id: Uuid,
        user_id: Option<String>,
        room_id: Option<String>,
        timestamp: DateTime<Utc>,
    },
    ClientDisconnected {
        connection_id: Uuid,
        user_id: Option<String>,
        room_id: Option<String>,
        timestamp: DateTime<Utc>,
    },
}

pub trait EventSink: Send + Sync {
    fn publish(&self, event: HubEvent);
}

/// Sink that discards every event.
pub struct NoopEventSink;

impl EventSink for NoopEventSink {
    fn publish(&self, _event: HubEvent) {}
}

/// Sink that emits events as structured log lines.
pub struct LogEventSink;

impl EventSink for LogEventSink {
    fn publish(&self, event: HubEvent) {
        match serde_json::to_value(&event) {
            Ok(value) => tracing::info!(event = %value, "hub event"),
            Err(e) => tracing::warn!(error = %e, "failed to serialize hub event"),
        }
    }
}
