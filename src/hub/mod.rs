//! The real-time hub: connection registry, room index, message routing, and
//! the heartbeat monitor behind one façade.
//!
//! A single `Arc<Hub>` is shared across all connection tasks. The
//! transport-accepting layer calls [`Hub::connect`] on upgrade, feeds every
//! inbound text frame to [`Hub::handle_message`], and calls
//! [`Hub::disconnect`] when the socket goes away. Server-side subsystems
//! push into rooms through [`Hub::broadcast`] without any client frame
//! involved.

mod handlers;
mod heartbeat;
mod registry;
mod rooms;
mod router;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde::Serialize;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::config::WebSocketConfig;
use crate::events::{EventSink, HubEvent, NoopEventSink};
use crate::protocol::{OutboundMessage, ServerMessage};
use crate::transport::Transport;

pub use handlers::{builtin_handlers, HandlerFn, HandlerFuture, HandlerTable};
pub use heartbeat::{HeartbeatMonitor, MonitorHandle};
pub use registry::{ConnectionHandle, ConnectionRegistry};
pub use rooms::RoomIndex;

/// Read-only hub statistics for the status endpoints.
#[derive(Debug, Clone, Serialize)]
pub struct HubStats {
    pub connections: usize,
    pub rooms: usize,
    pub room_sizes: HashMap<String, usize>,
}

pub struct Hub {
    registry: Arc<ConnectionRegistry>,
    rooms: Arc<RoomIndex>,
    handlers: HandlerTable,
    sink: Arc<dyn EventSink>,
    heartbeat_interval: Duration,
    /// Monitor lifecycle decisions (start on first connect, stop on last
    /// disconnect) happen under this lock so they cannot race each other.
    monitor: Mutex<Option<MonitorHandle>>,
}

impl Hub {
    pub fn new(config: &WebSocketConfig, sink: Arc<dyn EventSink>) -> Self {
        let registry = Arc::new(ConnectionRegistry::new());
        let rooms = Arc::new(RoomIndex::new(registry.clone()));
        Self {
            registry,
            rooms,
            handlers: builtin_handlers(),
            sink,
            heartbeat_interval: Duration::from_secs(config.heartbeat_interval),
            monitor: Mutex::new(None),
        }
    }

    /// Register a connection, join its room if one was requested, and
    /// acknowledge with `connection_established`. The heartbeat monitor is
    /// started lazily with the first connection.
    pub async fn connect(
        &self,
        transport: Arc<dyn Transport>,
        user_id: Option<String>,
        room_id: Option<String>,
    ) -> Uuid {
        let connection_id = self.registry.register(transport, user_id.clone(), room_id.clone());

        if let Some(ref room) = room_id {
            self.rooms.join(connection_id, room).await;
        }

        {
            let mut monitor = self.monitor.lock().await;
            if monitor.is_none() {
                *monitor = Some(HeartbeatMonitor::spawn(
                    self.heartbeat_interval,
                    self.registry.clone(),
                    self.rooms.clone(),
                ));
            }
        }

        let ack = ServerMessage::ConnectionEstablished { connection_id };
        self.registry.send(connection_id, &ack.into()).await;

        self.sink.publish(HubEvent::ClientConnected {
            connection_id,
            user_id,
            room_id,
            timestamp: Utc::now(),
        });

        connection_id
    }

    /// Tear down a connection: leave its room, unregister, and stop the
    /// monitor if nobody is left. Idempotent for unknown ids.
    pub async fn disconnect(&self, connection_id: Uuid) {
        let Some(handle) = self.registry.get(connection_id) else {
            return;
        };
        let user_id = handle.user_id.clone();
        let room_id = handle.room_id.clone();

        if let Some(ref room) = room_id {
            self.rooms.leave(connection_id, room).await;
        }
        self.registry.unregister(connection_id);

        {
            let mut monitor = self.monitor.lock().await;
            if self.registry.is_empty() {
                if let Some(running) = monitor.take() {
                    running.stop();
                }
            }
        }

        self.sink.publish(HubEvent::ClientDisconnected {
            connection_id,
            user_id,
            room_id,
            timestamp: Utc::now(),
        });
    }

    /// Push one message to one connection.
    pub async fn send(&self, connection_id: Uuid, message: impl Into<OutboundMessage>) -> bool {
        self.registry.send(connection_id, &message.into()).await
    }

    /// Server-initiated room fan-out; used by background-job completion
    /// handlers to notify a room without any client having sent a frame.
    pub async fn broadcast(
        &self,
        room_id: &str,
        message: serde_json::Value,
        exclude: &[Uuid],
    ) -> usize {
        self.rooms.broadcast(room_id, &message.into(), exclude).await
    }

    /// Refresh liveness for transport-level traffic (WS ping/pong frames)
    /// that never reaches the router.
    pub async fn touch(&self, connection_id: Uuid) {
        self.registry.touch(connection_id).await;
    }

    pub fn connection_count(&self) -> usize {
        self.registry.len()
    }

    pub fn is_connected(&self, connection_id: Uuid) -> bool {
        self.registry.get(connection_id).is_some()
    }

    pub fn room_count(&self) -> usize {
        self.rooms.room_count()
    }

    pub fn member_count(&self, room_id: &str) -> usize {
        self.rooms.member_count(room_id)
    }

    pub fn stats(&self) -> HubStats {
        HubStats {
            connections: self.registry.len(),
            rooms: self.rooms.room_count(),
            room_sizes: self.rooms.room_sizes(),
        }
    }

    /// Stop background work. All hub state is in-process and ephemeral, so
    /// this only has to cancel the monitor task.
    pub async fn shutdown(&self) {
        let mut monitor = self.monitor.lock().await;
        if let Some(running) = monitor.take() {
            running.stop();
        }
    }

    pub(crate) fn registry(&self) -> &ConnectionRegistry {
        &self.registry
    }

    pub(crate) fn rooms(&self) -> &RoomIndex {
        &self.rooms
    }
}

impl Default for Hub {
    fn default() -> Self {
        Self::new(&WebSocketConfig::default(), Arc::new(NoopEventSink))
    }
}
