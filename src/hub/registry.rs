use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::protocol::OutboundMessage;
use crate::transport::Transport;

/// One live client session.
///
/// The transport handle is owned exclusively by the registry entry; all
/// outbound writes go through [`ConnectionRegistry::send`].
pub struct ConnectionHandle {
    pub id: Uuid,
    pub user_id: Option<String>,
    pub room_id: Option<String>,
    pub connected_at: DateTime<Utc>,
    pub last_seen: RwLock<DateTime<Utc>>,
    transport: Arc<dyn Transport>,
}

impl ConnectionHandle {
    fn new(transport: Arc<dyn Transport>, user_id: Option<String>, room_id: Option<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            user_id,
            room_id,
            connected_at: now,
            last_seen: RwLock::new(now),
            transport,
        }
    }

    pub async fn touch(&self) {
        let mut last = self.last_seen.write().await;
        *last = Utc::now();
    }
}

/// Authoritative store of connection id -> (transport, metadata).
pub struct ConnectionRegistry {
    connections: DashMap<Uuid, Arc<ConnectionHandle>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self {
            connections: DashMap::new(),
        }
    }

    /// Register a new connection and return its freshly allocated id.
    pub fn register(
        &self,
        transport: Arc<dyn Transport>,
        user_id: Option<String>,
        room_id: Option<String>,
    ) -> Uuid {
        let handle = Arc::new(ConnectionHandle::new(transport, user_id, room_id));
        let conn_id = handle.id;
        self.connections.insert(conn_id, handle.clone());

        tracing::info!(
            connection_id = %conn_id,
            user_id = ?handle.user_id,
            room_id = ?handle.room_id,
            "Connection registered"
        );

        conn_id
    }

    /// Remove a connection. Idempotent: unknown ids are a no-op so cleanup
    /// racing between disconnect and eviction stays safe.
    pub fn unregister(&self, connection_id: Uuid) {
        if let Some((_, handle)) = self.connections.remove(&connection_id) {
            tracing::info!(
                connection_id = %connection_id,
                user_id = ?handle.user_id,
                "Connection unregistered"
            );
        }
    }

    pub fn get(&self, connection_id: Uuid) -> Option<Arc<ConnectionHandle>> {
        self.connections.get(&connection_id).map(|h| h.clone())
    }

    /// Update a connection's liveness timestamp. No-op for unknown ids.
    pub async fn touch(&self, connection_id: Uuid) {
        if let Some(handle) = self.get(connection_id) {
            handle.touch().await;
        }
    }

    /// Serialize and write a message to one connection. Returns false for
    /// unknown ids or any transport failure; never unregisters on its own,
    /// cleanup policy belongs to the caller.
    pub async fn send(&self, connection_id: Uuid, message: &OutboundMessage) -> bool {
        let Some(handle) = self.get(connection_id) else {
            return false;
        };

        let text = match message.to_text() {
            Ok(t) => t,
            Err(e) => {
                tracing::error!(connection_id = %connection_id, error = %e, "Failed to serialize message");
                return false;
            }
        };

        match handle.transport.send_text(text).await {
            Ok(()) => true,
            Err(e) => {
                tracing::debug!(
                    connection_id = %connection_id,
                    error = %e,
                    "Send failed, connection may be dead"
                );
                false
            }
        }
    }

    /// Connections silent for longer than `timeout`.
    pub async fn find_stale(&self, timeout: std::time::Duration) -> Vec<Uuid> {
        let now = Utc::now();
        let timeout = Duration::from_std(timeout).unwrap_or(Duration::MAX);

        // Snapshot handles first so no map shard guard is held across awaits.
        let handles: Vec<_> = self.connections.iter().map(|e| e.value().clone()).collect();

        let mut stale = Vec::new();
        for handle in handles {
            let last_seen = *handle.last_seen.read().await;
            if now.signed_duration_since(last_seen) > timeout {
                stale.push(handle.id);
            }
        }
        stale
    }

    pub fn connection_ids(&self) -> Vec<Uuid> {
        self.connections.iter().map(|e| *e.key()).collect()
    }

    pub fn len(&self) -> usize {
        self.connections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }
}

impl Default for ConnectionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::ServerMessage;
    use crate::transport::ChannelTransport;
    use tokio::sync::mpsc;

    fn transport_pair() -> (Arc<dyn Transport>, mpsc::Receiver<String>) {
        let (tx, rx) = mpsc::channel(8);
        (Arc::new(ChannelTransport::new(tx)), rx)
    }

    #[tokio::test]
    async fn register_and_lookup() {
        let registry = ConnectionRegistry::new();
        let (transport, _rx) = transport_pair();
        let id = registry.register(transport, Some("u1".into()), Some("meeting_1".into()));

        let handle = registry.get(id).expect("registered connection");
        assert_eq!(handle.user_id.as_deref(), Some("u1"));
        assert_eq!(handle.room_id.as_deref(), Some("meeting_1"));
        assert_eq!(registry.len(), 1);
    }

    #[tokio::test]
    async fn unregister_is_idempotent() {
        let registry = ConnectionRegistry::new();
        let (transport, _rx) = transport_pair();
        let id = registry.register(transport, None, None);

        registry.unregister(id);
        assert!(registry.is_empty());

        // Second call and a never-registered id are both no-ops.
        registry.unregister(id);
        registry.unregister(Uuid::new_v4());
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn send_returns_false_for_unknown_id() {
        let registry = ConnectionRegistry::new();
        let msg = OutboundMessage::from(ServerMessage::pong());
        assert!(!registry.send(Uuid::new_v4(), &msg).await);
    }

    #[tokio::test]
    async fn send_failure_does_not_unregister() {
        let registry = ConnectionRegistry::new();
        let (transport, rx) = transport_pair();
        let id = registry.register(transport, None, None);
        drop(rx); // dead peer

        let msg = OutboundMessage::from(ServerMessage::pong());
        assert!(!registry.send(id, &msg).await);
        assert!(registry.get(id).is_some(), "registry must not evict on send failure");
    }

    #[tokio::test]
    async fn touch_refreshes_staleness() {
        let registry = ConnectionRegistry::new();
        let (transport, _rx) = transport_pair();
        let id = registry.register(transport, None, None);

        // Age the connection past the timeout, then touch it back to life.
        {
            let handle = registry.get(id).unwrap();
            let mut last = handle.last_seen.write().await;
            *last = Utc::now() - Duration::seconds(120);
        }
        let timeout = std::time::Duration::from_secs(60);
        assert_eq!(registry.find_stale(timeout).await, vec![id]);

        registry.touch(id).await;
        assert!(registry.find_stale(timeout).await.is_empty());
    }
}
