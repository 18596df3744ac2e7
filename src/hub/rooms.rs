use chrono::Utc;
use dashmap::DashMap;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use uuid::Uuid;

use crate::protocol::{OutboundMessage, ServerMessage};

use super::registry::ConnectionRegistry;

/// Membership tracking and room-scoped fan-out.
///
/// A room exists iff it has at least one member; the last member leaving
/// deletes the entry. Delivery goes through the registry per member, and a
/// member whose send fails during a broadcast is lazily evicted from both
/// the room and the registry.
pub struct RoomIndex {
    registry: Arc<ConnectionRegistry>,
    rooms: DashMap<String, HashSet<Uuid>>,
}

impl RoomIndex {
    pub fn new(registry: Arc<ConnectionRegistry>) -> Self {
        Self {
            registry,
            rooms: DashMap::new(),
        }
    }

    /// Add a connection to a room, creating the room if absent, then notify
    /// the other current members before returning. Unknown connection ids
    /// are a no-op.
    pub async fn join(&self, connection_id: Uuid, room_id: &str) {
        let Some(handle) = self.registry.get(connection_id) else {
            tracing::warn!(connection_id = %connection_id, room_id = %room_id, "Join for unknown connection ignored");
            return;
        };

        self.rooms
            .entry(room_id.to_string())
            .or_default()
            .insert(connection_id);

        tracing::debug!(connection_id = %connection_id, room_id = %room_id, "Joined room");

        let notice = ServerMessage::UserJoined {
            connection_id,
            user_id: handle.user_id.clone(),
            timestamp: Utc::now(),
        };
        self.broadcast(room_id, &notice.into(), &[connection_id]).await;
    }

    /// Remove a connection from a room. Deletes the room when it becomes
    /// empty (nobody left to notify); otherwise announces the departure to
    /// the remaining members.
    pub async fn leave(&self, connection_id: Uuid, room_id: &str) {
        let removed = match self.rooms.get_mut(room_id) {
            Some(mut members) => members.remove(&connection_id),
            None => false,
        };
        if !removed {
            return;
        }

        if self.rooms.remove_if(room_id, |_, members| members.is_empty()).is_some() {
            tracing::debug!(room_id = %room_id, "Room deleted, last member left");
            return;
        }

        let user_id = self.registry.get(connection_id).and_then(|h| h.user_id.clone());
        let notice = ServerMessage::UserLeft {
            connection_id,
            user_id,
            timestamp: Utc::now(),
        };
        self.broadcast(room_id, &notice.into(), &[]).await;
    }

    /// Drop a membership without any departure notification. Used when a
    /// dead connection is discovered mid-broadcast.
    fn remove_member(&self, connection_id: Uuid, room_id: &str) {
        if let Some(mut members) = self.rooms.get_mut(room_id) {
            members.remove(&connection_id);
        }
        self.rooms.remove_if(room_id, |_, members| members.is_empty());
    }

    /// Deliver a message to every member of a room not in `exclude`.
    ///
    /// Fan-out works on a snapshot of membership; per-member failures are
    /// isolated and the failing members are evicted from the room and the
    /// registry after the loop. Returns the number of successful sends.
    pub async fn broadcast(
        &self,
        room_id: &str,
        message: &OutboundMessage,
        exclude: &[Uuid],
    ) -> usize {
        let members: Vec<Uuid> = match self.rooms.get(room_id) {
            Some(members) => members.iter().copied().collect(),
            None => return 0,
        };

        let mut sent = 0;
        let mut dead = Vec::new();
        for member in members {
            if exclude.contains(&member) {
                continue;
            }
            if self.registry.send(member, message).await {
                sent += 1;
            } else {
                dead.push(member);
            }
        }

        for member in dead {
            tracing::info!(
                connection_id = %member,
                room_id = %room_id,
                "Evicting dead connection discovered during broadcast"
            );
            self.remove_member(member, room_id);
            self.registry.unregister(member);
        }

        sent
    }

    pub fn member_count(&self, room_id: &str) -> usize {
        self.rooms.get(room_id).map(|members| members.len()).unwrap_or(0)
    }

    pub fn contains(&self, room_id: &str) -> bool {
        self.rooms.contains_key(room_id)
    }

    pub fn room_count(&self) -> usize {
        self.rooms.len()
    }

    pub fn room_sizes(&self) -> HashMap<String, usize> {
        self.rooms
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().len()))
            .collect()
    }
}
