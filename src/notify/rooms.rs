//! Per-relationship broadcast rooms for live chat delivery

use crate::types::{MessageId, RelationshipId, UserId};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};
use tokio::sync::broadcast;
use tracing::debug;

/// A chat message fanned out to everyone connected to a relationship
#[derive(Debug, Clone, Serialize)]
pub struct RoomMessage {
    pub relationship_id: RelationshipId,
    pub sender_id: UserId,
    pub message_id: MessageId,
    pub text: String,
    pub sent_at: DateTime<Utc>,
}

/// Registry of live rooms, one broadcast channel per relationship.
///
/// Owned by the service and injected where needed; rooms are created on
/// first subscription.
#[derive(Debug)]
pub struct RoomRegistry {
    rooms: RwLock<HashMap<RelationshipId, broadcast::Sender<RoomMessage>>>,
    capacity: usize,
}

impl RoomRegistry {
    pub fn new(capacity: usize) -> Self {
        Self {
            rooms: RwLock::new(HashMap::new()),
            capacity: capacity.max(1),
        }
    }

    /// Join a relationship's room, creating it if needed
    pub fn subscribe(&self, relationship_id: RelationshipId) -> broadcast::Receiver<RoomMessage> {
        let mut rooms = self.rooms.write().unwrap_or_else(PoisonError::into_inner);
        rooms
            .entry(relationship_id)
            .or_insert_with(|| broadcast::channel(self.capacity).0)
            .subscribe()
    }

    /// Deliver to every current subscriber; returns how many received it
    pub fn broadcast(&self, message: RoomMessage) -> usize {
        let rooms = self.rooms.read().unwrap_or_else(PoisonError::into_inner);
        match rooms.get(&message.relationship_id) {
            Some(sender) => {
                let relationship_id = message.relationship_id;
                let delivered = sender.send(message).unwrap_or(0);
                debug!(
                    "Broadcast to {} subscribers in room {}",
                    delivered, relationship_id
                );
                delivered
            }
            None => 0,
        }
    }

    pub fn subscriber_count(&self, relationship_id: RelationshipId) -> usize {
        let rooms = self.rooms.read().unwrap_or_else(PoisonError::into_inner);
        rooms
            .get(&relationship_id)
            .map(|sender| sender.receiver_count())
            .unwrap_or(0)
    }

    pub fn room_count(&self) -> usize {
        self.rooms
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Drop a room; connected receivers see the channel close
    pub fn close(&self, relationship_id: RelationshipId) -> bool {
        self.rooms
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&relationship_id)
            .is_some()
    }

    /// Remove rooms nobody is listening to; returns how many were removed
    pub fn prune(&self) -> usize {
        let mut rooms = self.rooms.write().unwrap_or_else(PoisonError::into_inner);
        let before = rooms.len();
        rooms.retain(|_, sender| sender.receiver_count() > 0);
        before - rooms.len()
    }
}

impl Default for RoomRegistry {
    fn default() -> Self {
        Self::new(64)
    }
}
