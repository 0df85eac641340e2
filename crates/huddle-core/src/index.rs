//! Room index.
//!
//! Maps each room to the set of connections currently admitted to it.
//! Rooms with no members are dropped from the index.

use crate::connection::RoomId;
use dashmap::DashMap;
use huddle_protocol::ConnectionId;
use std::collections::HashSet;
use tracing::debug;

/// Room membership index.
#[derive(Debug, Default)]
pub struct RoomIndex {
    rooms: DashMap<RoomId, HashSet<ConnectionId>>,
}

impl RoomIndex {
    /// Create an empty index.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a connection to a room.
    ///
    /// Returns `true` if the connection was not already a member.
    pub fn insert(&self, room_id: &str, connection_id: ConnectionId) -> bool {
        let mut members = self.rooms.entry(room_id.to_string()).or_insert_with(|| {
            debug!(room = %room_id, "Room became active");
            HashSet::new()
        });
        members.insert(connection_id)
    }

    /// Remove a connection from a room.
    ///
    /// Returns `true` if the connection was a member.
    pub fn remove(&self, room_id: &str, connection_id: &ConnectionId) -> bool {
        let removed = match self.rooms.get_mut(room_id) {
            Some(mut members) => members.remove(connection_id),
            None => return false,
        };

        // Drop empty rooms. `remove_if` re-checks under the shard lock so a
        // concurrent insert keeps the room alive.
        if self
            .rooms
            .remove_if(room_id, |_, members| members.is_empty())
            .is_some()
        {
            debug!(room = %room_id, "Room became empty");
        }

        removed
    }

    /// Remove a room and return its former members.
    pub fn clear_room(&self, room_id: &str) -> Vec<ConnectionId> {
        self.rooms
            .remove(room_id)
            .map(|(_, members)| members.into_iter().collect())
            .unwrap_or_default()
    }

    /// Snapshot of a room's members.
    #[must_use]
    pub fn members_of(&self, room_id: &str) -> Vec<ConnectionId> {
        self.rooms
            .get(room_id)
            .map(|members| members.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Whether a connection is a member of a room.
    #[must_use]
    pub fn contains(&self, room_id: &str, connection_id: &ConnectionId) -> bool {
        self.rooms
            .get(room_id)
            .map(|members| members.contains(connection_id))
            .unwrap_or(false)
    }

    /// Number of members in a room.
    #[must_use]
    pub fn member_count(&self, room_id: &str) -> usize {
        self.rooms.get(room_id).map(|m| m.len()).unwrap_or(0)
    }

    /// Number of rooms with at least one member.
    #[must_use]
    pub fn room_count(&self) -> usize {
        self.rooms.len()
    }
}
