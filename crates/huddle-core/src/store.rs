//! Persistence gateway.
//!
//! The coordinator never talks to a database directly. It goes through
//! [`RoomStore`], whose operations are small atomic updates on a single room
//! so that concurrent joins and leaves in the same room do not overwrite each
//! other's changes.

use crate::connection::{Identity, RoomId};
use crate::room::{same_member, ChatMessage, LobbyEntry, NewMessage, Participant, Room};
use async_trait::async_trait;
use dashmap::DashMap;
use huddle_protocol::ConnectionId;
use std::sync::atomic::{AtomicU64, Ordering};
use thiserror::Error;
use tracing::debug;

/// Persistence errors.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The room does not exist.
    #[error("Room not found: {0}")]
    RoomNotFound(String),

    /// A room with this ID already exists.
    #[error("Room already exists: {0}")]
    RoomExists(String),

    /// The backing store failed.
    #[error("Storage backend error: {0}")]
    Backend(String),
}

/// Durable storage for rooms, participants, lobby queues and chat history.
#[async_trait]
pub trait RoomStore: Send + Sync {
    /// Look up a room.
    async fn find_room(&self, room_id: &str) -> Result<Option<Room>, StoreError>;

    /// Insert a new room.
    async fn create_room(&self, room: Room) -> Result<(), StoreError>;

    /// Flip a room's active flag.
    async fn set_active(&self, room_id: &str, active: bool) -> Result<(), StoreError>;

    /// Record a participant unless the same member is already recorded.
    ///
    /// An existing record keeps the connection it was first joined from.
    /// Returns `true` if a new record was appended.
    async fn add_participant(
        &self,
        room_id: &str,
        participant: Participant,
    ) -> Result<bool, StoreError>;

    /// Remove the participant record of the member identified by
    /// `identity` and `connection_id`.
    async fn remove_participant(
        &self,
        room_id: &str,
        identity: &Identity,
        connection_id: &ConnectionId,
    ) -> Result<bool, StoreError>;

    /// Queue an admission request unless the same member is already queued.
    ///
    /// Returns `true` if a new entry was queued.
    async fn enqueue_lobby(&self, room_id: &str, entry: LobbyEntry) -> Result<bool, StoreError>;

    /// Remove the lobby entry queued from `connection_id`.
    async fn remove_lobby_entry(
        &self,
        room_id: &str,
        connection_id: &ConnectionId,
    ) -> Result<Option<LobbyEntry>, StoreError>;

    /// Append a chat message, returning the stored record.
    async fn append_message(&self, message: NewMessage) -> Result<ChatMessage, StoreError>;

    /// The latest `limit` messages of a room, oldest first.
    async fn recent_messages(
        &self,
        room_id: &str,
        limit: usize,
    ) -> Result<Vec<ChatMessage>, StoreError>;
}

/// In-memory [`RoomStore`].
#[derive(Debug, Default)]
pub struct MemoryStore {
    rooms: DashMap<RoomId, Room>,
    messages: DashMap<RoomId, Vec<ChatMessage>>,
    next_message_id: AtomicU64,
}

impl MemoryStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store holding the given rooms.
    #[must_use]
    pub fn with_rooms(rooms: impl IntoIterator<Item = Room>) -> Self {
        let store = Self::new();
        for room in rooms {
            store.rooms.insert(room.id.clone(), room);
        }
        store
    }

    /// Number of stored rooms.
    #[must_use]
    pub fn room_count(&self) -> usize {
        self.rooms.len()
    }

    fn with_room<R>(&self, room_id: &str, f: impl FnOnce(&mut Room) -> R) -> Result<R, StoreError> {
        self.rooms
            .get_mut(room_id)
            .map(|mut room| f(room.value_mut()))
            .ok_or_else(|| StoreError::RoomNotFound(room_id.to_string()))
    }
}

#[async_trait]
impl RoomStore for MemoryStore {
    async fn find_room(&self, room_id: &str) -> Result<Option<Room>, StoreError> {
        Ok(self.rooms.get(room_id).map(|room| room.value().clone()))
    }

    async fn create_room(&self, room: Room) -> Result<(), StoreError> {
        match self.rooms.entry(room.id.clone()) {
            dashmap::mapref::entry::Entry::Occupied(_) => Err(StoreError::RoomExists(room.id)),
            dashmap::mapref::entry::Entry::Vacant(slot) => {
                debug!(room = %room.id, host = %room.host, "Created room");
                slot.insert(room);
                Ok(())
            }
        }
    }

    async fn set_active(&self, room_id: &str, active: bool) -> Result<(), StoreError> {
        self.with_room(room_id, |room| room.is_active = active)
    }

    async fn add_participant(
        &self,
        room_id: &str,
        participant: Participant,
    ) -> Result<bool, StoreError> {
        self.with_room(room_id, |room| {
            let recorded = room.participants.iter().any(|p| {
                same_member(
                    &p.identity,
                    &p.connection_id,
                    &participant.identity,
                    &participant.connection_id,
                )
            });
            if !recorded {
                room.participants.push(participant);
            }
            !recorded
        })
    }

    async fn remove_participant(
        &self,
        room_id: &str,
        identity: &Identity,
        connection_id: &ConnectionId,
    ) -> Result<bool, StoreError> {
        self.with_room(room_id, |room| {
            let before = room.participants.len();
            room.participants
                .retain(|p| !same_member(&p.identity, &p.connection_id, identity, connection_id));
            room.participants.len() != before
        })
    }

    async fn enqueue_lobby(&self, room_id: &str, entry: LobbyEntry) -> Result<bool, StoreError> {
        self.with_room(room_id, |room| {
            if room.has_lobby_entry(&entry.identity, &entry.connection_id) {
                // Re-point the request at the newest connection so the host's
                // decision reaches the tab that is actually waiting.
                if let Some(existing) = room
                    .lobby_queue
                    .iter_mut()
                    .find(|e| e.identity == entry.identity && !entry.identity.is_guest())
                {
                    existing.connection_id = entry.connection_id;
                }
                false
            } else {
                room.lobby_queue.push(entry);
                true
            }
        })
    }

    async fn remove_lobby_entry(
        &self,
        room_id: &str,
        connection_id: &ConnectionId,
    ) -> Result<Option<LobbyEntry>, StoreError> {
        self.with_room(room_id, |room| {
            let position = room
                .lobby_queue
                .iter()
                .position(|e| &e.connection_id == connection_id)?;
            Some(room.lobby_queue.remove(position))
        })
    }

    async fn append_message(&self, message: NewMessage) -> Result<ChatMessage, StoreError> {
        if !self.rooms.contains_key(&message.room_id) {
            return Err(StoreError::RoomNotFound(message.room_id));
        }

        let id = self.next_message_id.fetch_add(1, Ordering::Relaxed) + 1;
        let stored = message.into_message(id);
        self.messages
            .entry(stored.room_id.clone())
            .or_default()
            .push(stored.clone());
        Ok(stored)
    }

    async fn recent_messages(
        &self,
        room_id: &str,
        limit: usize,
    ) -> Result<Vec<ChatMessage>, StoreError> {
        Ok(self
            .messages
            .get(room_id)
            .map(|history| {
                let start = history.len().saturating_sub(limit);
                history[start..].to_vec()
            })
            .unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> MemoryStore {
        MemoryStore::with_rooms([Room::new("r1", "Standup", "alice")])
    }

    #[tokio::test]
    async fn test_participant_dedup_per_user() {
        let store = store();
        let alice = Identity::user("alice");

        assert!(store
            .add_participant("r1", Participant::new(alice.clone(), "conn-1".into()))
            .await
            .unwrap());
        assert!(!store
            .add_participant("r1", Participant::new(alice, "conn-2".into()))
            .await
            .unwrap());

        let room = store.find_room("r1").await.unwrap().unwrap();
        assert_eq!(room.participants.len(), 1);
        assert_eq!(room.participants[0].connection_id.as_str(), "conn-1");

        // Any of the user's connections retires the record.
        assert!(store
            .remove_participant("r1", &Identity::user("alice"), &"conn-2".into())
            .await
            .unwrap());
        let room = store.find_room("r1").await.unwrap().unwrap();
        assert!(room.participants.is_empty());
    }

    #[tokio::test]
    async fn test_guests_are_separate_participants() {
        let store = store();

        store
            .add_participant("r1", Participant::new(Identity::Guest, "conn-1".into()))
            .await
            .unwrap();
        store
            .add_participant("r1", Participant::new(Identity::Guest, "conn-2".into()))
            .await
            .unwrap();
        assert!(store
            .remove_participant("r1", &Identity::Guest, &"conn-1".into())
            .await
            .unwrap());

        let room = store.find_room("r1").await.unwrap().unwrap();
        assert_eq!(room.participants.len(), 1);
    }

    #[tokio::test]
    async fn test_lobby_queue() {
        let store = store();
        let bob = Identity::user("bob");

        assert!(store
            .enqueue_lobby("r1", LobbyEntry::new(bob.clone(), "conn-1".into()))
            .await
            .unwrap());
        assert!(!store
            .enqueue_lobby("r1", LobbyEntry::new(bob.clone(), "conn-2".into()))
            .await
            .unwrap());

        assert!(store
            .remove_lobby_entry("r1", &"conn-1".into())
            .await
            .unwrap()
            .is_none());
        let removed = store
            .remove_lobby_entry("r1", &"conn-2".into())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(removed.identity, bob);
    }

    #[tokio::test]
    async fn test_missing_room() {
        let store = store();

        assert!(store.find_room("nope").await.unwrap().is_none());
        assert!(matches!(
            store
                .add_participant("nope", Participant::new(Identity::Guest, "c".into()))
                .await,
            Err(StoreError::RoomNotFound(_))
        ));
        assert!(matches!(
            store.create_room(Room::new("r1", "Dup", "bob")).await,
            Err(StoreError::RoomExists(_))
        ));
    }

    #[tokio::test]
    async fn test_recent_messages_window() {
        let store = store();
        for i in 0..5 {
            store
                .append_message(NewMessage::system("r1", format!("notice {}", i)))
                .await
                .unwrap();
        }

        let recent = store.recent_messages("r1", 2).await.unwrap();
        let bodies: Vec<_> = recent.iter().map(|m| m.message.as_str()).collect();
        assert_eq!(bodies, vec!["notice 3", "notice 4"]);
        assert!(recent[0].id < recent[1].id);
    }
}
