//! Durable room model.
//!
//! These records live in the persistence gateway. The coordinator reads them
//! on join and host checks, and mutates the participant list, lobby queue and
//! chat history.

use crate::connection::{now_millis, Identity, RoomId, UserId};
use huddle_protocol::ConnectionId;
use serde::{Deserialize, Serialize};

pub use huddle_protocol::{ChatMessage, MessageKind};

/// Default participant cap for new rooms.
pub const DEFAULT_MAX_PARTICIPANTS: usize = 50;

/// Sender value used for system notices.
pub const SYSTEM_SENDER: &str = "system";

/// Display name used for system notices.
pub const SYSTEM_SENDER_NAME: &str = "System";

/// Per-room settings chosen by the host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoomSettings {
    /// Non-host joiners wait for host approval.
    pub lobby_enabled: bool,
    pub recording_enabled: bool,
    pub max_participants: usize,
}

impl Default for RoomSettings {
    fn default() -> Self {
        Self {
            lobby_enabled: false,
            recording_enabled: false,
            max_participants: DEFAULT_MAX_PARTICIPANTS,
        }
    }
}

/// A participant record in a room's durable history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Participant {
    pub identity: Identity,
    /// Connection the participant first joined from.
    pub connection_id: ConnectionId,
    pub joined_at: u64,
}

impl Participant {
    #[must_use]
    pub fn new(identity: Identity, connection_id: ConnectionId) -> Self {
        Self {
            identity,
            connection_id,
            joined_at: now_millis(),
        }
    }
}

/// A pending admission request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LobbyEntry {
    pub identity: Identity,
    pub connection_id: ConnectionId,
    pub requested_at: u64,
}

impl LobbyEntry {
    #[must_use]
    pub fn new(identity: Identity, connection_id: ConnectionId) -> Self {
        Self {
            identity,
            connection_id,
            requested_at: now_millis(),
        }
    }
}

/// Whether a record held by `(identity, connection_id)` belongs to the same
/// member as `(other_identity, other_connection)`.
///
/// Authenticated users are matched by identity, so one user has one record
/// regardless of how many tabs they join from. Guests share a single identity
/// and are told apart by connection.
#[must_use]
pub fn same_member(
    identity: &Identity,
    connection_id: &ConnectionId,
    other_identity: &Identity,
    other_connection: &ConnectionId,
) -> bool {
    match (identity, other_identity) {
        (Identity::User(a), Identity::User(b)) => a == b,
        (Identity::Guest, Identity::Guest) => connection_id == other_connection,
        _ => false,
    }
}

/// A meeting room.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Room {
    pub id: RoomId,
    pub name: String,
    pub host: UserId,
    pub is_active: bool,
    pub settings: RoomSettings,
    pub participants: Vec<Participant>,
    pub lobby_queue: Vec<LobbyEntry>,
    pub created_at: u64,
}

impl Room {
    /// Create an active room with default settings.
    #[must_use]
    pub fn new(id: impl Into<RoomId>, name: impl Into<String>, host: impl Into<UserId>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            host: host.into(),
            is_active: true,
            settings: RoomSettings::default(),
            participants: Vec::new(),
            lobby_queue: Vec::new(),
            created_at: now_millis(),
        }
    }

    /// Set the room settings.
    #[must_use]
    pub fn with_settings(mut self, settings: RoomSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Enable or disable the lobby.
    #[must_use]
    pub fn with_lobby(mut self, enabled: bool) -> Self {
        self.settings.lobby_enabled = enabled;
        self
    }

    /// Whether `identity` is this room's host.
    #[must_use]
    pub fn is_host(&self, identity: &Identity) -> bool {
        identity.is_user(&self.host)
    }

    /// Whether a lobby entry exists for this member.
    #[must_use]
    pub fn has_lobby_entry(&self, identity: &Identity, connection_id: &ConnectionId) -> bool {
        self.lobby_queue
            .iter()
            .any(|e| same_member(&e.identity, &e.connection_id, identity, connection_id))
    }
}

/// A chat message not yet assigned an ID by the store.
#[derive(Debug, Clone, PartialEq)]
pub struct NewMessage {
    pub room_id: RoomId,
    pub sender: String,
    pub sender_name: String,
    pub message: String,
    pub kind: MessageKind,
}

impl NewMessage {
    /// A message written by a participant.
    #[must_use]
    pub fn text(
        room_id: impl Into<RoomId>,
        sender: &Identity,
        sender_name: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            room_id: room_id.into(),
            sender: sender.to_string(),
            sender_name: sender_name.into(),
            message: message.into(),
            kind: MessageKind::Text,
        }
    }

    /// A notice generated by the coordinator.
    #[must_use]
    pub fn system(room_id: impl Into<RoomId>, message: impl Into<String>) -> Self {
        Self {
            room_id: room_id.into(),
            sender: SYSTEM_SENDER.to_string(),
            sender_name: SYSTEM_SENDER_NAME.to_string(),
            message: message.into(),
            kind: MessageKind::System,
        }
    }

    /// Turn into a stored message.
    #[must_use]
    pub fn into_message(self, id: u64) -> ChatMessage {
        ChatMessage {
            id,
            room_id: self.room_id,
            sender: self.sender,
            sender_name: self.sender_name,
            message: self.message,
            kind: self.kind,
            created_at: now_millis(),
        }
    }
}
