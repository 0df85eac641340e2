//! Connection records.
//!
//! A [`Connection`] is the ephemeral state the coordinator keeps for one
//! transport connection: who it is, and where it stands in the join protocol.

use huddle_protocol::{ConnectionId, PeerInfo};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

/// A room identifier.
pub type RoomId = String;

/// A resolved user identifier.
pub type UserId = String;

/// Wire value used for guests wherever a user ID is expected.
pub const GUEST: &str = "guest";

/// Current time in milliseconds since the Unix epoch.
#[must_use]
pub fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default()
}

/// Identity bound to a connection during the handshake.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Identity {
    /// Authenticated user.
    User(UserId),
    /// No credential was presented.
    Guest,
}

impl Identity {
    /// Create a user identity.
    #[must_use]
    pub fn user(id: impl Into<UserId>) -> Self {
        Identity::User(id.into())
    }

    /// The user ID, if authenticated.
    #[must_use]
    pub fn user_id(&self) -> Option<&str> {
        match self {
            Identity::User(id) => Some(id),
            Identity::Guest => None,
        }
    }

    /// Whether this identity is the given user. Guests never match.
    #[must_use]
    pub fn is_user(&self, user_id: &str) -> bool {
        self.user_id() == Some(user_id)
    }

    /// Whether this is a guest.
    #[must_use]
    pub fn is_guest(&self) -> bool {
        matches!(self, Identity::Guest)
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Identity::User(id) => f.write_str(id),
            Identity::Guest => f.write_str(GUEST),
        }
    }
}

/// Where a connection stands in the join protocol.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum Membership {
    /// Connected but not in any room.
    #[default]
    Idle,
    /// Waiting in a room's lobby for a host decision.
    Waiting(RoomId),
    /// Admitted to a room.
    Admitted(RoomId),
}

/// Ephemeral state of one transport connection.
#[derive(Debug, Clone, PartialEq)]
pub struct Connection {
    pub id: ConnectionId,
    pub identity: Identity,
    pub membership: Membership,
    /// Media peer ID announced at join, used by clients to route negotiation.
    pub peer_id: String,
    pub display_name: String,
    pub avatar: Option<String>,
}

impl Connection {
    /// Create an idle connection record.
    #[must_use]
    pub fn new(id: ConnectionId, identity: Identity) -> Self {
        Self {
            id,
            identity,
            membership: Membership::Idle,
            peer_id: String::new(),
            display_name: String::new(),
            avatar: None,
        }
    }

    /// The room this connection is admitted to.
    #[must_use]
    pub fn room_id(&self) -> Option<&str> {
        match &self.membership {
            Membership::Admitted(room) => Some(room),
            _ => None,
        }
    }

    /// Whether this connection is admitted to `room_id`.
    #[must_use]
    pub fn is_admitted_to(&self, room_id: &str) -> bool {
        self.room_id() == Some(room_id)
    }

    /// The room whose lobby this connection is waiting in.
    #[must_use]
    pub fn waiting_room(&self) -> Option<&str> {
        match &self.membership {
            Membership::Waiting(room) => Some(room),
            _ => None,
        }
    }

    /// Public description of this connection for other participants.
    #[must_use]
    pub fn peer_info(&self) -> PeerInfo {
        PeerInfo {
            connection_id: self.id.clone(),
            user_id: self.identity.to_string(),
            peer_id: self.peer_id.clone(),
            user_name: self.display_name.clone(),
            avatar: self.avatar.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identity_matching() {
        let alice = Identity::user("alice");

        assert!(alice.is_user("alice"));
        assert!(!alice.is_user("bob"));
        assert!(!Identity::Guest.is_user(GUEST));
        assert_eq!(Identity::Guest.to_string(), "guest");
    }

    #[test]
    fn test_membership_accessors() {
        let mut conn = Connection::new("conn-1".into(), Identity::Guest);
        assert_eq!(conn.room_id(), None);

        conn.membership = Membership::Waiting("r1".into());
        assert_eq!(conn.room_id(), None);
        assert_eq!(conn.waiting_room(), Some("r1"));

        conn.membership = Membership::Admitted("r1".into());
        assert!(conn.is_admitted_to("r1"));
        assert!(!conn.is_admitted_to("r2"));
    }

    #[test]
    fn test_peer_info() {
        let mut conn = Connection::new("conn-1".into(), Identity::user("u1"));
        conn.peer_id = "peer-1".into();
        conn.display_name = "Alice".into();

        let info = conn.peer_info();
        assert_eq!(info.user_id, "u1");
        assert_eq!(info.peer_id, "peer-1");
        assert_eq!(info.user_name, "Alice");
    }
}
