//! Join protocol.

use super::{Coordinator, SessionError};
use crate::connection::{Connection, Identity, Membership};
use crate::room::{Participant, Room};
use huddle_protocol::{ConnectionId, ServerEvent};
use tracing::{debug, info, warn};

/// Display name used when a joiner announces none.
pub const DEFAULT_DISPLAY_NAME: &str = "Guest";

/// Parameters of a join request.
#[derive(Debug, Clone, Default)]
pub struct JoinRequest {
    /// Room to join.
    pub room_id: String,
    /// Client-side media peer ID, passed through to other members.
    pub peer_id: String,
    /// Announced name. Blank falls back to the user ID or [`DEFAULT_DISPLAY_NAME`].
    pub display_name: String,
    pub avatar: Option<String>,
}

impl JoinRequest {
    /// Create a join request.
    #[must_use]
    pub fn new(
        room_id: impl Into<String>,
        peer_id: impl Into<String>,
        display_name: impl Into<String>,
    ) -> Self {
        Self {
            room_id: room_id.into(),
            peer_id: peer_id.into(),
            display_name: display_name.into(),
            avatar: None,
        }
    }

    /// Copy the announced details onto a connection record.
    pub(super) fn apply(&self, connection: &mut Connection) {
        connection.peer_id = self.peer_id.clone();
        connection.display_name = display_name(&self.display_name, &connection.identity);
        connection.avatar = self.avatar.clone();
    }
}

fn display_name(announced: &str, identity: &Identity) -> String {
    let announced = announced.trim();
    if !announced.is_empty() {
        return announced.to_string();
    }
    identity
        .user_id()
        .unwrap_or(DEFAULT_DISPLAY_NAME)
        .to_string()
}

/// Result of a successful join request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinOutcome {
    /// The connection is now a member of the room.
    Admitted,
    /// The connection was already a member; the member list was re-sent.
    AlreadyAdmitted,
    /// The connection is waiting in the lobby for a host decision.
    Waiting,
}

impl Coordinator {
    /// Handle a join request.
    ///
    /// The host and connections holding a lobby approval for this room are
    /// admitted directly. Everyone else is admitted directly when the room
    /// has no lobby, and queued otherwise. A connection already in another
    /// room (or another room's lobby) leaves it first.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::RoomNotFound`], [`SessionError::RoomEnded`] or
    /// [`SessionError::RoomFull`] when the join is refused, and
    /// [`SessionError::JoinFailed`] when the room cannot be read or the
    /// lobby request cannot be recorded.
    pub async fn join(
        &self,
        connection_id: &ConnectionId,
        request: JoinRequest,
    ) -> Result<JoinOutcome, SessionError> {
        let connection = self
            .registry
            .lookup(connection_id)
            .ok_or(SessionError::UnknownConnection)?;

        let room = self
            .store
            .find_room(&request.room_id)
            .await
            .map_err(SessionError::JoinFailed)?
            .ok_or(SessionError::RoomNotFound)?;

        if !room.is_active {
            debug!(connection = %connection_id, room = %room.id, "Join refused, room inactive");
            return Err(SessionError::RoomEnded);
        }

        if connection.is_admitted_to(&room.id) {
            debug!(connection = %connection_id, room = %room.id, "Repeated join");
            self.send_existing_users(connection_id, &room.id);
            return Ok(JoinOutcome::AlreadyAdmitted);
        }

        let elsewhere = match &connection.membership {
            Membership::Idle => false,
            Membership::Waiting(other) => *other != room.id,
            Membership::Admitted(_) => true,
        };
        if elsewhere {
            self.leave(connection_id).await;
        }

        let is_host = room.is_host(&connection.identity);
        let gated = room.settings.lobby_enabled && !is_host;

        if gated && !self.has_approval(connection_id, &room.id) {
            return self.enter_lobby(&connection, &room, &request).await;
        }

        if !is_host && self.index.member_count(&room.id) >= room.settings.max_participants {
            debug!(
                connection = %connection_id,
                room = %room.id,
                max = room.settings.max_participants,
                "Join refused, room full"
            );
            return Err(SessionError::RoomFull);
        }

        if gated {
            self.approvals.remove(connection_id);
        }

        self.admit_connection(&connection, &room, &request).await
    }

    /// Make `connection` a member of `room` and announce it.
    async fn admit_connection(
        &self,
        connection: &Connection,
        room: &Room,
        request: &JoinRequest,
    ) -> Result<JoinOutcome, SessionError> {
        let id = &connection.id;

        let (admitted, previous) = self
            .registry
            .update(id, |c| {
                request.apply(c);
                let previous =
                    std::mem::replace(&mut c.membership, Membership::Admitted(room.id.clone()));
                (c.clone(), previous)
            })
            .ok_or(SessionError::UnknownConnection)?;

        self.index.insert(&room.id, id.clone());

        // The connection may have closed while the room lookup was in flight.
        if !self.registry.contains(id) {
            self.index.remove(&room.id, id);
            debug!(connection = %id, room = %room.id, "Connection closed during join");
            return Err(SessionError::UnknownConnection);
        }

        if previous == Membership::Waiting(room.id.clone()) {
            if let Err(e) = self.store.remove_lobby_entry(&room.id, id).await {
                warn!(connection = %id, room = %room.id, error = %e, "Failed to clear lobby entry");
            }
        }

        if let Err(e) = self
            .store
            .add_participant(&room.id, Participant::new(admitted.identity.clone(), id.clone()))
            .await
        {
            warn!(connection = %id, room = %room.id, error = %e, "Failed to record participant");
        }

        info!(
            connection = %id,
            room = %room.id,
            identity = %admitted.identity,
            "Admitted to room"
        );

        self.broadcast(&room.id, ServerEvent::UserJoined(admitted.peer_info()), Some(id));
        self.send_existing_users(id, &room.id);
        self.send_chat_history(id, &room.id).await;
        self.post_system_message(&room.id, format!("{} joined the meeting", admitted.display_name))
            .await;

        Ok(JoinOutcome::Admitted)
    }

    /// Send the current member list, minus the recipient, to `connection_id`.
    fn send_existing_users(&self, connection_id: &ConnectionId, room_id: &str) {
        let users = self
            .index
            .members_of(room_id)
            .into_iter()
            .filter(|member| member != connection_id)
            .filter_map(|member| self.registry.lookup(&member))
            .filter(|member| member.is_admitted_to(room_id))
            .map(|member| member.peer_info())
            .collect();

        self.send(connection_id, ServerEvent::ExistingUsers { users });
    }

    fn has_approval(&self, connection_id: &ConnectionId, room_id: &str) -> bool {
        self.approvals
            .get(connection_id)
            .map(|approved| approved.as_str() == room_id)
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_name_fallback() {
        assert_eq!(display_name(" Alice ", &Identity::user("u1")), "Alice");
        assert_eq!(display_name("", &Identity::user("u1")), "u1");
        assert_eq!(display_name("  ", &Identity::Guest), DEFAULT_DISPLAY_NAME);
    }
}
