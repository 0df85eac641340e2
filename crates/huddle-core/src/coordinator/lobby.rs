//! Lobby admission.
//!
//! A gated joiner is queued in the room's durable lobby and parked in
//! [`Membership::Waiting`]. The host's approval leaves a one-time token that
//! the joiner's next `join-room` for that room consumes. Rejection clears the
//! entry and never admits.

use super::{Coordinator, JoinOutcome, JoinRequest, SessionError};
use crate::connection::{Connection, Membership};
use crate::room::{LobbyEntry, Room};
use huddle_protocol::{ConnectionId, ServerEvent};
use std::sync::Arc;
use tracing::{debug, info, warn};

impl Coordinator {
    /// Queue `connection` in `room`'s lobby and notify the room's hosts.
    pub(super) async fn enter_lobby(
        &self,
        connection: &Connection,
        room: &Room,
        request: &JoinRequest,
    ) -> Result<JoinOutcome, SessionError> {
        let entry = LobbyEntry::new(connection.identity.clone(), connection.id.clone());
        let queued = self
            .store
            .enqueue_lobby(&room.id, entry)
            .await
            .map_err(SessionError::JoinFailed)?;

        let Some(waiting) = self.registry.update(&connection.id, |c| {
            request.apply(c);
            c.membership = Membership::Waiting(room.id.clone());
            c.clone()
        }) else {
            // Closed while the entry was being queued; disconnect saw Idle
            // and had nothing to withdraw.
            if let Err(e) = self.store.remove_lobby_entry(&room.id, &connection.id).await {
                warn!(connection = %connection.id, room = %room.id, error = %e, "Failed to drop orphaned lobby request");
            }
            return Err(SessionError::UnknownConnection);
        };

        self.send(
            &connection.id,
            ServerEvent::WaitingInLobby {
                room_id: room.id.clone(),
            },
        );

        let request_event = Arc::new(ServerEvent::LobbyRequest {
            user_id: waiting.identity.to_string(),
            user_name: waiting.display_name.clone(),
            avatar: waiting.avatar.clone(),
            connection_id: waiting.id.clone(),
        });
        let hosts = self
            .registry
            .find(|c| c.is_admitted_to(&room.id) && room.is_host(&c.identity));
        for host in &hosts {
            self.registry.send(&host.id, Arc::clone(&request_event));
        }

        info!(
            connection = %connection.id,
            room = %room.id,
            new_request = queued,
            hosts_notified = hosts.len(),
            "Waiting in lobby"
        );
        Ok(JoinOutcome::Waiting)
    }

    /// Approve a pending lobby request.
    ///
    /// Only the room's host may approve. The target receives `lobby-approved`
    /// and is admitted on its next join to this room.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::NotHost`] for non-host callers and
    /// [`SessionError::NotInLobby`] when no request from `target` is queued.
    pub async fn admit(
        &self,
        caller: &ConnectionId,
        room_id: &str,
        target: &ConnectionId,
    ) -> Result<(), SessionError> {
        self.authorize_host(caller, room_id, false).await?;

        self.store
            .remove_lobby_entry(room_id, target)
            .await?
            .ok_or_else(|| SessionError::NotInLobby(target.clone()))?;

        if !self.registry.contains(target) {
            debug!(connection = %target, room = %room_id, "Approved connection already gone");
            return Ok(());
        }

        self.approvals.insert(target.clone(), room_id.to_string());
        self.send(
            target,
            ServerEvent::LobbyApproved {
                room_id: room_id.to_string(),
            },
        );

        info!(host = %caller, connection = %target, room = %room_id, "Lobby request approved");
        Ok(())
    }

    /// Reject a pending lobby request.
    ///
    /// # Errors
    ///
    /// Same as [`Coordinator::admit`].
    pub async fn reject(
        &self,
        caller: &ConnectionId,
        room_id: &str,
        target: &ConnectionId,
    ) -> Result<(), SessionError> {
        self.authorize_host(caller, room_id, false).await?;

        self.store
            .remove_lobby_entry(room_id, target)
            .await?
            .ok_or_else(|| SessionError::NotInLobby(target.clone()))?;

        self.registry.update(target, |c| {
            if c.waiting_room() == Some(room_id) {
                c.membership = Membership::Idle;
            }
        });
        self.approvals
            .remove_if(target, |_, approved| approved.as_str() == room_id);

        self.send(
            target,
            ServerEvent::LobbyRejected {
                room_id: room_id.to_string(),
            },
        );

        info!(host = %caller, connection = %target, room = %room_id, "Lobby request rejected");
        Ok(())
    }

    /// Withdraw a waiting connection's lobby request.
    ///
    /// Returns `true` if the connection was waiting.
    pub(super) async fn withdraw_lobby_request(&self, connection: &Connection) -> bool {
        let Some(room_id) = connection.waiting_room() else {
            return false;
        };

        match self.store.remove_lobby_entry(room_id, &connection.id).await {
            Ok(entry) => {
                debug!(
                    connection = %connection.id,
                    room = %room_id,
                    removed = entry.is_some(),
                    "Lobby request withdrawn"
                );
            }
            Err(e) => {
                warn!(connection = %connection.id, room = %room_id, error = %e, "Failed to withdraw lobby request");
            }
        }
        true
    }
}
