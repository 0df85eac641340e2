//! Host-only room administration.

use super::{Coordinator, SessionError};
use crate::connection::Membership;
use huddle_protocol::{ConnectionId, ServerEvent};
use std::sync::Arc;
use tracing::{info, warn};

impl Coordinator {
    /// Kick a participant.
    ///
    /// The target is told it was kicked and the room is told who was kicked.
    /// The target stays a member until it leaves, unless the coordinator was
    /// configured with `evict_on_kick`.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::NotHost`] or [`SessionError::NotAdmitted`] for
    /// unauthorized callers, and [`SessionError::TargetNotFound`] when the
    /// target is not a member of the room.
    pub async fn kick(
        &self,
        caller: &ConnectionId,
        room_id: &str,
        target: &ConnectionId,
    ) -> Result<(), SessionError> {
        self.authorize_host(caller, room_id, true).await?;

        let victim = self
            .registry
            .lookup(target)
            .filter(|c| c.is_admitted_to(room_id))
            .ok_or_else(|| SessionError::TargetNotFound(target.clone()))?;

        self.send(
            target,
            ServerEvent::KickedFromRoom {
                room_id: room_id.to_string(),
            },
        );
        self.broadcast(
            room_id,
            ServerEvent::ParticipantKicked {
                connection_id: target.clone(),
                user_name: victim.display_name,
            },
            None,
        );

        info!(host = %caller, connection = %target, room = %room_id, "Participant kicked");

        if self.config.evict_on_kick {
            self.leave(target).await;
        }
        Ok(())
    }

    /// Ask everyone else in the room to mute. Purely advisory.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::NotHost`] or [`SessionError::NotAdmitted`] for
    /// unauthorized callers.
    pub async fn mute_all(&self, caller: &ConnectionId, room_id: &str) -> Result<(), SessionError> {
        self.authorize_host(caller, room_id, true).await?;

        let notified = self.broadcast(
            room_id,
            ServerEvent::MutedByHost {
                room_id: room_id.to_string(),
            },
            Some(caller),
        );
        info!(host = %caller, room = %room_id, notified, "Muted all");
        Ok(())
    }

    /// Announce that recording started or stopped.
    ///
    /// # Errors
    ///
    /// Same as [`Coordinator::mute_all`].
    pub async fn set_recording(
        &self,
        caller: &ConnectionId,
        room_id: &str,
        recording: bool,
    ) -> Result<(), SessionError> {
        self.authorize_host(caller, room_id, true).await?;

        let room_id_owned = room_id.to_string();
        let event = if recording {
            ServerEvent::RecordingStarted {
                room_id: room_id_owned,
            }
        } else {
            ServerEvent::RecordingStopped {
                room_id: room_id_owned,
            }
        };
        self.broadcast(room_id, event, Some(caller));

        info!(host = %caller, room = %room_id, recording, "Recording state announced");
        Ok(())
    }

    /// End the meeting for everyone.
    ///
    /// Other members and any connections still waiting in the lobby receive
    /// `meeting-ended`. The room is then cleared from the index, its members
    /// are reset to idle and pending approvals for it are dropped. The
    /// durable room record is left as it is.
    ///
    /// Returns the number of members that were cleared.
    ///
    /// # Errors
    ///
    /// Same as [`Coordinator::mute_all`].
    pub async fn end_meeting(
        &self,
        caller: &ConnectionId,
        room_id: &str,
    ) -> Result<usize, SessionError> {
        self.authorize_host(caller, room_id, true).await?;

        let ended = Arc::new(ServerEvent::MeetingEnded {
            room_id: room_id.to_string(),
        });
        let audience = self.registry.find(|c| {
            c.id != *caller && (c.is_admitted_to(room_id) || c.waiting_room() == Some(room_id))
        });
        for connection in &audience {
            self.registry.send(&connection.id, Arc::clone(&ended));
        }

        let members = self.index.clear_room(room_id);
        for member in members.iter().chain(audience.iter().map(|c| &c.id)) {
            self.registry.update(member, |c| {
                if c.is_admitted_to(room_id) || c.waiting_room() == Some(room_id) {
                    c.membership = Membership::Idle;
                }
            });
        }
        self.approvals
            .retain(|_, approved| approved.as_str() != room_id);

        for waiter in audience.iter().filter(|c| c.waiting_room() == Some(room_id)) {
            if let Err(e) = self.store.remove_lobby_entry(room_id, &waiter.id).await {
                warn!(connection = %waiter.id, room = %room_id, error = %e, "Failed to drop lobby request");
            }
        }

        info!(
            host = %caller,
            room = %room_id,
            members = members.len(),
            notified = audience.len(),
            "Meeting ended"
        );
        Ok(members.len())
    }
}
