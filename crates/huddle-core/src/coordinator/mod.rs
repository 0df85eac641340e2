//! Session coordinator.
//!
//! The coordinator owns the ephemeral state (connection registry, room index,
//! lobby approvals) and drives the join protocol against the persistence
//! gateway. Every operation is callable concurrently from any number of
//! connection tasks; a single connection's events must be fed in order.
//!
//! ```text
//!  join-room ──▶ room lookup ──▶ lobby gate ──┬──▶ Waiting ──▶ admit ──▶ re-join
//!                                             └──▶ Admitted ──▶ leave / disconnect
//! ```

mod admin;
mod chat;
mod join;
mod leave;
mod lobby;
mod presence;
mod relay;

pub use join::{JoinOutcome, JoinRequest};
pub use presence::PresenceUpdate;
pub use relay::SignalKind;

use crate::connection::{Connection, Identity, RoomId};
use crate::index::RoomIndex;
use crate::registry::{ConnectionRegistry, Outbound};
use crate::room::Room;
use crate::store::{RoomStore, StoreError};
use dashmap::DashMap;
use huddle_protocol::{ClientEvent, ConnectionId, ServerEvent, PROTOCOL_VERSION};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, trace};

/// Session errors.
#[derive(Debug, Error)]
pub enum SessionError {
    /// The room does not exist.
    #[error("Room not found")]
    RoomNotFound,

    /// The room exists but is no longer active.
    #[error("Room has ended")]
    RoomEnded,

    /// The room is at its participant cap.
    #[error("Room is full")]
    RoomFull,

    /// The join could not be recorded.
    #[error("Failed to join room")]
    JoinFailed(#[source] StoreError),

    /// A chat message could not be stored.
    #[error("Failed to send message")]
    MessageNotStored(#[source] StoreError),

    /// The connection is not registered.
    #[error("Unknown connection")]
    UnknownConnection,

    /// The connection is not admitted to the room it addressed.
    #[error("Not admitted to room {0}")]
    NotAdmitted(RoomId),

    /// A host-only action from someone who is not the host.
    #[error("Not the room host")]
    NotHost,

    /// No pending lobby request from the target.
    #[error("No lobby request from {0}")]
    NotInLobby(ConnectionId),

    /// The target of an administrative action is not in the room.
    #[error("Target not in room: {0}")]
    TargetNotFound(ConnectionId),

    /// A persistence call failed.
    #[error("Persistence failure: {0}")]
    Persistence(#[from] StoreError),
}

impl SessionError {
    /// Message to report to the requesting connection, if any.
    ///
    /// Authorization and addressing failures return `None`: they are dropped
    /// silently so probing clients learn nothing about room hosts or members.
    #[must_use]
    pub fn client_message(&self) -> Option<String> {
        match self {
            SessionError::RoomNotFound
            | SessionError::RoomEnded
            | SessionError::RoomFull
            | SessionError::JoinFailed(_)
            | SessionError::MessageNotStored(_) => Some(self.to_string()),
            _ => None,
        }
    }
}

/// Coordinator configuration.
#[derive(Debug, Clone)]
pub struct CoordinatorConfig {
    /// Remove kicked connections from the room immediately instead of
    /// waiting for them to leave.
    pub evict_on_kick: bool,
    /// Number of recent chat messages sent to a newly admitted connection.
    /// Zero disables the history event.
    pub chat_history_on_join: usize,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            evict_on_kick: false,
            chat_history_on_join: 50,
        }
    }
}

/// The session coordinator.
pub struct Coordinator {
    registry: ConnectionRegistry,
    index: RoomIndex,
    store: Arc<dyn RoomStore>,
    /// One-time lobby approvals: connection -> room it may now join.
    approvals: DashMap<ConnectionId, RoomId>,
    config: CoordinatorConfig,
}

impl Coordinator {
    /// Create a coordinator with default configuration.
    #[must_use]
    pub fn new(store: Arc<dyn RoomStore>) -> Self {
        Self::with_config(store, CoordinatorConfig::default())
    }

    /// Create a coordinator with custom configuration.
    #[must_use]
    pub fn with_config(store: Arc<dyn RoomStore>, config: CoordinatorConfig) -> Self {
        info!("Creating coordinator with config: {:?}", config);
        Self {
            registry: ConnectionRegistry::new(),
            index: RoomIndex::new(),
            store,
            approvals: DashMap::new(),
            config,
        }
    }

    /// The connection registry.
    #[must_use]
    pub fn registry(&self) -> &ConnectionRegistry {
        &self.registry
    }

    /// The room index.
    #[must_use]
    pub fn index(&self) -> &RoomIndex {
        &self.index
    }

    /// The persistence gateway.
    #[must_use]
    pub fn store(&self) -> &Arc<dyn RoomStore> {
        &self.store
    }

    /// Get coordinator statistics.
    #[must_use]
    pub fn stats(&self) -> CoordinatorStats {
        CoordinatorStats {
            connection_count: self.registry.len(),
            room_count: self.index.room_count(),
            pending_approvals: self.approvals.len(),
        }
    }

    /// Register a new connection whose identity was resolved at handshake.
    ///
    /// Sends `connected` to the new connection and returns its ID.
    pub fn connect(&self, identity: Identity, outbound: Outbound) -> ConnectionId {
        let mut id = ConnectionId::generate();
        let mut connection = Connection::new(id.clone(), identity.clone());
        while !self.registry.register(connection, outbound.clone()) {
            id = ConnectionId::generate();
            connection = Connection::new(id.clone(), identity.clone());
        }

        self.send(
            &id,
            ServerEvent::Connected {
                connection_id: id.clone(),
                version: PROTOCOL_VERSION,
                user_id: identity.to_string(),
            },
        );
        id
    }

    /// Dispatch one client event.
    ///
    /// Errors meant for the client are sent back as `error` events; all
    /// others are logged and dropped.
    pub async fn handle(&self, connection_id: &ConnectionId, event: ClientEvent) {
        let name = event.name();
        trace!(connection = %connection_id, event = name, "Handling event");

        let result = match event {
            ClientEvent::JoinRoom {
                room_id,
                peer_id,
                user_name,
                avatar,
            } => self
                .join(
                    connection_id,
                    JoinRequest {
                        room_id,
                        peer_id,
                        display_name: user_name,
                        avatar,
                    },
                )
                .await
                .map(|_| ()),
            ClientEvent::Offer(signal) => {
                self.relay(SignalKind::Offer, connection_id, signal);
                Ok(())
            }
            ClientEvent::Answer(signal) => {
                self.relay(SignalKind::Answer, connection_id, signal);
                Ok(())
            }
            ClientEvent::IceCandidate(signal) => {
                self.relay(SignalKind::IceCandidate, connection_id, signal);
                Ok(())
            }
            ClientEvent::SendMessage { room_id, message } => {
                self.send_chat(connection_id, &room_id, &message).await
            }
            ClientEvent::ToggleAudio { room_id, enabled } => {
                self.broadcast_presence(connection_id, &room_id, PresenceUpdate::Audio(enabled));
                Ok(())
            }
            ClientEvent::ToggleVideo { room_id, enabled } => {
                self.broadcast_presence(connection_id, &room_id, PresenceUpdate::Video(enabled));
                Ok(())
            }
            ClientEvent::ScreenShareStarted { room_id } => {
                self.broadcast_presence(connection_id, &room_id, PresenceUpdate::ScreenShare(true));
                Ok(())
            }
            ClientEvent::ScreenShareStopped { room_id } => {
                self.broadcast_presence(
                    connection_id,
                    &room_id,
                    PresenceUpdate::ScreenShare(false),
                );
                Ok(())
            }
            ClientEvent::RaiseHand { room_id } => {
                self.broadcast_presence(connection_id, &room_id, PresenceUpdate::HandRaised);
                Ok(())
            }
            ClientEvent::SendReaction { room_id, reaction } => {
                self.broadcast_presence(connection_id, &room_id, PresenceUpdate::Reaction(reaction));
                Ok(())
            }
            ClientEvent::KickParticipant {
                room_id,
                target_connection_id,
            } => self.kick(connection_id, &room_id, &target_connection_id).await,
            ClientEvent::MuteAll { room_id } => self.mute_all(connection_id, &room_id).await,
            ClientEvent::StartRecording { room_id } => {
                self.set_recording(connection_id, &room_id, true).await
            }
            ClientEvent::StopRecording { room_id } => {
                self.set_recording(connection_id, &room_id, false).await
            }
            ClientEvent::LeaveRoom { room_id } => {
                self.leave_room(connection_id, &room_id).await;
                Ok(())
            }
            ClientEvent::MeetingEnded { room_id } => self
                .end_meeting(connection_id, &room_id)
                .await
                .map(|_| ()),
            ClientEvent::ApproveLobby {
                room_id,
                connection_id: target,
            } => self.admit(connection_id, &room_id, &target).await,
            ClientEvent::RejectLobby {
                room_id,
                connection_id: target,
            } => self.reject(connection_id, &room_id, &target).await,
        };

        if let Err(e) = result {
            match e.client_message() {
                Some(message) => {
                    debug!(connection = %connection_id, event = name, error = %e, "Reporting error");
                    self.send(connection_id, ServerEvent::error(message));
                }
                None => {
                    debug!(connection = %connection_id, event = name, error = %e, "Event ignored");
                }
            }
        }
    }

    /// Queue an event for one connection.
    fn send(&self, connection_id: &ConnectionId, event: ServerEvent) -> bool {
        self.registry.send(connection_id, Arc::new(event))
    }

    /// Send an event to every member of a room, optionally skipping one.
    ///
    /// Membership is read once; connections admitted after the read do not
    /// receive the event. Returns the number of recipients.
    fn broadcast(&self, room_id: &str, event: ServerEvent, except: Option<&ConnectionId>) -> usize {
        let event = Arc::new(event);
        let mut delivered = 0;

        for member in self.index.members_of(room_id) {
            if except == Some(&member) {
                continue;
            }
            if self.registry.send(&member, Arc::clone(&event)) {
                delivered += 1;
            }
        }

        trace!(room = %room_id, event = event.name(), recipients = delivered, "Broadcast");
        delivered
    }

    /// Check that `caller` is the host of `room_id`.
    ///
    /// The host is always taken from the durable room record and compared
    /// with the identity bound to the caller's own connection. A missing room
    /// is reported as [`SessionError::NotHost`] so the answer is the same
    /// whether or not the room exists.
    async fn authorize_host(
        &self,
        caller: &ConnectionId,
        room_id: &str,
        require_admitted: bool,
    ) -> Result<(Connection, Room), SessionError> {
        let connection = self
            .registry
            .lookup(caller)
            .ok_or(SessionError::UnknownConnection)?;

        if require_admitted && !connection.is_admitted_to(room_id) {
            return Err(SessionError::NotAdmitted(room_id.to_string()));
        }

        let room = self
            .store
            .find_room(room_id)
            .await?
            .ok_or(SessionError::NotHost)?;

        if !room.is_host(&connection.identity) {
            debug!(connection = %caller, room = %room_id, "Host check failed");
            return Err(SessionError::NotHost);
        }

        Ok((connection, room))
    }
}

/// Coordinator statistics.
#[derive(Debug, Clone)]
pub struct CoordinatorStats {
    /// Number of live connections.
    pub connection_count: usize,
    /// Number of rooms with at least one admitted member.
    pub room_count: usize,
    /// Lobby approvals not yet consumed by a join.
    pub pending_approvals: usize,
}
