//! Leave reconciliation.
//!
//! Explicit leaves, disconnects and kicks with eviction all funnel into
//! [`Coordinator::depart`]. Whoever clears the admission first runs the
//! departure; every later caller finds nothing to clear, so the room sees
//! exactly one `user-left` per departure.

use super::Coordinator;
use crate::connection::{Connection, Membership};
use huddle_protocol::{ConnectionId, ServerEvent};
use tracing::{debug, info, warn};

impl Coordinator {
    /// Leave the connection's current room, or withdraw its lobby request.
    ///
    /// Returns `true` if the connection was admitted somewhere. Calling this
    /// again, or for an unknown connection, is a no-op.
    pub async fn leave(&self, connection_id: &ConnectionId) -> bool {
        if let Some(before) = self.registry.take_admission(connection_id) {
            self.depart(&before).await;
            return true;
        }

        let waiting = self
            .registry
            .update(connection_id, |c| {
                let before = c.clone();
                if matches!(c.membership, Membership::Waiting(_)) {
                    c.membership = Membership::Idle;
                }
                before
            });
        if let Some(before) = waiting {
            self.withdraw_lobby_request(&before).await;
        }
        false
    }

    /// Leave `room_id` on request from the client.
    ///
    /// Ignored unless the connection is admitted to, or waiting for, that
    /// room. Returns `true` if the connection was admitted.
    pub async fn leave_room(&self, connection_id: &ConnectionId, room_id: &str) -> bool {
        let Some(current) = self.registry.lookup(connection_id) else {
            return false;
        };
        if current.room_id() != Some(room_id) && current.waiting_room() != Some(room_id) {
            debug!(connection = %connection_id, room = %room_id, "Leave for a room the connection is not in");
            return false;
        }
        self.leave(connection_id).await
    }

    /// Tear down a closed connection.
    ///
    /// Runs the same departure as [`Coordinator::leave`], then forgets the
    /// connection and any lobby approval it still held.
    pub async fn disconnect(&self, connection_id: &ConnectionId) {
        self.approvals.remove(connection_id);

        let Some(last) = self.registry.unregister(connection_id) else {
            debug!(connection = %connection_id, "Disconnect for unknown connection");
            return;
        };

        match &last.membership {
            Membership::Admitted(_) => self.depart(&last).await,
            Membership::Waiting(_) => {
                self.withdraw_lobby_request(&last).await;
            }
            Membership::Idle => {}
        }

        info!(connection = %connection_id, identity = %last.identity, "Disconnected");
    }

    /// Remove a former member from its room and tell the others.
    ///
    /// `before` is the record as it was while admitted; the caller must have
    /// already cleared the admission.
    async fn depart(&self, before: &Connection) {
        let Some(room_id) = before.room_id() else {
            return;
        };
        let id = &before.id;

        self.index.remove(room_id, id);

        // The durable record belongs to the user while any of their tabs is
        // still in the room.
        let other_tabs = !before.identity.is_guest()
            && !self
                .registry
                .find(|c| {
                    &c.id != id && c.identity == before.identity && c.is_admitted_to(room_id)
                })
                .is_empty();
        if other_tabs {
            debug!(connection = %id, room = %room_id, "Participant still present from another connection");
        } else if let Err(e) = self
            .store
            .remove_participant(room_id, &before.identity, id)
            .await
        {
            warn!(connection = %id, room = %room_id, error = %e, "Failed to remove participant");
        }

        self.post_system_message(room_id, format!("{} left the meeting", before.display_name))
            .await;

        self.broadcast(
            room_id,
            ServerEvent::UserLeft {
                connection_id: id.clone(),
                user_name: before.display_name.clone(),
            },
            None,
        );

        info!(connection = %id, room = %room_id, "Left room");
    }
}
