//! Presence broadcast.

use super::Coordinator;
use huddle_protocol::{ConnectionId, ServerEvent};
use tracing::debug;

/// A media-state or expression change announced by a participant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PresenceUpdate {
    Audio(bool),
    Video(bool),
    ScreenShare(bool),
    HandRaised,
    Reaction(String),
}

impl Coordinator {
    /// Fan a presence update out to the rest of the sender's room.
    ///
    /// The sender must be admitted to `room_id`; otherwise nothing is sent.
    /// Returns the number of recipients.
    pub fn broadcast_presence(
        &self,
        from: &ConnectionId,
        room_id: &str,
        update: PresenceUpdate,
    ) -> usize {
        let Some(sender) = self
            .registry
            .lookup(from)
            .filter(|c| c.is_admitted_to(room_id))
        else {
            debug!(connection = %from, room = %room_id, "Presence from non-member dropped");
            return 0;
        };

        let connection_id = sender.id.clone();
        let event = match update {
            PresenceUpdate::Audio(enabled) => ServerEvent::UserAudioToggle {
                connection_id,
                enabled,
            },
            PresenceUpdate::Video(enabled) => ServerEvent::UserVideoToggle {
                connection_id,
                enabled,
            },
            PresenceUpdate::ScreenShare(sharing) => ServerEvent::UserScreenShare {
                connection_id,
                sharing,
            },
            PresenceUpdate::HandRaised => ServerEvent::HandRaised {
                connection_id,
                user_name: sender.display_name,
            },
            PresenceUpdate::Reaction(reaction) => ServerEvent::UserReaction {
                connection_id,
                user_name: sender.display_name,
                reaction,
            },
        };

        self.broadcast(room_id, event, Some(from))
    }
}
