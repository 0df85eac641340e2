//! Room chat and system notices.

use super::{Coordinator, SessionError};
use crate::room::NewMessage;
use huddle_protocol::{ConnectionId, ServerEvent};
use tracing::{debug, warn};

impl Coordinator {
    /// Store a chat message and broadcast it to the whole room, sender
    /// included.
    ///
    /// Blank messages are dropped.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::NotAdmitted`] when the sender is not a member
    /// of `room_id`, and [`SessionError::MessageNotStored`] when the store
    /// rejects the message.
    pub async fn send_chat(
        &self,
        from: &ConnectionId,
        room_id: &str,
        message: &str,
    ) -> Result<(), SessionError> {
        let sender = self
            .registry
            .lookup(from)
            .filter(|c| c.is_admitted_to(room_id))
            .ok_or_else(|| SessionError::NotAdmitted(room_id.to_string()))?;

        let body = message.trim();
        if body.is_empty() {
            debug!(connection = %from, "Dropped blank chat message");
            return Ok(());
        }

        let stored = self
            .store
            .append_message(NewMessage::text(
                room_id,
                &sender.identity,
                sender.display_name,
                body,
            ))
            .await
            .map_err(SessionError::MessageNotStored)?;

        self.broadcast(room_id, ServerEvent::ChatMessage(stored), None);
        Ok(())
    }

    /// Store a system notice and broadcast it to the room.
    ///
    /// Notices are best effort: if the store fails the notice is skipped.
    pub(super) async fn post_system_message(&self, room_id: &str, text: String) {
        match self.store.append_message(NewMessage::system(room_id, text)).await {
            Ok(stored) => {
                self.broadcast(room_id, ServerEvent::ChatMessage(stored), None);
            }
            Err(e) => {
                warn!(room = %room_id, error = %e, "Skipped system message");
            }
        }
    }

    /// Send recent chat history to a newly admitted connection.
    pub(super) async fn send_chat_history(&self, to: &ConnectionId, room_id: &str) {
        let limit = self.config.chat_history_on_join;
        if limit == 0 {
            return;
        }

        match self.store.recent_messages(room_id, limit).await {
            Ok(messages) => {
                self.send(
                    to,
                    ServerEvent::ChatHistory {
                        room_id: room_id.to_string(),
                        messages,
                    },
                );
            }
            Err(e) => {
                warn!(connection = %to, room = %room_id, error = %e, "Failed to load chat history");
            }
        }
    }
}
