//! Event types for the Huddle protocol.
//!
//! Every message on the wire is an event envelope of the form
//! `{"event": "<name>", "data": {...}}`. Event names are kebab-case and
//! payload fields are camelCase.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

/// Counter mixed into generated connection IDs so two connections accepted
/// within the same clock tick still get distinct IDs.
static CONNECTION_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Opaque, process-unique identifier of a transport connection.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConnectionId(pub String);

impl ConnectionId {
    /// Create a connection ID from an existing string.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Generate a fresh connection ID.
    #[must_use]
    pub fn generate() -> Self {
        let timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos() as u64)
            .unwrap_or_default();
        let counter = CONNECTION_COUNTER.fetch_add(1, Ordering::Relaxed);
        Self(format!("conn_{:x}_{:x}", timestamp, counter))
    }

    /// Get the ID as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for ConnectionId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for ConnectionId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Kind of a chat history entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageKind {
    /// Text written by a participant.
    Text,
    /// Notice generated by the server (joins, departures).
    System,
}

/// A persisted chat message as delivered to clients.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    /// Store-assigned message ID.
    pub id: u64,
    /// Room the message belongs to.
    pub room_id: String,
    /// Sender identity, `"guest"` for guests or `"system"` for notices.
    pub sender: String,
    /// Display name shown next to the message.
    pub sender_name: String,
    /// Message body.
    pub message: String,
    /// Text or system notice.
    #[serde(rename = "type")]
    pub kind: MessageKind,
    /// Creation time in milliseconds since the Unix epoch.
    pub created_at: u64,
}

/// Public description of an admitted participant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PeerInfo {
    pub connection_id: ConnectionId,
    pub user_id: String,
    pub peer_id: String,
    pub user_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar: Option<String>,
}

/// Outgoing negotiation payload addressed to a single connection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Signal {
    /// Opaque negotiation payload (SDP, ICE candidate, ...).
    #[serde(alias = "offer", alias = "answer", alias = "candidate")]
    pub payload: Value,
    /// Target connection.
    pub to: ConnectionId,
}

/// Negotiation payload as delivered to its target.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Relayed {
    pub payload: Value,
    /// Connection that sent the payload.
    pub from: ConnectionId,
}

/// Events sent by clients.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(
    tag = "event",
    content = "data",
    rename_all = "kebab-case",
    rename_all_fields = "camelCase"
)]
pub enum ClientEvent {
    JoinRoom {
        room_id: String,
        #[serde(default)]
        peer_id: String,
        #[serde(default)]
        user_name: String,
        #[serde(default)]
        avatar: Option<String>,
    },
    Offer(Signal),
    Answer(Signal),
    IceCandidate(Signal),
    SendMessage {
        room_id: String,
        message: String,
    },
    ToggleAudio {
        room_id: String,
        enabled: bool,
    },
    ToggleVideo {
        room_id: String,
        enabled: bool,
    },
    ScreenShareStarted {
        room_id: String,
    },
    ScreenShareStopped {
        room_id: String,
    },
    RaiseHand {
        room_id: String,
    },
    SendReaction {
        room_id: String,
        reaction: String,
    },
    KickParticipant {
        room_id: String,
        #[serde(alias = "targetSocketId")]
        target_connection_id: ConnectionId,
    },
    MuteAll {
        room_id: String,
    },
    StartRecording {
        room_id: String,
    },
    StopRecording {
        room_id: String,
    },
    LeaveRoom {
        room_id: String,
    },
    MeetingEnded {
        room_id: String,
    },
    ApproveLobby {
        room_id: String,
        #[serde(alias = "socketId")]
        connection_id: ConnectionId,
    },
    RejectLobby {
        room_id: String,
        #[serde(alias = "socketId")]
        connection_id: ConnectionId,
    },
}

impl ClientEvent {
    /// Wire name of the event.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            ClientEvent::JoinRoom { .. } => "join-room",
            ClientEvent::Offer(_) => "offer",
            ClientEvent::Answer(_) => "answer",
            ClientEvent::IceCandidate(_) => "ice-candidate",
            ClientEvent::SendMessage { .. } => "send-message",
            ClientEvent::ToggleAudio { .. } => "toggle-audio",
            ClientEvent::ToggleVideo { .. } => "toggle-video",
            ClientEvent::ScreenShareStarted { .. } => "screen-share-started",
            ClientEvent::ScreenShareStopped { .. } => "screen-share-stopped",
            ClientEvent::RaiseHand { .. } => "raise-hand",
            ClientEvent::SendReaction { .. } => "send-reaction",
            ClientEvent::KickParticipant { .. } => "kick-participant",
            ClientEvent::MuteAll { .. } => "mute-all",
            ClientEvent::StartRecording { .. } => "start-recording",
            ClientEvent::StopRecording { .. } => "stop-recording",
            ClientEvent::LeaveRoom { .. } => "leave-room",
            ClientEvent::MeetingEnded { .. } => "meeting-ended",
            ClientEvent::ApproveLobby { .. } => "approve-lobby",
            ClientEvent::RejectLobby { .. } => "reject-lobby",
        }
    }

    /// Create a join request.
    #[must_use]
    pub fn join(
        room_id: impl Into<String>,
        peer_id: impl Into<String>,
        user_name: impl Into<String>,
    ) -> Self {
        ClientEvent::JoinRoom {
            room_id: room_id.into(),
            peer_id: peer_id.into(),
            user_name: user_name.into(),
            avatar: None,
        }
    }
}

/// Events sent by the server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(
    tag = "event",
    content = "data",
    rename_all = "kebab-case",
    rename_all_fields = "camelCase"
)]
pub enum ServerEvent {
    /// First event on every connection.
    Connected {
        connection_id: ConnectionId,
        version: u8,
        user_id: String,
    },
    ExistingUsers {
        users: Vec<PeerInfo>,
    },
    UserJoined(PeerInfo),
    UserLeft {
        connection_id: ConnectionId,
        user_name: String,
    },
    Offer(Relayed),
    Answer(Relayed),
    IceCandidate(Relayed),
    ChatMessage(ChatMessage),
    ChatHistory {
        room_id: String,
        messages: Vec<ChatMessage>,
    },
    UserAudioToggle {
        connection_id: ConnectionId,
        enabled: bool,
    },
    UserVideoToggle {
        connection_id: ConnectionId,
        enabled: bool,
    },
    UserScreenShare {
        connection_id: ConnectionId,
        sharing: bool,
    },
    HandRaised {
        connection_id: ConnectionId,
        user_name: String,
    },
    UserReaction {
        connection_id: ConnectionId,
        user_name: String,
        reaction: String,
    },
    KickedFromRoom {
        room_id: String,
    },
    ParticipantKicked {
        connection_id: ConnectionId,
        user_name: String,
    },
    MutedByHost {
        room_id: String,
    },
    RecordingStarted {
        room_id: String,
    },
    RecordingStopped {
        room_id: String,
    },
    MeetingEnded {
        room_id: String,
    },
    WaitingInLobby {
        room_id: String,
    },
    LobbyRequest {
        user_id: String,
        user_name: String,
        avatar: Option<String>,
        connection_id: ConnectionId,
    },
    LobbyApproved {
        room_id: String,
    },
    LobbyRejected {
        room_id: String,
    },
    Error {
        message: String,
    },
}

impl ServerEvent {
    /// Wire name of the event.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            ServerEvent::Connected { .. } => "connected",
            ServerEvent::ExistingUsers { .. } => "existing-users",
            ServerEvent::UserJoined(_) => "user-joined",
            ServerEvent::UserLeft { .. } => "user-left",
            ServerEvent::Offer(_) => "offer",
            ServerEvent::Answer(_) => "answer",
            ServerEvent::IceCandidate(_) => "ice-candidate",
            ServerEvent::ChatMessage(_) => "chat-message",
            ServerEvent::ChatHistory { .. } => "chat-history",
            ServerEvent::UserAudioToggle { .. } => "user-audio-toggle",
            ServerEvent::UserVideoToggle { .. } => "user-video-toggle",
            ServerEvent::UserScreenShare { .. } => "user-screen-share",
            ServerEvent::HandRaised { .. } => "hand-raised",
            ServerEvent::UserReaction { .. } => "user-reaction",
            ServerEvent::KickedFromRoom { .. } => "kicked-from-room",
            ServerEvent::ParticipantKicked { .. } => "participant-kicked",
            ServerEvent::MutedByHost { .. } => "muted-by-host",
            ServerEvent::RecordingStarted { .. } => "recording-started",
            ServerEvent::RecordingStopped { .. } => "recording-stopped",
            ServerEvent::MeetingEnded { .. } => "meeting-ended",
            ServerEvent::WaitingInLobby { .. } => "waiting-in-lobby",
            ServerEvent::LobbyRequest { .. } => "lobby-request",
            ServerEvent::LobbyApproved { .. } => "lobby-approved",
            ServerEvent::LobbyRejected { .. } => "lobby-rejected",
            ServerEvent::Error { .. } => "error",
        }
    }

    /// Create an error event.
    #[must_use]
    pub fn error(message: impl Into<String>) -> Self {
        ServerEvent::Error {
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_join_room_wire_shape() {
        let event: ClientEvent = serde_json::from_value(json!({
            "event": "join-room",
            "data": {"roomId": "r1", "peerId": "p1", "userName": "Alice"}
        }))
        .unwrap();

        assert_eq!(event, ClientEvent::join("r1", "p1", "Alice"));
        assert_eq!(event.name(), "join-room");
    }

    #[test]
    fn test_signal_accepts_legacy_payload_keys() {
        let event: ClientEvent = serde_json::from_value(json!({
            "event": "ice-candidate",
            "data": {"candidate": {"sdpMid": "0"}, "to": "conn_b"}
        }))
        .unwrap();

        match event {
            ClientEvent::IceCandidate(signal) => {
                assert_eq!(signal.payload, json!({"sdpMid": "0"}));
                assert_eq!(signal.to.as_str(), "conn_b");
            }
            other => panic!("Expected ice-candidate, got {:?}", other),
        }
    }

    #[test]
    fn test_kick_accepts_socket_id_alias() {
        let event: ClientEvent = serde_json::from_value(json!({
            "event": "kick-participant",
            "data": {"roomId": "r1", "targetSocketId": "conn_x"}
        }))
        .unwrap();

        assert_eq!(
            event,
            ClientEvent::KickParticipant {
                room_id: "r1".into(),
                target_connection_id: "conn_x".into(),
            }
        );
    }

    #[test]
    fn test_server_event_wire_shape() {
        let event = ServerEvent::UserLeft {
            connection_id: "conn_a".into(),
            user_name: "Alice".into(),
        };
        let value = serde_json::to_value(&event).unwrap();

        assert_eq!(
            value,
            json!({"event": "user-left", "data": {"connectionId": "conn_a", "userName": "Alice"}})
        );
        assert_eq!(event.name(), "user-left");
    }

    #[test]
    fn test_chat_message_kind_field() {
        let message = ChatMessage {
            id: 1,
            room_id: "r1".into(),
            sender: "system".into(),
            sender_name: "System".into(),
            message: "Alice joined the meeting".into(),
            kind: MessageKind::System,
            created_at: 0,
        };
        let value = serde_json::to_value(ServerEvent::ChatMessage(message)).unwrap();

        assert_eq!(value["event"], "chat-message");
        assert_eq!(value["data"]["type"], "system");
        assert_eq!(value["data"]["senderName"], "System");
    }

    #[test]
    fn test_connection_id_generation() {
        let id1 = ConnectionId::generate();
        let id2 = ConnectionId::generate();
        assert_ne!(id1, id2);
        assert!(id1.as_str().starts_with("conn_"));
    }
}
