//! # huddle-protocol
//!
//! Wire protocol definitions for the Huddle session coordinator.
//!
//! This crate defines the events exchanged between meeting clients and the
//! coordinator, and the codecs used to put them on a WebSocket.
//!
//! ## Event Groups
//!
//! - `join-room` / `leave-room` / lobby decisions - Room membership
//! - `offer` / `answer` / `ice-candidate` - Opaque peer negotiation relay
//! - Media toggles, hands and reactions - Ephemeral presence
//! - Kick, mute-all, recording, meeting end - Host actions
//!
//! ## Example
//!
//! ```rust
//! use huddle_protocol::{codec, ClientEvent, WireFormat};
//!
//! let event = ClientEvent::join("standup", "peer-1", "Alice");
//!
//! let encoded = codec::encode(&event, WireFormat::Json).unwrap();
//! if let codec::Encoded::Text(text) = encoded {
//!     let decoded: ClientEvent = codec::decode_json(&text).unwrap();
//!     assert_eq!(decoded, event);
//! }
//! ```

pub mod codec;
pub mod events;

pub use codec::{Encoded, ProtocolError, WireFormat};
pub use events::{
    ChatMessage, ClientEvent, ConnectionId, MessageKind, PeerInfo, Relayed, ServerEvent, Signal,
};

/// Protocol version announced in the `connected` event.
pub const PROTOCOL_VERSION: u8 = 1;
