//! # huddle-core
//!
//! Session coordination for Huddle meeting rooms.
//!
//! This crate provides the fundamental building blocks:
//!
//! - **Registry** - Live connections and their outbound queues
//! - **Index** - Which connections are admitted to which room
//! - **Coordinator** - Join protocol, lobby, relay, presence and leave
//! - **Store** - Persistence gateway for rooms and chat history
//! - **Auth** - Handshake-time identity resolution
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐     ┌─────────────┐     ┌─────────────┐
//! │  Transport  │────▶│ Coordinator │────▶│  RoomStore  │
//! └─────────────┘     └─────────────┘     └─────────────┘
//!                        │       │
//!                        ▼       ▼
//!               ┌──────────┐  ┌───────────┐
//!               │ Registry │  │ RoomIndex │
//!               └──────────┘  └───────────┘
//! ```

pub mod auth;
pub mod connection;
pub mod coordinator;
pub mod index;
pub mod registry;
pub mod room;
pub mod store;

pub use auth::{authenticate, AuthError, Authenticator, TokenTable};
pub use connection::{Connection, Identity, Membership, RoomId, UserId};
pub use coordinator::{
    Coordinator, CoordinatorConfig, CoordinatorStats, JoinOutcome, JoinRequest, PresenceUpdate,
    SessionError, SignalKind,
};
pub use index::RoomIndex;
pub use registry::{outbound_queue, ConnectionRegistry, Inbox, Outbound};
pub use room::{LobbyEntry, NewMessage, Participant, Room, RoomSettings};
pub use store::{MemoryStore, RoomStore, StoreError};
