//! # huddle-server
//!
//! WebSocket front end for the Huddle session coordinator.
//!
//! Each connection is authenticated during the HTTP upgrade, registered with
//! the [`Coordinator`](huddle_core::Coordinator), and then runs one event loop
//! that decodes client events, hands them to the coordinator, and writes the
//! events the coordinator queued for it back to the socket.

pub mod config;
pub mod handlers;
pub mod metrics;

pub use config::Config;
pub use handlers::{app, run_server, serve, AppState};
