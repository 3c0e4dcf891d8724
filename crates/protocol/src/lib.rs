//! Palaver Protocol
//!
//! Shared event types for communication between the Palaver relay server
//! and its clients. Events are serialized as JSON over WebSocket text
//! frames, tagged by a `type` field carrying the wire event name.

use uuid::Uuid;

pub mod client;
pub mod server;
pub mod types;

pub use client::ClientEvent;
pub use server::ServerEvent;
pub use types::*;

/// Generate a new unique ID
pub fn new_id() -> String {
    Uuid::new_v4().to_string()
}
