//! Client → Server events

use serde::{Deserialize, Serialize};

/// Events sent from client to server
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientEvent {
    /// Submit a user query for processing.
    ///
    /// `request_id` is a client-assigned, monotonically increasing
    /// correlation id; the server echoes it on every event produced for
    /// this request so clients can discard stale replies after a
    /// reconnect. Peers that omit it fall back to channel ordering.
    SendMessage {
        message: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        request_id: Option<u64>,
    },

    /// Request a reset of this session's conversation history.
    ClearHistory,
}
