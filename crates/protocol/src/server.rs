//! Server → Client events

use serde::{Deserialize, Serialize};

use crate::types::Source;

/// Events sent from server to client
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerEvent {
    /// First application-level event on a fresh channel: assigns the
    /// session identity. A transport-level connect alone does not mean
    /// the channel is ready to carry messages.
    Connected {
        client_id: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        message: Option<String>,
    },

    /// Progress text while a request is being processed. Display is
    /// last-write-wins; these never terminate a request.
    StatusUpdate {
        message: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        request_id: Option<u64>,
    },

    /// Terminal success for one request.
    FinalResponse {
        response: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        confidence: Option<f64>,
        #[serde(skip_serializing_if = "Option::is_none")]
        processing_time: Option<f64>,
        #[serde(skip_serializing_if = "Option::is_none")]
        method: Option<String>,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        sources: Vec<Source>,
        #[serde(skip_serializing_if = "Option::is_none")]
        request_id: Option<u64>,
    },

    /// Terminal failure for one request.
    Error {
        message: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        request_id: Option<u64>,
    },

    /// Acknowledges a conversation reset.
    HistoryCleared { message: String },
}

impl ServerEvent {
    /// The correlation id this event carries, if any. `connected` and
    /// `history_cleared` are session-scoped and never carry one.
    pub fn request_id(&self) -> Option<u64> {
        match self {
            ServerEvent::StatusUpdate { request_id, .. }
            | ServerEvent::FinalResponse { request_id, .. }
            | ServerEvent::Error { request_id, .. } => *request_id,
            ServerEvent::Connected { .. } | ServerEvent::HistoryCleared { .. } => None,
        }
    }

    /// Whether this event ends an in-flight request's lifecycle.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ServerEvent::FinalResponse { .. } | ServerEvent::Error { .. }
        )
    }
}
