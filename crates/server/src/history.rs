//! Per-session conversation history
//!
//! Lives only as long as the owning channel: history is keyed by the
//! server-assigned client id, dropped on disconnect or on an explicit
//! clear. Persistence belongs to the external memory service, not here.

use dashmap::DashMap;

use palaver_protocol::Turn;

#[derive(Debug, Default)]
pub struct ConversationStore {
    conversations: DashMap<String, Vec<Turn>>,
}

impl ConversationStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of a client's history, oldest first.
    pub fn history(&self, client_id: &str) -> Vec<Turn> {
        self.conversations
            .get(client_id)
            .map(|turns| turns.clone())
            .unwrap_or_default()
    }

    /// Record one completed query/response exchange.
    pub fn record_exchange(&self, client_id: &str, user_message: &str, response: &str) {
        let mut entry = self.conversations.entry(client_id.to_string()).or_default();
        entry.push(Turn::user(user_message));
        entry.push(Turn::assistant(response));
    }

    /// Drop a client's history. Returns whether anything was stored.
    pub fn clear(&self, client_id: &str) -> bool {
        self.conversations.remove(client_id).is_some()
    }
}
