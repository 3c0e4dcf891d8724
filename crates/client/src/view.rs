//! Client-local conversation view
//!
//! An append-only, insertion-ordered list of rendered entries. The only
//! mutation besides append is an explicit clear back to the welcome state.

use palaver_protocol::Source;

/// Metadata-rich agent reply entry.
#[derive(Debug, Clone, PartialEq)]
pub struct AgentEntry {
    pub text: String,
    pub confidence: Option<f64>,
    pub processing_time: Option<f64>,
    pub method: Option<String>,
    pub sources: Vec<Source>,
    pub timestamp: String,
}

/// One rendered entry in the conversation.
#[derive(Debug, Clone, PartialEq)]
pub enum Entry {
    User { text: String, timestamp: String },
    Agent(AgentEntry),
    Error { message: String, timestamp: String },
}

#[derive(Debug, Clone, Default)]
pub struct ConversationView {
    entries: Vec<Entry>,
}

impl ConversationView {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, entry: Entry) {
        self.entries.push(entry);
    }

    /// Reset to the initial welcome state.
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// An empty view renders as the welcome screen.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn entries(&self) -> &[Entry] {
        &self.entries
    }
}
