//! Application state

use std::sync::Arc;

use crate::history::ConversationStore;
use crate::pipeline::AgentPipeline;

/// Shared application state
pub struct AppState {
    /// Per-session conversation history
    conversations: ConversationStore,

    /// The query-answering collaborator behind the relay
    pipeline: Arc<dyn AgentPipeline>,
}

impl AppState {
    pub fn new(pipeline: Arc<dyn AgentPipeline>) -> Self {
        Self {
            conversations: ConversationStore::new(),
            pipeline,
        }
    }

    pub fn conversations(&self) -> &ConversationStore {
        &self.conversations
    }

    pub fn pipeline(&self) -> Arc<dyn AgentPipeline> {
        self.pipeline.clone()
    }
}
