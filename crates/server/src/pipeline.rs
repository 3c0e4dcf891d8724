//! Agent pipeline seam
//!
//! The relay treats the whole query-answering machinery (LLM calls,
//! search/finance tools, memory, orchestration) as an opaque collaborator
//! behind this trait. Implementations stream progress text through a
//! [`ProgressSender`] and finish with exactly one `Result`: the relay maps
//! `Ok` to a `final_response` event and `Err` to a terminal `error` event.

use futures::future::BoxFuture;
use thiserror::Error;
use tokio::sync::mpsc;

use palaver_protocol::{Source, Turn};

/// One query handed to the pipeline, with the session's prior turns.
#[derive(Debug, Clone)]
pub struct AgentRequest {
    pub client_id: String,
    pub message: String,
    pub history: Vec<Turn>,
}

/// The pipeline's answer. `processing_time` is stamped by the relay, which
/// measures the whole run around this call.
#[derive(Debug, Clone, Default)]
pub struct AgentReply {
    pub response: String,
    pub confidence: Option<f64>,
    pub method: Option<String>,
    pub sources: Vec<Source>,
}

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("agent backend error: {0}")]
    Backend(String),

    #[error("tool execution failed: {0}")]
    Tool(String),
}

/// Progress text emitted while a request is being processed. Send errors
/// mean the client is gone; progress is best-effort and dropped silently.
#[derive(Debug, Clone)]
pub struct ProgressSender(mpsc::Sender<String>);

impl ProgressSender {
    pub fn new(tx: mpsc::Sender<String>) -> Self {
        Self(tx)
    }

    pub async fn update(&self, message: impl Into<String>) {
        let _ = self.0.send(message.into()).await;
    }
}

pub trait AgentPipeline: Send + Sync + 'static {
    fn process(
        &self,
        request: AgentRequest,
        progress: ProgressSender,
    ) -> BoxFuture<'static, Result<AgentReply, PipelineError>>;
}

/// Development stand-in used when no real agent backend is wired up:
/// one status update, then the query echoed back.
#[derive(Debug, Default)]
pub struct EchoPipeline;

impl AgentPipeline for EchoPipeline {
    fn process(
        &self,
        request: AgentRequest,
        progress: ProgressSender,
    ) -> BoxFuture<'static, Result<AgentReply, PipelineError>> {
        Box::pin(async move {
            progress.update("Thinking it over...").await;
            Ok(AgentReply {
                response: format!("You said: {}", request.message),
                confidence: None,
                method: Some("echo".to_string()),
                sources: vec![],
            })
        })
    }
}
