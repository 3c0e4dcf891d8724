//! Palaver Server
//!
//! Real-time relay between chat clients and an agent pipeline. Clients
//! hold one WebSocket channel, submit queries, and receive streamed
//! progress plus exactly one terminal event per query.

pub mod history;
pub mod logging;
pub mod pipeline;
pub mod state;
pub mod websocket;

use std::sync::Arc;

use axum::{response::IntoResponse, routing::get, Json, Router};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::state::AppState;
use crate::websocket::ws_handler;

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Build the HTTP/WebSocket router. Page serving and all presentation
/// belong to the front end; the server exposes only the channel endpoint
/// and a health probe.
pub fn app(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/ws", get(ws_handler))
        .route("/health", get(health_handler))
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state)
}

async fn health_handler() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "healthy",
        "version": VERSION,
    }))
}
