//! WebSocket handling

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use axum::{
    extract::{
        ws::{Message, WebSocket},
        State, WebSocketUpgrade,
    },
    response::IntoResponse,
};
use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use palaver_protocol::{new_id, ClientEvent, ServerEvent};

use crate::pipeline::{AgentRequest, ProgressSender};
use crate::state::AppState;

static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(1);

const GREETING: &str = "Connected to the Palaver agent relay";
const HISTORY_CLEARED: &str = "Conversation history cleared";

/// Frames that can be sent through the WebSocket
enum OutboundFrame {
    /// JSON-serialized ServerEvent
    Event(ServerEvent),
    /// Raw pong response
    Pong(Bytes),
}

/// WebSocket upgrade handler
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

/// Handle a WebSocket connection
async fn handle_socket(socket: WebSocket, state: Arc<AppState>) {
    let conn_id = NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed);
    // Session identity: assigned once per channel, never reused. A
    // reconnecting client gets a fresh id (and a fresh history).
    let client_id = new_id();
    info!(
        component = "websocket",
        event = "ws.connection.opened",
        connection_id = conn_id,
        client_id = %client_id,
        "WebSocket connection opened"
    );

    let (mut ws_tx, mut ws_rx) = socket.split();

    // Channel for sending frames to this client; a spawned task owns the
    // write half so request tasks can emit concurrently.
    let (outbound_tx, mut outbound_rx) = mpsc::channel::<OutboundFrame>(100);

    let send_task = tokio::spawn(async move {
        while let Some(frame) = outbound_rx.recv().await {
            let result = match frame {
                OutboundFrame::Event(event) => match serde_json::to_string(&event) {
                    Ok(json) => ws_tx.send(Message::Text(json.into())).await,
                    Err(e) => {
                        error!(
                            component = "websocket",
                            event = "ws.send.serialize_failed",
                            connection_id = conn_id,
                            error = %e,
                            "Failed to serialize server event"
                        );
                        continue;
                    }
                },
                OutboundFrame::Pong(data) => ws_tx.send(Message::Pong(data)).await,
            };

            if result.is_err() {
                debug!(
                    component = "websocket",
                    event = "ws.send.disconnected",
                    connection_id = conn_id,
                    "WebSocket send failed, client disconnected"
                );
                break;
            }
        }
    });

    // Application-level session confirmation. The transport being up is
    // not enough for clients; they wait for this before sending.
    send_event(
        &outbound_tx,
        ServerEvent::Connected {
            client_id: client_id.clone(),
            message: Some(GREETING.to_string()),
        },
    )
    .await;

    // Handle incoming events
    while let Some(result) = ws_rx.next().await {
        let msg = match result {
            Ok(Message::Text(text)) => text,
            Ok(Message::Ping(data)) => {
                let _ = outbound_tx.send(OutboundFrame::Pong(data)).await;
                continue;
            }
            Ok(Message::Close(_)) => {
                info!(
                    component = "websocket",
                    event = "ws.connection.close_frame",
                    connection_id = conn_id,
                    "Client sent close frame"
                );
                break;
            }
            Ok(_) => continue,
            Err(e) => {
                warn!(
                    component = "websocket",
                    event = "ws.connection.error",
                    connection_id = conn_id,
                    error = %e,
                    "WebSocket error"
                );
                break;
            }
        };

        let client_event: ClientEvent = match serde_json::from_str(&msg) {
            Ok(event) => event,
            Err(e) => {
                warn!(
                    component = "websocket",
                    event = "ws.event.parse_failed",
                    connection_id = conn_id,
                    error = %e,
                    payload_bytes = msg.len(),
                    payload_preview = %truncate_for_log(&msg, 240),
                    "Failed to parse client event"
                );
                send_event(
                    &outbound_tx,
                    ServerEvent::Error {
                        message: e.to_string(),
                        request_id: None,
                    },
                )
                .await;
                continue;
            }
        };

        handle_client_event(client_event, &client_id, &outbound_tx, &state, conn_id).await;
    }

    // History lives only as long as the channel.
    state.conversations().clear(&client_id);
    info!(
        component = "websocket",
        event = "ws.connection.closed",
        connection_id = conn_id,
        client_id = %client_id,
        "WebSocket connection closed"
    );
    send_task.abort();
}

fn truncate_for_log(value: &str, max_chars: usize) -> String {
    value.chars().take(max_chars).collect()
}

fn round_seconds(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Send a ServerEvent through the outbound channel
async fn send_event(tx: &mpsc::Sender<OutboundFrame>, event: ServerEvent) {
    let _ = tx.send(OutboundFrame::Event(event)).await;
}

/// Handle a client event
async fn handle_client_event(
    event: ClientEvent,
    client_id: &str,
    outbound_tx: &mpsc::Sender<OutboundFrame>,
    state: &Arc<AppState>,
    conn_id: u64,
) {
    match event {
        ClientEvent::SendMessage {
            message,
            request_id,
        } => {
            let message = message.trim().to_string();
            if message.is_empty() {
                // Matches client-side validation; an empty message is
                // dropped, not answered with an error.
                debug!(
                    component = "relay",
                    event = "relay.message.empty_ignored",
                    connection_id = conn_id,
                    "Ignoring empty message"
                );
                return;
            }

            info!(
                component = "relay",
                event = "relay.message.received",
                connection_id = conn_id,
                client_id = %client_id,
                request_id = ?request_id,
                content_chars = message.chars().count(),
                "Received message"
            );

            // Each request runs independently; the relay does not enforce
            // single-flight (clients do). Correlation ids keep concurrent
            // terminal events attributable.
            tokio::spawn(run_request(
                state.clone(),
                client_id.to_string(),
                message,
                request_id,
                outbound_tx.clone(),
                conn_id,
            ));
        }

        ClientEvent::ClearHistory => {
            let had_history = state.conversations().clear(client_id);
            info!(
                component = "relay",
                event = "relay.history.cleared",
                connection_id = conn_id,
                client_id = %client_id,
                had_history = had_history,
                "Conversation history cleared"
            );
            send_event(
                outbound_tx,
                ServerEvent::HistoryCleared {
                    message: HISTORY_CLEARED.to_string(),
                },
            )
            .await;
        }
    }
}

/// Drive one request through the agent pipeline, forwarding progress and
/// finishing with exactly one terminal event.
async fn run_request(
    state: Arc<AppState>,
    client_id: String,
    message: String,
    request_id: Option<u64>,
    outbound_tx: mpsc::Sender<OutboundFrame>,
    conn_id: u64,
) {
    let started = Instant::now();
    let history = state.conversations().history(&client_id);

    let (progress_tx, mut progress_rx) = mpsc::channel::<String>(16);
    let status_tx = outbound_tx.clone();
    let forwarder = tokio::spawn(async move {
        while let Some(text) = progress_rx.recv().await {
            let sent = status_tx
                .send(OutboundFrame::Event(ServerEvent::StatusUpdate {
                    message: text,
                    request_id,
                }))
                .await;
            if sent.is_err() {
                break;
            }
        }
    });

    let request = AgentRequest {
        client_id: client_id.clone(),
        message: message.clone(),
        history,
    };
    let result = state
        .pipeline()
        .process(request, ProgressSender::new(progress_tx))
        .await;

    // Flush remaining progress before the terminal event; a status update
    // must never trail the event that ends the request.
    let _ = forwarder.await;

    let elapsed = round_seconds(started.elapsed().as_secs_f64());
    match result {
        Ok(reply) => {
            state
                .conversations()
                .record_exchange(&client_id, &message, &reply.response);
            info!(
                component = "relay",
                event = "relay.request.completed",
                connection_id = conn_id,
                client_id = %client_id,
                request_id = ?request_id,
                processing_time = elapsed,
                sources_found = reply.sources.len(),
                "Request completed"
            );
            send_event(
                &outbound_tx,
                ServerEvent::FinalResponse {
                    response: reply.response,
                    confidence: reply.confidence,
                    processing_time: Some(elapsed),
                    method: reply.method,
                    sources: reply.sources,
                    request_id,
                },
            )
            .await;
        }
        Err(e) => {
            warn!(
                component = "relay",
                event = "relay.request.failed",
                connection_id = conn_id,
                client_id = %client_id,
                request_id = ?request_id,
                error = %e,
                "Request failed"
            );
            send_event(
                &outbound_tx,
                ServerEvent::Error {
                    message: e.to_string(),
                    request_id,
                },
            )
            .await;
        }
    }
}
