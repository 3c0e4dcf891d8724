//! End-to-end relay tests over a real WebSocket.

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures::future::BoxFuture;
use futures::{SinkExt, StreamExt};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

use palaver_protocol::{ClientEvent, ServerEvent, Source};
use palaver_server::pipeline::{
    AgentPipeline, AgentReply, AgentRequest, PipelineError, ProgressSender,
};
use palaver_server::state::AppState;

type WsClient = WebSocketStream<MaybeTlsStream<TcpStream>>;

#[derive(Clone)]
enum Outcome {
    Reply(AgentReply),
    ToolFailure(String),
}

/// Pipeline that replays a fixed script and records every request it saw.
struct ScriptedPipeline {
    statuses: Vec<String>,
    outcome: Outcome,
    requests: Arc<Mutex<Vec<AgentRequest>>>,
}

impl ScriptedPipeline {
    fn new(statuses: &[&str], outcome: Outcome) -> (Arc<Self>, Arc<Mutex<Vec<AgentRequest>>>) {
        let requests = Arc::new(Mutex::new(Vec::new()));
        let pipeline = Arc::new(Self {
            statuses: statuses.iter().map(|s| s.to_string()).collect(),
            outcome,
            requests: requests.clone(),
        });
        (pipeline, requests)
    }
}

impl AgentPipeline for ScriptedPipeline {
    fn process(
        &self,
        request: AgentRequest,
        progress: ProgressSender,
    ) -> BoxFuture<'static, Result<AgentReply, PipelineError>> {
        self.requests.lock().expect("requests lock").push(request);
        let statuses = self.statuses.clone();
        let outcome = self.outcome.clone();
        Box::pin(async move {
            for status in statuses {
                progress.update(status).await;
            }
            match outcome {
                Outcome::Reply(reply) => Ok(reply),
                Outcome::ToolFailure(message) => Err(PipelineError::Tool(message)),
            }
        })
    }
}

async fn spawn_app(pipeline: Arc<dyn AgentPipeline>) -> SocketAddr {
    let state = Arc::new(AppState::new(pipeline));
    let app = palaver_server::app(state);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind");
    let addr = listener.local_addr().expect("local addr");
    tokio::spawn(async move {
        axum::serve(listener, app).await.expect("serve");
    });
    addr
}

async fn connect(addr: SocketAddr) -> (WsClient, String) {
    let (mut ws, _) = connect_async(format!("ws://{addr}/ws"))
        .await
        .expect("connect");
    match recv_event(&mut ws).await {
        ServerEvent::Connected { client_id, .. } => {
            assert!(!client_id.is_empty());
            (ws, client_id)
        }
        other => panic!("expected connected first, got {:?}", other),
    }
}

async fn recv_event(ws: &mut WsClient) -> ServerEvent {
    loop {
        let frame = timeout(Duration::from_secs(5), ws.next())
            .await
            .expect("timed out waiting for a server event")
            .expect("stream ended")
            .expect("websocket error");
        if let WsMessage::Text(text) = frame {
            return serde_json::from_str(&text).expect("parse server event");
        }
    }
}

async fn send(ws: &mut WsClient, event: &ClientEvent) {
    let json = serde_json::to_string(event).expect("serialize client event");
    ws.send(WsMessage::text(json)).await.expect("send");
}

#[tokio::test]
async fn each_channel_gets_its_own_session_identity() {
    let (pipeline, _) = ScriptedPipeline::new(&[], Outcome::Reply(AgentReply::default()));
    let addr = spawn_app(pipeline).await;

    let (_ws_a, id_a) = connect(addr).await;
    let (_ws_b, id_b) = connect(addr).await;
    assert_ne!(id_a, id_b);
}

#[tokio::test]
async fn success_scenario_streams_status_then_final_response() {
    let (pipeline, _) = ScriptedPipeline::new(
        &["Fetching data..."],
        Outcome::Reply(AgentReply {
            response: "AAPL is $150".to_string(),
            confidence: Some(95.0),
            method: Some("finance".to_string()),
            sources: vec![Source {
                name: "Yahoo Finance".to_string(),
                url: "https://finance.yahoo.com/quote/AAPL".to_string(),
            }],
        }),
    );
    let addr = spawn_app(pipeline).await;
    let (mut ws, _) = connect(addr).await;

    send(
        &mut ws,
        &ClientEvent::SendMessage {
            message: "What's AAPL stock price?".to_string(),
            request_id: Some(1),
        },
    )
    .await;

    match recv_event(&mut ws).await {
        ServerEvent::StatusUpdate {
            message,
            request_id,
        } => {
            assert_eq!(message, "Fetching data...");
            assert_eq!(request_id, Some(1));
        }
        other => panic!("expected status_update, got {:?}", other),
    }

    match recv_event(&mut ws).await {
        ServerEvent::FinalResponse {
            response,
            confidence,
            processing_time,
            sources,
            request_id,
            ..
        } => {
            assert_eq!(response, "AAPL is $150");
            assert_eq!(confidence, Some(95.0));
            assert!(processing_time.is_some());
            assert_eq!(sources.len(), 1);
            assert_eq!(sources[0].name, "Yahoo Finance");
            assert_eq!(request_id, Some(1));
        }
        other => panic!("expected final_response, got {:?}", other),
    }
}

#[tokio::test]
async fn failure_scenario_ends_with_one_error_event() {
    let (pipeline, _) =
        ScriptedPipeline::new(&[], Outcome::ToolFailure("Tool timed out".to_string()));
    let addr = spawn_app(pipeline).await;
    let (mut ws, _) = connect(addr).await;

    send(
        &mut ws,
        &ClientEvent::SendMessage {
            message: "anything".to_string(),
            request_id: Some(4),
        },
    )
    .await;

    match recv_event(&mut ws).await {
        ServerEvent::Error {
            message,
            request_id,
        } => {
            assert!(message.contains("Tool timed out"), "got: {message}");
            assert_eq!(request_id, Some(4));
        }
        other => panic!("expected error, got {:?}", other),
    }

    // The error was terminal: a follow-up clear is answered next, with no
    // stray events in between.
    send(&mut ws, &ClientEvent::ClearHistory).await;
    assert!(matches!(
        recv_event(&mut ws).await,
        ServerEvent::HistoryCleared { .. }
    ));
}

#[tokio::test]
async fn empty_and_whitespace_messages_are_ignored() {
    let (pipeline, requests) = ScriptedPipeline::new(&[], Outcome::Reply(AgentReply::default()));
    let addr = spawn_app(pipeline).await;
    let (mut ws, _) = connect(addr).await;

    send(
        &mut ws,
        &ClientEvent::SendMessage {
            message: String::new(),
            request_id: Some(1),
        },
    )
    .await;
    send(
        &mut ws,
        &ClientEvent::SendMessage {
            message: "   ".to_string(),
            request_id: Some(2),
        },
    )
    .await;
    send(&mut ws, &ClientEvent::ClearHistory).await;

    // Nothing reached the pipeline and nothing preceded the clear ack.
    assert!(matches!(
        recv_event(&mut ws).await,
        ServerEvent::HistoryCleared { .. }
    ));
    assert!(requests.lock().expect("requests lock").is_empty());
}

#[tokio::test]
async fn clear_history_is_idempotent() {
    let (pipeline, _) = ScriptedPipeline::new(&[], Outcome::Reply(AgentReply::default()));
    let addr = spawn_app(pipeline).await;
    let (mut ws, _) = connect(addr).await;

    for _ in 0..2 {
        send(&mut ws, &ClientEvent::ClearHistory).await;
        match recv_event(&mut ws).await {
            ServerEvent::HistoryCleared { message } => {
                assert_eq!(message, "Conversation history cleared");
            }
            other => panic!("expected history_cleared, got {:?}", other),
        }
    }
}

#[tokio::test]
async fn completed_exchanges_feed_the_next_request_as_history() {
    let (pipeline, requests) = ScriptedPipeline::new(
        &[],
        Outcome::Reply(AgentReply {
            response: "first answer".to_string(),
            ..AgentReply::default()
        }),
    );
    let addr = spawn_app(pipeline).await;
    let (mut ws, _) = connect(addr).await;

    send(
        &mut ws,
        &ClientEvent::SendMessage {
            message: "first question".to_string(),
            request_id: Some(1),
        },
    )
    .await;
    assert!(matches!(
        recv_event(&mut ws).await,
        ServerEvent::FinalResponse { .. }
    ));

    send(
        &mut ws,
        &ClientEvent::SendMessage {
            message: "second question".to_string(),
            request_id: Some(2),
        },
    )
    .await;
    assert!(matches!(
        recv_event(&mut ws).await,
        ServerEvent::FinalResponse { .. }
    ));

    let seen = requests.lock().expect("requests lock");
    assert_eq!(seen.len(), 2);
    assert!(seen[0].history.is_empty());
    assert_eq!(seen[1].history.len(), 2);
    assert_eq!(seen[1].history[0].content, "first question");
    assert_eq!(seen[1].history[1].content, "first answer");
}

#[tokio::test]
async fn trimmed_message_text_reaches_the_pipeline() {
    let (pipeline, requests) = ScriptedPipeline::new(&[], Outcome::Reply(AgentReply::default()));
    let addr = spawn_app(pipeline).await;
    let (mut ws, _) = connect(addr).await;

    send(
        &mut ws,
        &ClientEvent::SendMessage {
            message: "  hello  ".to_string(),
            request_id: None,
        },
    )
    .await;
    assert!(matches!(
        recv_event(&mut ws).await,
        ServerEvent::FinalResponse { .. }
    ));

    let seen = requests.lock().expect("requests lock");
    assert_eq!(seen[0].message, "hello");
}

#[tokio::test]
async fn malformed_json_is_answered_with_an_error_event() {
    let (pipeline, _) = ScriptedPipeline::new(&[], Outcome::Reply(AgentReply::default()));
    let addr = spawn_app(pipeline).await;
    let (mut ws, _) = connect(addr).await;

    ws.send(WsMessage::text("this is not json"))
        .await
        .expect("send garbage");

    match recv_event(&mut ws).await {
        ServerEvent::Error { request_id, .. } => assert!(request_id.is_none()),
        other => panic!("expected error, got {:?}", other),
    }

    // The channel survives a bad frame.
    send(&mut ws, &ClientEvent::ClearHistory).await;
    assert!(matches!(
        recv_event(&mut ws).await,
        ServerEvent::HistoryCleared { .. }
    ));
}

#[tokio::test]
async fn health_endpoint_reports_status() {
    let (pipeline, _) = ScriptedPipeline::new(&[], Outcome::Reply(AgentReply::default()));
    let addr = spawn_app(pipeline).await;

    let mut stream = TcpStream::connect(addr).await.expect("connect http");
    stream
        .write_all(b"GET /health HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n")
        .await
        .expect("write request");
    let mut response = String::new();
    stream
        .read_to_string(&mut response)
        .await
        .expect("read response");

    assert!(response.starts_with("HTTP/1.1 200"), "got: {response}");
    assert!(response.contains("\"status\":\"healthy\""), "got: {response}");
}
