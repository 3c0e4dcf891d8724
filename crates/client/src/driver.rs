//! Async interpreter for the session controller
//!
//! Owns the WebSocket, the reconnect/response timers, and the transition
//! loop. All decisions live in [`crate::controller::transition`]; this
//! module only executes the commands it returns and feeds external events
//! back in as inputs.

use std::collections::VecDeque;
use std::future;
use std::pin::Pin;
use std::time::{SystemTime, UNIX_EPOCH};

use futures::{SinkExt, StreamExt};
use thiserror::Error;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::time::{sleep, Sleep};
use tokio_tungstenite::tungstenite::{Error as WsError, Message as WsMessage};
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, warn};

use palaver_protocol::{ClientEvent, ServerEvent};

use crate::config::ControllerConfig;
use crate::controller::{transition, Command, ControllerState, Input, NoticeKind, UiCommand};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Actions a front end feeds into the driver. Confirmation prompts (for
/// history clearing) happen in the front end; the driver only ever sees
/// the confirmed action.
#[derive(Debug, Clone)]
pub enum UserAction {
    Submit(String),
    ClearConfirmed,
    Shutdown,
}

#[derive(Debug, Error)]
pub enum DriverError {
    #[error("front end closed its render channel")]
    UiClosed,

    #[error("failed to encode event: {0}")]
    Encode(#[from] serde_json::Error),
}

struct Timers {
    dial: Option<Pin<Box<Sleep>>>,
    response: Option<(u64, Pin<Box<Sleep>>)>,
}

/// Run the session controller against `url` until the front end shuts it
/// down or drops its channels.
pub async fn run(
    url: String,
    config: ControllerConfig,
    mut actions: mpsc::Receiver<UserAction>,
    ui_tx: mpsc::Sender<UiCommand>,
) -> Result<(), DriverError> {
    let mut state = ControllerState::new(config);
    let mut ws: Option<WsStream> = None;
    let mut timers = Timers {
        dial: None,
        response: None,
    };
    let mut queue: VecDeque<Input> = VecDeque::new();
    queue.push_back(Input::Open);

    loop {
        // Drain pending inputs before awaiting anything new, so command
        // follow-ups (send acks, dial scheduling) are applied in order.
        while let Some(input) = queue.pop_front() {
            let (next, commands) = transition(state, input, &now_stamp());
            state = next;
            execute(commands, &mut ws, &mut timers, &ui_tx, &mut queue).await?;
        }

        tokio::select! {
            action = actions.recv() => match action {
                Some(UserAction::Submit(text)) => queue.push_back(Input::Submit { text }),
                Some(UserAction::ClearConfirmed) => queue.push_back(Input::ClearConfirmed),
                Some(UserAction::Shutdown) | None => {
                    if let Some(mut stream) = ws.take() {
                        let _ = stream.close(None).await;
                    }
                    return Ok(());
                }
            },

            _ = dial_deadline(&mut timers.dial) => {
                timers.dial = None;
                match connect_async(url.as_str()).await {
                    Ok((stream, _response)) => {
                        debug!(
                            component = "driver",
                            event = "driver.channel.up",
                            url = %url,
                            "Transport connected"
                        );
                        ws = Some(stream);
                        queue.push_back(Input::ChannelUp);
                    }
                    Err(e) => {
                        queue.push_back(Input::DialFailed {
                            error: e.to_string(),
                        });
                    }
                }
            },

            request_id = response_deadline(&mut timers.response) => {
                timers.response = None;
                queue.push_back(Input::ResponseTimedOut { request_id });
            },

            frame = next_frame(&mut ws) => match frame {
                Some(Ok(WsMessage::Text(text))) => {
                    match serde_json::from_str::<ServerEvent>(&text) {
                        Ok(event) => queue.push_back(Input::Server(event)),
                        Err(e) => {
                            // Last-resort backstop: an unreadable frame is
                            // surfaced, never fatal.
                            warn!(
                                component = "driver",
                                event = "driver.frame.parse_failed",
                                error = %e,
                                "Failed to parse server event"
                            );
                            send_ui(
                                &ui_tx,
                                UiCommand::Notify {
                                    kind: NoticeKind::Warning,
                                    message: "Received an unreadable message from the server"
                                        .to_string(),
                                },
                            )
                            .await?;
                        }
                    }
                }
                Some(Ok(WsMessage::Ping(data))) => {
                    if let Some(stream) = ws.as_mut() {
                        let _ = stream.send(WsMessage::Pong(data)).await;
                    }
                }
                Some(Ok(WsMessage::Close(_))) | None => {
                    ws = None;
                    queue.push_back(Input::ChannelDown {
                        reason: "closed by server".to_string(),
                    });
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    ws = None;
                    queue.push_back(Input::ChannelDown {
                        reason: e.to_string(),
                    });
                }
            },
        }
    }
}

async fn execute(
    commands: Vec<Command>,
    ws: &mut Option<WsStream>,
    timers: &mut Timers,
    ui_tx: &mpsc::Sender<UiCommand>,
    queue: &mut VecDeque<Input>,
) -> Result<(), DriverError> {
    for command in commands {
        match command {
            Command::Emit(event) => {
                let request_id = match &event {
                    ClientEvent::SendMessage { request_id, .. } => *request_id,
                    ClientEvent::ClearHistory => None,
                };
                let json = serde_json::to_string(&event)?;
                let outcome = match ws.as_mut() {
                    Some(stream) => stream
                        .send(WsMessage::text(json))
                        .await
                        .map_err(|e: WsError| e.to_string()),
                    None => Err("no transport".to_string()),
                };
                match (outcome, request_id) {
                    (Ok(()), Some(request_id)) => {
                        queue.push_back(Input::SendAck { request_id });
                    }
                    (Ok(()), None) => {}
                    (Err(error), Some(request_id)) => {
                        queue.push_back(Input::SendFailed { request_id, error });
                    }
                    (Err(error), None) => {
                        debug!(
                            component = "driver",
                            event = "driver.emit.dropped",
                            error = %error,
                            "Dropped outbound event without transport"
                        );
                    }
                }
            }
            Command::Dial { delay } => {
                timers.dial = Some(Box::pin(sleep(delay)));
            }
            Command::StartResponseTimer {
                request_id,
                timeout,
            } => {
                timers.response = Some((request_id, Box::pin(sleep(timeout))));
            }
            Command::CancelResponseTimer => {
                timers.response = None;
            }
            Command::Ui(cmd) => send_ui(ui_tx, cmd).await?,
        }
    }
    Ok(())
}

async fn send_ui(ui_tx: &mpsc::Sender<UiCommand>, cmd: UiCommand) -> Result<(), DriverError> {
    ui_tx.send(cmd).await.map_err(|_| DriverError::UiClosed)
}

async fn next_frame(ws: &mut Option<WsStream>) -> Option<Result<WsMessage, WsError>> {
    match ws.as_mut() {
        Some(stream) => stream.next().await,
        None => future::pending().await,
    }
}

async fn dial_deadline(slot: &mut Option<Pin<Box<Sleep>>>) {
    match slot.as_mut() {
        Some(timer) => timer.as_mut().await,
        None => future::pending().await,
    }
}

async fn response_deadline(slot: &mut Option<(u64, Pin<Box<Sleep>>)>) -> u64 {
    match slot.as_mut() {
        Some((request_id, timer)) => {
            timer.as_mut().await;
            *request_id
        }
        None => future::pending().await,
    }
}

/// Display-only client-local timestamp (unix seconds).
fn now_stamp() -> String {
    let secs = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs();
    format!("{}Z", secs)
}
