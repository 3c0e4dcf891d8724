//! Pure session-controller state machine
//!
//! All client-side business logic lives here as a pure, synchronous
//! function: `transition(state, input, now) -> (state, commands)`.
//! The function does no IO and takes no locks; the driver executes the
//! returned commands (wire writes, timers, render calls).

use std::time::Duration;

use palaver_protocol::{ClientEvent, ServerEvent};

use crate::config::ControllerConfig;
use crate::view::{AgentEntry, ConversationView, Entry};

// ---------------------------------------------------------------------------
// States
// ---------------------------------------------------------------------------

/// Lifecycle of the channel to the server.
///
/// `Connecting` covers both the transport dial and the wait for the
/// server's `connected` confirmation; a transport-level connect alone
/// does not make the session ready to send. `Offline` is terminal:
/// reconnection attempts are exhausted and no further dialing happens
/// automatically.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting { attempt: u32 },
    Connected,
    Offline,
}

/// Lifecycle of the (at most one) in-flight message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExchangePhase {
    Idle,
    /// Emitted to the driver, socket write not yet acknowledged.
    Sending { request_id: u64 },
    /// On the wire; waiting for exactly one terminal event.
    AwaitingResponse { request_id: u64 },
}

/// Owned controller state. Construct once per page/terminal session.
#[derive(Debug, Clone)]
pub struct ControllerState {
    pub config: ControllerConfig,
    pub connection: ConnectionState,
    pub phase: ExchangePhase,
    /// Server-assigned identity; immutable for the life of one channel.
    /// A reconnect yields a fresh session.
    pub session_id: Option<String>,
    pub view: ConversationView,
    next_request_id: u64,
    ever_connected: bool,
}

impl ControllerState {
    pub fn new(config: ControllerConfig) -> Self {
        Self {
            config,
            connection: ConnectionState::Disconnected,
            phase: ExchangePhase::Idle,
            session_id: None,
            view: ConversationView::new(),
            next_request_id: 1,
            ever_connected: false,
        }
    }

    /// The correlation id of the in-flight request, if one exists.
    pub fn outstanding_request(&self) -> Option<u64> {
        match self.phase {
            ExchangePhase::Sending { request_id }
            | ExchangePhase::AwaitingResponse { request_id } => Some(request_id),
            ExchangePhase::Idle => None,
        }
    }

    fn accepts_event_for(&self, event_request_id: Option<u64>) -> bool {
        match (self.outstanding_request(), event_request_id) {
            // Nothing in flight: every request-scoped event is stale.
            (None, _) => false,
            // Peer without correlation ids: fall back to channel ordering.
            (Some(_), None) => true,
            (Some(current), Some(id)) => current == id,
        }
    }
}

// ---------------------------------------------------------------------------
// Inputs
// ---------------------------------------------------------------------------

/// Everything that can drive the controller: user actions, driver
/// acknowledgements, timer expiries, and decoded server events.
#[derive(Debug, Clone)]
pub enum Input {
    /// Start (or, from `Offline`, manually restart) the connection.
    Open,
    /// Transport connected; the session is still not ready until the
    /// server's `connected` event arrives.
    ChannelUp,
    /// Transport dropped mid-session.
    ChannelDown { reason: String },
    /// A dial attempt failed outright.
    DialFailed { error: String },
    /// User submitted input text.
    Submit { text: String },
    /// The driver wrote the message frame to the socket.
    SendAck { request_id: u64 },
    /// The socket write failed; the message never left the machine.
    SendFailed { request_id: u64, error: String },
    /// User confirmed the clear-history prompt.
    ClearConfirmed,
    /// The response timer for a request expired.
    ResponseTimedOut { request_id: u64 },
    /// A decoded event from the server.
    Server(ServerEvent),
}

// ---------------------------------------------------------------------------
// Commands — effects for the driver/front end to execute
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    /// Serialize and send an event on the channel.
    Emit(ClientEvent),
    /// Connect (or reconnect) the transport after `delay`.
    Dial { delay: Duration },
    StartResponseTimer { request_id: u64, timeout: Duration },
    CancelResponseTimer,
    Ui(UiCommand),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeKind {
    Info,
    Success,
    Warning,
    Error,
}

/// Render instructions. The controller state is the source of truth; these
/// describe the incremental updates a front end applies.
#[derive(Debug, Clone, PartialEq)]
pub enum UiCommand {
    AppendUser { text: String, timestamp: String },
    AppendAgent(AgentEntry),
    AppendError { message: String, timestamp: String },
    ClearInput,
    SetInputEnabled(bool),
    /// Progress text shown while awaiting a response; last-write-wins,
    /// `None` hides the indicator.
    SetProgress(Option<String>),
    SetConnection(ConnectionState),
    Notify { kind: NoticeKind, message: String },
    /// Reset the conversation area to the initial welcome view.
    ShowWelcome,
}

fn ui(cmd: UiCommand) -> Command {
    Command::Ui(cmd)
}

fn notify(kind: NoticeKind, message: impl Into<String>) -> Command {
    Command::Ui(UiCommand::Notify {
        kind,
        message: message.into(),
    })
}

// ---------------------------------------------------------------------------
// transition() — the pure core
// ---------------------------------------------------------------------------

/// Pure, synchronous state transition.
///
/// `now` is a pre-formatted client-local timestamp, supplied by the
/// driver so the function stays clock-free.
pub fn transition(
    mut state: ControllerState,
    input: Input,
    now: &str,
) -> (ControllerState, Vec<Command>) {
    let mut commands: Vec<Command> = Vec::new();

    match input {
        // -- Connection lifecycle ---------------------------------------------
        Input::Open => {
            if matches!(
                state.connection,
                ConnectionState::Disconnected | ConnectionState::Offline
            ) {
                state.connection = ConnectionState::Connecting { attempt: 0 };
                commands.push(ui(UiCommand::SetConnection(state.connection)));
                commands.push(Command::Dial {
                    delay: Duration::ZERO,
                });
            }
        }

        // Transport up; readiness waits for the server's `connected` event.
        Input::ChannelUp => {}

        Input::ChannelDown { reason } => {
            handle_drop(&mut state, &reason, &mut commands);
        }

        Input::DialFailed { error } => {
            handle_drop(&mut state, &error, &mut commands);
        }

        // -- Message exchange -------------------------------------------------
        Input::Submit { text } => {
            let text = text.trim();
            if text.is_empty() {
                // Empty input is not an error; it's a silent no-op.
                return (state, commands);
            }
            if state.connection != ConnectionState::Connected {
                commands.push(notify(
                    NoticeKind::Warning,
                    "Not connected — your message was not sent",
                ));
                return (state, commands);
            }
            if state.phase != ExchangePhase::Idle {
                // One in-flight message at a time; further submits are
                // dropped until a terminal event arrives.
                return (state, commands);
            }

            let request_id = state.next_request_id;
            state.next_request_id += 1;
            state.phase = ExchangePhase::Sending { request_id };

            // Optimistic local echo: the server never repeats our text back.
            state.view.push(Entry::User {
                text: text.to_string(),
                timestamp: now.to_string(),
            });

            commands.push(ui(UiCommand::AppendUser {
                text: text.to_string(),
                timestamp: now.to_string(),
            }));
            commands.push(ui(UiCommand::ClearInput));
            commands.push(ui(UiCommand::SetInputEnabled(false)));
            commands.push(Command::Emit(ClientEvent::SendMessage {
                message: text.to_string(),
                request_id: Some(request_id),
            }));
        }

        Input::SendAck { request_id } => {
            if state.phase == (ExchangePhase::Sending { request_id }) {
                state.phase = ExchangePhase::AwaitingResponse { request_id };
                if let Some(timeout) = state.config.response_timeout {
                    commands.push(Command::StartResponseTimer {
                        request_id,
                        timeout,
                    });
                }
            }
        }

        Input::SendFailed { request_id, error } => {
            if state.outstanding_request() == Some(request_id) {
                state.phase = ExchangePhase::Idle;
                commands.push(ui(UiCommand::SetInputEnabled(true)));
                commands.push(notify(
                    NoticeKind::Warning,
                    format!("Failed to send message: {error}"),
                ));
            }
        }

        Input::ResponseTimedOut { request_id } => {
            if state.outstanding_request() == Some(request_id) {
                state.phase = ExchangePhase::Idle;
                state.view.push(Entry::Error {
                    message: "The server did not respond in time. Please try again.".to_string(),
                    timestamp: now.to_string(),
                });
                commands.push(ui(UiCommand::SetProgress(None)));
                commands.push(ui(UiCommand::AppendError {
                    message: "The server did not respond in time. Please try again.".to_string(),
                    timestamp: now.to_string(),
                }));
                commands.push(notify(NoticeKind::Error, "Request timed out"));
                commands.push(ui(UiCommand::SetInputEnabled(true)));
            }
        }

        // -- History clear ----------------------------------------------------
        Input::ClearConfirmed => {
            // Optimistic: reset locally first, acknowledge later.
            state.view.clear();
            commands.push(ui(UiCommand::ShowWelcome));
            if state.connection == ConnectionState::Connected {
                commands.push(Command::Emit(ClientEvent::ClearHistory));
            } else {
                commands.push(notify(
                    NoticeKind::Info,
                    "History cleared locally — the server was not notified",
                ));
            }
        }

        // -- Server events ----------------------------------------------------
        Input::Server(event) => handle_server_event(&mut state, event, now, &mut commands),
    }

    (state, commands)
}

fn handle_drop(state: &mut ControllerState, reason: &str, commands: &mut Vec<Command>) {
    let next_attempt = match state.connection {
        ConnectionState::Connected => 1,
        ConnectionState::Connecting { attempt } => attempt + 1,
        // Already down; nothing to retry.
        ConnectionState::Disconnected | ConnectionState::Offline => return,
    };

    // Abandon any in-flight message: no transport means no terminal event
    // is coming for it, and a late one is rejected by its request id.
    if state.phase != ExchangePhase::Idle {
        state.phase = ExchangePhase::Idle;
        commands.push(Command::CancelResponseTimer);
        commands.push(ui(UiCommand::SetProgress(None)));
    }
    state.session_id = None;
    commands.push(ui(UiCommand::SetInputEnabled(false)));

    if next_attempt > state.config.reconnect.max_attempts {
        state.connection = ConnectionState::Offline;
        commands.push(ui(UiCommand::SetConnection(state.connection)));
        commands.push(notify(
            NoticeKind::Error,
            format!(
                "Offline — giving up after {} reconnection attempts ({reason})",
                state.config.reconnect.max_attempts
            ),
        ));
    } else {
        state.connection = ConnectionState::Connecting {
            attempt: next_attempt,
        };
        commands.push(ui(UiCommand::SetConnection(state.connection)));
        commands.push(Command::Dial {
            delay: state.config.reconnect.delay_for(next_attempt),
        });
    }
}

fn handle_server_event(
    state: &mut ControllerState,
    event: ServerEvent,
    now: &str,
    commands: &mut Vec<Command>,
) {
    match event {
        ServerEvent::Connected { client_id, message } => {
            if state.connection == ConnectionState::Connected {
                // Duplicate confirmation on a live channel; ignore.
                return;
            }
            state.connection = ConnectionState::Connected;
            state.session_id = Some(client_id);
            commands.push(ui(UiCommand::SetConnection(state.connection)));
            commands.push(ui(UiCommand::SetInputEnabled(true)));
            if state.ever_connected {
                commands.push(notify(NoticeKind::Success, "Reconnected to the server"));
            } else {
                commands.push(notify(
                    NoticeKind::Info,
                    message.unwrap_or_else(|| "Connected".to_string()),
                ));
            }
            state.ever_connected = true;
        }

        ServerEvent::StatusUpdate {
            message,
            request_id,
        } => {
            if state.accepts_event_for(request_id) {
                commands.push(ui(UiCommand::SetProgress(Some(message))));
            }
        }

        ServerEvent::FinalResponse {
            response,
            confidence,
            processing_time,
            method,
            sources,
            request_id,
        } => {
            if !state.accepts_event_for(request_id) {
                return;
            }
            state.phase = ExchangePhase::Idle;
            let entry = AgentEntry {
                text: response,
                confidence,
                processing_time,
                method,
                sources,
                timestamp: now.to_string(),
            };
            state.view.push(Entry::Agent(entry.clone()));
            commands.push(Command::CancelResponseTimer);
            commands.push(ui(UiCommand::SetProgress(None)));
            commands.push(ui(UiCommand::AppendAgent(entry)));
            commands.push(ui(UiCommand::SetInputEnabled(true)));
        }

        ServerEvent::Error {
            message,
            request_id,
        } => {
            if !state.accepts_event_for(request_id) {
                return;
            }
            state.phase = ExchangePhase::Idle;
            state.view.push(Entry::Error {
                message: message.clone(),
                timestamp: now.to_string(),
            });
            commands.push(Command::CancelResponseTimer);
            commands.push(ui(UiCommand::SetProgress(None)));
            commands.push(ui(UiCommand::AppendError {
                message: message.clone(),
                timestamp: now.to_string(),
            }));
            commands.push(notify(NoticeKind::Error, message));
            commands.push(ui(UiCommand::SetInputEnabled(true)));
        }

        ServerEvent::HistoryCleared { message } => {
            commands.push(notify(NoticeKind::Success, message));
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
