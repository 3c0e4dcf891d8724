//! Palaver client session controller
//!
//! The client half of the relay contract: a pure state machine covering
//! the connection lifecycle (bounded reconnects, terminal offline state)
//! and the message exchange (single in-flight request, correlation ids,
//! response timeout), plus an async driver that runs it over a WebSocket.
//!
//! Front ends feed [`driver::UserAction`]s in and render the
//! [`controller::UiCommand`]s that come back; they never touch the wire.

pub mod config;
pub mod controller;
pub mod driver;
pub mod view;

pub use config::{ControllerConfig, ReconnectPolicy};
pub use controller::{
    transition, Command, ConnectionState, ControllerState, ExchangePhase, Input, NoticeKind,
    UiCommand,
};
pub use driver::{DriverError, UserAction};
pub use view::{AgentEntry, ConversationView, Entry};
