//! Palaver CLI - chat with the relay from the terminal
//!
//! Thin front end over `palaver-client`: feeds user actions into the
//! driver and renders the UI commands that come back. All protocol and
//! state-machine logic lives in the client crate.

use std::time::Duration;

use anyhow::Result;
use clap::Parser;
use console::style;
use tokio::io::{AsyncBufReadExt, BufReader, Lines, Stdin};
use tokio::sync::mpsc;

use palaver_client::{
    driver, AgentEntry, ConnectionState, ControllerConfig, NoticeKind, ReconnectPolicy, UiCommand,
    UserAction,
};

#[derive(Debug, Parser)]
#[command(name = "palaver", version, about = "Terminal client for the Palaver relay")]
struct Args {
    /// WebSocket endpoint of the relay server
    #[arg(long, env = "PALAVER_URL", default_value = "ws://127.0.0.1:4000/ws")]
    url: String,

    /// Reconnection attempts before settling offline
    #[arg(long, default_value_t = 5)]
    reconnect_attempts: u32,

    /// Seconds to wait for a response before failing locally (0 disables)
    #[arg(long, default_value_t = 120)]
    response_timeout: u64,
}

/// What one line of terminal input means.
#[derive(Debug, PartialEq, Eq)]
enum LineCommand {
    Quit,
    Clear,
    Say(String),
}

fn parse_line(line: &str) -> Option<LineCommand> {
    let line = line.trim();
    match line {
        "" => None,
        "/quit" | "/exit" => Some(LineCommand::Quit),
        "/clear" => Some(LineCommand::Clear),
        _ => Some(LineCommand::Say(line.to_string())),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config = ControllerConfig {
        reconnect: ReconnectPolicy {
            max_attempts: args.reconnect_attempts,
            ..ReconnectPolicy::default()
        },
        response_timeout: match args.response_timeout {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        },
    };

    let (action_tx, action_rx) = mpsc::channel(8);
    let (ui_tx, mut ui_rx) = mpsc::channel(64);

    let driver_task = tokio::spawn(driver::run(args.url.clone(), config, action_rx, ui_tx));
    let render_task = tokio::spawn(async move {
        while let Some(cmd) = ui_rx.recv().await {
            render(cmd);
        }
    });

    println!(
        "{} {}",
        style("palaver").bold(),
        style("— type a message and press Enter. /clear resets history, /quit exits.").dim()
    );

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        match parse_line(&line) {
            None => {}
            Some(LineCommand::Quit) => break,
            Some(LineCommand::Clear) => {
                if confirm_clear(&mut lines).await? {
                    action_tx.send(UserAction::ClearConfirmed).await?;
                } else {
                    println!("{}", style("Clear cancelled").dim());
                }
            }
            Some(LineCommand::Say(text)) => {
                action_tx.send(UserAction::Submit(text)).await?;
            }
        }
    }

    let _ = action_tx.send(UserAction::Shutdown).await;
    driver_task.await??;
    render_task.abort();
    Ok(())
}

async fn confirm_clear(lines: &mut Lines<BufReader<Stdin>>) -> Result<bool> {
    println!(
        "{}",
        style("Clear conversation history? [y/N]").yellow().bold()
    );
    let answer = lines.next_line().await?.unwrap_or_default();
    Ok(matches!(answer.trim(), "y" | "Y" | "yes"))
}

fn render(cmd: UiCommand) {
    match cmd {
        UiCommand::AppendUser { text, .. } => {
            println!("{} {}", style("you ›").bold().cyan(), text);
        }
        UiCommand::AppendAgent(entry) => render_agent(entry),
        UiCommand::AppendError { message, .. } => {
            println!("{} {}", style("error ›").bold().red(), message);
        }
        UiCommand::SetProgress(Some(message)) => {
            println!("{}", style(format!("· {message}")).dim());
        }
        UiCommand::SetProgress(None) => {}
        UiCommand::SetConnection(state) => {
            let badge = match state {
                ConnectionState::Disconnected => "disconnected".to_string(),
                ConnectionState::Connecting { attempt: 0 } => "connecting...".to_string(),
                ConnectionState::Connecting { attempt } => {
                    format!("reconnecting (attempt {attempt})...")
                }
                ConnectionState::Connected => "connected".to_string(),
                ConnectionState::Offline => "offline".to_string(),
            };
            println!("{}", style(format!("[{badge}]")).dim());
        }
        UiCommand::Notify { kind, message } => {
            let line = match kind {
                NoticeKind::Info => style(format!("• {message}")).blue(),
                NoticeKind::Success => style(format!("✓ {message}")).green(),
                NoticeKind::Warning => style(format!("! {message}")).yellow(),
                NoticeKind::Error => style(format!("✗ {message}")).red(),
            };
            println!("{line}");
        }
        UiCommand::ShowWelcome => {
            println!("{}", style("Conversation cleared — ask me anything.").dim());
        }
        // Line-oriented terminal: nothing to clear or lock, the state
        // machine already drops submissions while a request is in flight.
        UiCommand::ClearInput | UiCommand::SetInputEnabled(_) => {}
    }
}

fn render_agent(entry: AgentEntry) {
    println!("{} {}", style("agent ›").bold().green(), entry.text);

    let mut meta = Vec::new();
    if let Some(confidence) = entry.confidence {
        meta.push(format!("confidence {confidence:.0}%"));
    }
    if let Some(method) = &entry.method {
        meta.push(method.clone());
    }
    if let Some(seconds) = entry.processing_time {
        meta.push(format!("{seconds:.2}s"));
    }
    if !meta.is_empty() {
        println!("{}", style(meta.join(" · ")).dim());
    }

    for source in &entry.sources {
        println!(
            "  {} {}",
            style(&source.name).dim(),
            style(&source.url).dim().underlined()
        );
    }
}
