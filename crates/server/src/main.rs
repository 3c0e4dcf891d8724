//! Palaver server binary
//!
//! Runs the relay with the built-in echo pipeline; real deployments
//! construct [`AppState`] with their own [`AgentPipeline`] implementation.

use std::net::SocketAddr;
use std::sync::Arc;

use clap::Parser;
use tracing::info;

use palaver_server::logging::init_logging;
use palaver_server::pipeline::EchoPipeline;
use palaver_server::state::AppState;
use palaver_server::VERSION;

#[derive(Debug, Parser)]
#[command(
    name = "palaver-server",
    version,
    about = "Real-time relay between chat clients and an agent pipeline"
)]
struct Args {
    /// Address to listen on
    #[arg(long, env = "PALAVER_BIND", default_value = "127.0.0.1:4000")]
    bind: SocketAddr,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let _logging = init_logging()?;

    info!(
        component = "server",
        event = "server.starting",
        version = VERSION,
        "Starting Palaver server"
    );

    let state = Arc::new(AppState::new(Arc::new(EchoPipeline)));
    let app = palaver_server::app(state);

    info!(
        component = "server",
        event = "server.listening",
        addr = %args.bind,
        "Listening"
    );

    let listener = tokio::net::TcpListener::bind(args.bind).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
