use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::fmt;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

const DEFAULT_FILTER: &str = "info,tower_http=warn,hyper=warn";

/// Keeps the non-blocking file writer alive for the process lifetime.
pub struct LoggingHandle {
    pub guard: Option<WorkerGuard>,
}

pub fn init_logging() -> anyhow::Result<LoggingHandle> {
    let filter = std::env::var("PALAVER_LOG_FILTER")
        .ok()
        .and_then(|value| EnvFilter::try_new(value).ok())
        .or_else(|| EnvFilter::try_from_default_env().ok())
        .unwrap_or_else(|| EnvFilter::new(DEFAULT_FILTER));

    let format = std::env::var("PALAVER_LOG_FORMAT").unwrap_or_else(|_| "pretty".into());

    // Optional JSON file log alongside the console output, for deployments
    // that want to keep history (PALAVER_LOG_DIR=~/.palaver/logs).
    let mut guard = None;
    let file_layer = match std::env::var("PALAVER_LOG_DIR") {
        Ok(dir) => {
            std::fs::create_dir_all(&dir)?;
            let file_appender = tracing_appender::rolling::never(&dir, "server.log");
            let (writer, file_guard) = tracing_appender::non_blocking(file_appender);
            guard = Some(file_guard);
            Some(
                fmt::layer()
                    .with_writer(writer)
                    .json()
                    .flatten_event(true)
                    .with_target(true)
                    .with_current_span(true),
            )
        }
        Err(_) => None,
    };

    let registry = tracing_subscriber::registry().with(filter).with(file_layer);
    if format.eq_ignore_ascii_case("json") {
        registry
            .with(
                fmt::layer()
                    .with_writer(std::io::stderr)
                    .json()
                    .flatten_event(true)
                    .with_target(true)
                    .with_current_span(true),
            )
            .init();
    } else {
        registry
            .with(
                fmt::layer()
                    .with_writer(std::io::stderr)
                    .with_ansi(true)
                    .with_target(false),
            )
            .init();
    }

    tracing::info!(
        component = "logging",
        event = "logging.initialized",
        format = %format,
        filter = %std::env::var("PALAVER_LOG_FILTER")
            .or_else(|_| std::env::var("RUST_LOG"))
            .unwrap_or_else(|_| DEFAULT_FILTER.to_string()),
    );

    Ok(LoggingHandle { guard })
}
