use std::net::SocketAddr;
use std::path::Path;

use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{
    fmt::writer::BoxMakeWriter, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter,
};

use cvrag_api::{router, AppState, ServerConfig};
use cvrag_core::AgentConfig;
use cvrag_inference::OpenAIConfig;

const DEFAULT_LOG_FILTER: &str = "cvrag_api=debug,cvrag_agent=debug,tower_http=info";

/// Install the global subscriber.
///
///   LOG_FORMAT  - "json" or "text" (default: "text")
///   LOG_FILE    - write to this file with daily rotation instead of stdout
///   LOG_ANSI    - "true"/"false" override ANSI colors (off for files)
///   RUST_LOG    - standard env filter
///
/// The returned guard flushes the file writer and must live until exit.
fn init_tracing() -> Option<WorkerGuard> {
    let json = std::env::var("LOG_FORMAT").is_ok_and(|v| v == "json");
    let ansi = std::env::var("LOG_ANSI")
        .ok()
        .map(|v| v == "true" || v == "1");
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));

    let (writer, guard) = match std::env::var("LOG_FILE") {
        Ok(path) => {
            let path = Path::new(&path);
            let dir = path
                .parent()
                .filter(|p| !p.as_os_str().is_empty())
                .unwrap_or(Path::new("."));
            let name = path
                .file_name()
                .and_then(|f| f.to_str())
                .unwrap_or("cvrag-api.log");
            let (writer, guard) =
                tracing_appender::non_blocking(tracing_appender::rolling::daily(dir, name));
            (BoxMakeWriter::new(writer), Some(guard))
        }
        Err(_) => (BoxMakeWriter::new(std::io::stdout), None),
    };
    let ansi = ansi.unwrap_or(guard.is_none());

    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_writer(writer))
            .init();
    } else {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .with_writer(writer)
                    .with_ansi(ansi),
            )
            .init();
    }

    info!(
        log_format = if json { "json" } else { "text" },
        log_to_file = guard.is_some(),
        "Logging initialized"
    );
    guard
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let _log_guard = init_tracing();

    // Configuration errors are fatal before any network call.
    let server_config = ServerConfig::from_env()?;
    let agent_config = AgentConfig::from_env()?;
    let gateway_config = OpenAIConfig::from_env()?;

    let state = AppState::bootstrap(&server_config, agent_config, gateway_config).await?;
    let app = router(state, &server_config);

    let addr: SocketAddr = format!("{}:{}", server_config.host, server_config.port).parse()?;
    info!(
        max_body_bytes = server_config.max_body_bytes,
        rate_limited = server_config.rate_limit.is_some(),
        "Starting server on {}",
        addr
    );
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %e, "Cannot listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
