//! Real-time hold'em game server.
//!
//! Spawns one session actor per table (via the core registry), exposes
//! the WebSocket client gateway and the administrative HTTP endpoints,
//! and persists live hand state to the shared blob cache.

mod api;
mod config;
mod logging;
mod metrics;

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Error;
use ctrlc::set_handler;
use pico_args::Arguments;

use holdem_core::cache::{HandStore, MemoryHandStore, PgHandStore};
use holdem_core::directory::{DirectoryClient, ServiceMode};
use holdem_core::TableRegistry;

use api::connections::ConnectionRegistry;
use config::ServerConfig;

const HELP: &str = "\
Run the real-time hold'em game server

USAGE:
  holdem_server [OPTIONS]

OPTIONS:
  --bind           IP:PORT   Bind address            [default: 0.0.0.0:LISTEN_PORT]
  --directory-url  URL       Directory service URL   [default: env DIRECTORY_URL]
  --mode           MODE      prod or test            [default: env MODE or prod]

FLAGS:
  -h, --help                 Print help information

ENVIRONMENT:
  LISTEN_PORT                HTTP/WebSocket port (default 3000)
  CACHE_HOST / CACHE_PORT / CACHE_DB / CACHE_USER / CACHE_PASSWORD
                             Blob cache connection target
  DIRECTORY_URL              Directory service base URL
  RECONNECT_GRACE_MS         Reconnect window (default 60000)
  DEFAULT_ACTION_TIMEOUT_SEC Per-action timeout (default 30)
  AUTH_TOKEN_SECRET          Local token secret (required in test mode)
  MODE                       prod or test
  METRICS_BIND               Prometheus exporter address (default 127.0.0.1:9090)
";

#[tokio::main]
async fn main() -> Result<(), Error> {
    // Load .env if present; existing environment variables win.
    let _ = dotenvy::dotenv();

    let mut pargs = Arguments::from_env();
    if pargs.contains(["-h", "--help"]) {
        print!("{HELP}");
        std::process::exit(0);
    }

    let bind_override: Option<SocketAddr> = pargs.opt_value_from_str("--bind")?;
    let directory_override: Option<String> = pargs.opt_value_from_str("--directory-url")?;
    let mode_override: Option<ServiceMode> = pargs.opt_value_from_str("--mode")?;

    set_handler(|| std::process::exit(0))?;

    logging::init();

    let config = ServerConfig::from_env(bind_override, directory_override, mode_override)
        .map_err(|e| anyhow::anyhow!("Configuration error: {e}"))?;
    config
        .validate()
        .map_err(|e| anyhow::anyhow!("Configuration validation failed: {e}"))?;
    tracing::info!("Configuration loaded (mode: {:?})", config.mode);

    if let Err(e) = metrics::init_metrics(config.metrics_bind) {
        tracing::warn!("Failed to initialize metrics: {e}. Metrics will not be available.");
    } else {
        tracing::info!(
            "Metrics endpoint available at http://{}/metrics",
            config.metrics_bind
        );
    }

    // The blob cache holds serialized hand state between transitions.
    let store: Arc<dyn HandStore> = match config.mode {
        ServiceMode::Test => {
            tracing::info!("Test mode: using in-memory hand store");
            Arc::new(MemoryHandStore::default())
        }
        ServiceMode::Prod => {
            tracing::info!("Connecting to cache at {}:{}", config.cache.host, config.cache.port);
            Arc::new(
                PgHandStore::connect(&config.cache.url())
                    .await
                    .map_err(|e| anyhow::anyhow!("Failed to connect to cache: {e}"))?,
            )
        }
    };

    let directory = Arc::new(DirectoryClient::new(
        config.directory_url.clone(),
        config.mode,
        config.auth_token_secret.clone(),
    ));
    let registry = TableRegistry::new(store, directory.clone());

    let state = api::AppState {
        registry,
        directory,
        connections: Arc::new(ConnectionRegistry::default()),
        default_action_timeout_secs: config.default_action_timeout_secs,
        reconnect_grace_ms: config.reconnect_grace_ms,
    };
    let app = api::create_router(state);

    tracing::info!("Starting HTTP/WebSocket server on {}", config.bind);
    let listener = tokio::net::TcpListener::bind(config.bind)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to bind to {}: {e}", config.bind))?;

    tracing::info!(
        "Server is running at http://{}. Press Ctrl+C to stop.",
        config.bind
    );
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|e| anyhow::anyhow!("Server error: {e}"))?;

    tracing::info!("Shutting down server...");
    Ok(())
}

/// Graceful shutdown signal.
async fn shutdown_signal() {
    tokio::signal::ctrl_c()
        .await
        .expect("Failed to install CTRL+C signal handler");
}
