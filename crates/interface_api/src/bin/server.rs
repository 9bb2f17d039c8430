//! Ledger API Server Binary
//!
//! This binary starts the HTTP API server for the ledger engine and runs the
//! reconciliation sweep in the background.
//!
//! # Usage
//!
//! ```bash
//! # Run with default configuration
//! cargo run --bin ledger-api
//!
//! # Run with environment variables
//! API_HOST=0.0.0.0 API_PORT=8080 DATABASE_URL=postgres://... cargo run --bin ledger-api
//! ```
//!
//! # Environment Variables
//!
//! * `API_HOST` - Server host (default: 0.0.0.0)
//! * `API_PORT` - Server port (default: 8080)
//! * `API_DATABASE_URL` / `DATABASE_URL` - PostgreSQL connection string
//! * `API_LOG_LEVEL` - Log level: trace, debug, info, warn, error (default: info)
//! * `API_REMOTE_FUNDING__BASE_URL` / `REMOTE_FUNDING_URL` - Remote funding service
//! * `API_REMOTE_FUNDING__API_KEY` / `REMOTE_FUNDING_API_KEY` - Bearer token for it
//! * `API_ENGINE__REMOTE_TIMEOUT_MS`, `API_ENGINE__STALE_THRESHOLD_SECS`,
//!   `API_ENGINE__SWEEP_INTERVAL_SECS` - Engine tuning

use std::net::SocketAddr;
use std::sync::Arc;

use interface_api::{bootstrap, config::ApiConfig, create_router};
use tokio::net::TcpListener;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load .env file if present (useful for local development)
    dotenvy::dotenv().ok();

    let config = load_config();

    init_tracing(&config.log_level);

    tracing::info!(
        host = %config.host,
        port = %config.port,
        "Starting Ledger API Server"
    );

    let engine = Arc::new(bootstrap::build_engine(&config).await?);
    let sweep = bootstrap::spawn_reconciliation(&engine);

    let app = create_router(engine, config.clone());

    let addr: SocketAddr = config.server_addr().parse()?;

    tracing::info!(%addr, "Server listening");

    let listener = TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // Rows the sweep was resolving stay PENDING and are picked up after restart
    sweep.abort();

    tracing::info!("Server shutdown complete");
    Ok(())
}

/// Loads API configuration from `API_*` variables, falling back to
/// individual variables and defaults
fn load_config() -> ApiConfig {
    ApiConfig::from_env().unwrap_or_else(|e| {
        eprintln!("Falling back to individual environment variables: {}", e);
        ApiConfig::from_individual_vars()
    })
}

/// Initializes the tracing subscriber for structured logging.
///
/// `RUST_LOG` wins over the configured level.
fn init_tracing(log_level: &str) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(log_level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_target(true))
        .init();
}

/// Waits for shutdown signal (Ctrl+C or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating graceful shutdown");
        }
        _ = terminate => {
            tracing::info!("Received SIGTERM, initiating graceful shutdown");
        }
    }
}
