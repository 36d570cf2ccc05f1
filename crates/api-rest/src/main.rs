//! Standalone REST API server binary.
//!
//! ## Purpose
//! Runs the REST API server on its own.
//!
//! ## Intended use
//! Useful for development and debugging. The workspace's main `pretriage-run` binary also
//! prepares the data directory before serving.

use api_rest::{router, AppState};
use pretriage_core::CoreConfig;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Main entry point for the pre-triage REST API server
///
/// # Environment Variables
/// - `PRETRIAGE_REST_ADDR`: Server address (default: "0.0.0.0:3000")
/// - `PRETRIAGE_DATA_DIR`: Directory holding `records.json` and `users.json`
/// - `PRETRIAGE_OP_TIMEOUT_SECS`, `PRETRIAGE_PRIORITY_SCALE`, `PRETRIAGE_STATUS_FLOW`
///
/// # Errors
/// Returns an error if:
/// - the logging/tracing configuration cannot be initialised,
/// - the configuration or the data tables are invalid,
/// - the server address cannot be bound, or
/// - the HTTP server fails while running.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("api_rest=info".parse()?)
                .add_directive("pretriage_core=info".parse()?),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let addr = std::env::var("PRETRIAGE_REST_ADDR").unwrap_or_else(|_| "0.0.0.0:3000".into());

    let cfg = Arc::new(CoreConfig::from_env_values(
        std::env::var("PRETRIAGE_DATA_DIR").ok(),
        std::env::var("PRETRIAGE_POLL_INTERVAL_SECS").ok(),
        std::env::var("PRETRIAGE_OP_TIMEOUT_SECS").ok(),
        std::env::var("PRETRIAGE_PRIORITY_SCALE").ok(),
        std::env::var("PRETRIAGE_STATUS_FLOW").ok(),
    )?);
    if !cfg.data_dir().exists() {
        anyhow::bail!(
            "Data directory does not exist: {}",
            cfg.data_dir().display()
        );
    }

    tracing::info!("-- Starting pre-triage REST API on {}", addr);
    let app = router(AppState::from_config(cfg)?);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
