use api_rest::{router, AppState};
use pretriage_core::CoreConfig;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Main entry point for the pre-triage service
///
/// Resolves configuration once, creates the data directory if needed and serves the REST API.
///
/// # Environment Variables
/// - `PRETRIAGE_REST_ADDR`: REST server address (default: "0.0.0.0:3000")
/// - `PRETRIAGE_DATA_DIR`: Directory for the record and user tables (default: "pretriage_data")
/// - `PRETRIAGE_OP_TIMEOUT_SECS`: Bound on a single fetch or write (default: 5)
/// - `PRETRIAGE_PRIORITY_SCALE`: `four-level` or `three-level` (default: three-level)
/// - `PRETRIAGE_STATUS_FLOW`: `two-state` or `three-state` (default: three-state)
///
/// # Returns
/// * `Ok(())` - If the server starts and runs successfully
/// * `Err(anyhow::Error)` - If configuration, startup or the server fails
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("pretriage_run=info".parse()?)
                .add_directive("pretriage_core=info".parse()?)
                .add_directive("api_rest=info".parse()?),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let rest_addr =
        std::env::var("PRETRIAGE_REST_ADDR").unwrap_or_else(|_| "0.0.0.0:3000".into());

    let cfg = Arc::new(CoreConfig::from_env_values(
        std::env::var("PRETRIAGE_DATA_DIR").ok(),
        std::env::var("PRETRIAGE_POLL_INTERVAL_SECS").ok(),
        std::env::var("PRETRIAGE_OP_TIMEOUT_SECS").ok(),
        std::env::var("PRETRIAGE_PRIORITY_SCALE").ok(),
        std::env::var("PRETRIAGE_STATUS_FLOW").ok(),
    )?);
    std::fs::create_dir_all(cfg.data_dir())?;

    let vocabulary = cfg.vocabulary();
    tracing::info!(
        data_dir = %cfg.data_dir().display(),
        priority_scale = %vocabulary.priority_scale,
        status_flow = %vocabulary.status_flow,
        "++ Starting pre-triage REST on {}",
        rest_addr
    );

    let app = router(AppState::from_config(cfg)?);
    let listener = tokio::net::TcpListener::bind(&rest_addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
