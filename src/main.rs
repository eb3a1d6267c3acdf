//! Treatment tracker - patient treatment paths that unlock step by step

use clap::Parser;
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use treatment_tracker::{config::Args, db::TrackerDb, server, server::AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file if present
    let _ = dotenvy::dotenv();

    // Parse command line arguments
    let args = Args::parse();

    // Initialize tracing/logging
    let log_level = args.log_level.clone();
    let json = args.json_logs();
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("treatment_tracker={},info", log_level).into()),
        )
        .with(json.then(|| tracing_subscriber::fmt::layer().json()))
        .with((!json).then(tracing_subscriber::fmt::layer))
        .init();

    // Validate configuration
    if let Err(e) = args.validate() {
        error!("Configuration error: {}", e);
        std::process::exit(1);
    }

    // Print startup banner
    info!("======================================");
    info!("  Treatment Tracker");
    info!("======================================");
    info!("Version: {} ({})", env!("CARGO_PKG_VERSION"), option_env!("GIT_COMMIT_SHORT").unwrap_or("unknown"));
    info!("Listen: {}", args.listen);
    info!("Mode: {}", if args.dev_mode { "DEVELOPMENT" } else { "PRODUCTION" });
    info!("Database: {}", args.database_path.display());
    info!("Session max age: {}s", args.session_max_age_seconds);
    info!("======================================");

    let db = Arc::new(TrackerDb::open(&args.database_path)?);
    let stats = db.stats()?;
    info!(
        users = stats.user_count,
        nodes = stats.node_count,
        edges = stats.edge_count,
        "Database ready"
    );
    if stats.node_count == 0 {
        warn!("Treatment tree is empty - load one through POST /api/admin/tree/save");
    }

    let state = Arc::new(AppState::new(args, db)?);

    // Create or refresh the configured administrator
    if let Some((email, password)) = state.args.admin_credentials() {
        state
            .services
            .patients
            .bootstrap_admin(email, &state.args.admin_name, password)?;
    }

    server::run(state).await?;
    Ok(())
}
