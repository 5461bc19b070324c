//! cqm-classifier - Coffee bean quality classification service
//!
//! Grades the beans in an uploaded photograph and stores per-bean analyses
//! and batch reports in the root folder's SQLite database.

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use cqm_classifier::services::ServiceContainer;
use cqm_classifier::AppState;
use cqm_common::config::{
    default_config_path, RootFolderInitializer, RootFolderResolver, TomlConfig,
};

const MODULE_NAME: &str = "cqm-classifier";
const DEFAULT_PORT: u16 = 5830;

/// Command-line arguments for cqm-classifier
#[derive(Parser, Debug)]
#[command(name = "cqm-classifier")]
#[command(about = "Coffee bean quality classification service")]
#[command(version)]
struct Args {
    /// Port to listen on (overrides the config file)
    #[arg(short, long, env = "CQM_PORT")]
    port: Option<u16>,

    /// Root folder holding the database
    #[arg(short, long)]
    root_folder: Option<PathBuf>,

    /// Configuration file (default: <config_dir>/cqm/cqm-classifier.toml)
    #[arg(short, long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Config is read before logging starts so its level can seed the filter;
    // the outcome is logged once the subscriber is installed
    let config_path = args
        .config
        .clone()
        .or_else(|| default_config_path(MODULE_NAME));
    let loaded = match &config_path {
        Some(path) => TomlConfig::try_load(path).context("Failed to load configuration")?,
        None => None,
    };
    let config_found = loaded.is_some();
    let mut config = loaded.unwrap_or_default();
    config.apply_env_overrides();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                format!("cqm_classifier={0},cqm_common={0},tower_http=info", config.logging.level)
                    .into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting cqm-classifier (Coffee Quality Classification)");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));
    match &config_path {
        Some(path) if config_found => info!("Loaded configuration from {}", path.display()),
        Some(path) => warn!(
            "Config file not found at {}, using built-in defaults",
            path.display()
        ),
        None => warn!("No configuration directory available, using built-in defaults"),
    }

    // Root folder: CLI > env > TOML > default
    let root_folder = RootFolderResolver::new(MODULE_NAME)
        .with_cli_arg(args.root_folder)
        .with_toml_root(config.root_folder.clone())
        .resolve();

    let initializer = RootFolderInitializer::new(root_folder);
    initializer
        .ensure_directory_exists()
        .context("Failed to initialize root folder")?;

    let db_path = initializer.database_path();
    info!("Database: {}", db_path.display());

    let db_pool = cqm_classifier::db::init_database_pool(&db_path)
        .await
        .context("Failed to open database")?;
    info!("Database connection established");

    let services = ServiceContainer::from_config(&config, db_pool.clone())
        .context("Failed to initialize classification services")?;
    let state = AppState::new(db_pool, Arc::new(services));
    let app = cqm_classifier::build_router(state);

    let port = args.port.or(config.port).unwrap_or(DEFAULT_PORT);
    let listener = tokio::net::TcpListener::bind(("127.0.0.1", port))
        .await
        .with_context(|| format!("Failed to bind to port {}", port))?;
    info!("Listening on http://127.0.0.1:{}", port);
    info!("Health check: http://127.0.0.1:{}/health", port);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("Server shutdown complete");
    Ok(())
}

/// Resolves on Ctrl+C or SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, shutting down"),
        _ = terminate => info!("Received terminate signal, shutting down"),
    }
}
