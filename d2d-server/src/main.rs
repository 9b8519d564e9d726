//! d2d-server - door2door collection service
//!
//! Accepts bin photo submissions from field staff, labels them with the
//! configured classifiers, and serves the review dashboard.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use d2d_common::config::{self, ServiceConfig};
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use d2d_server::services::{self, CloudinaryStore, Ingestor, LabelAggregator};
use d2d_server::{build_router, AppState};

/// Command-line arguments for d2d-server
#[derive(Parser, Debug)]
#[command(name = "d2d-server")]
#[command(about = "door2door collection intake and dashboard service")]
#[command(version)]
struct Args {
    /// TOML configuration file
    #[arg(short, long, env = "D2D_CONFIG")]
    config: Option<PathBuf>,

    /// Folder holding the database (overrides config and D2D_ROOT_FOLDER)
    #[arg(short, long)]
    root_folder: Option<PathBuf>,

    /// Listen address, e.g. 0.0.0.0:5730 (overrides config and D2D_BIND_ADDR)
    #[arg(short, long)]
    bind: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Config comes first so its log level can seed the filter. Anything the
    // loader logs at this point is dropped, so the outcome is reported below.
    let config_path = args.config.clone().unwrap_or_else(config::default_config_path);
    let mut config = ServiceConfig::load_from_file(&config_path)
        .with_context(|| format!("Failed to load {}", config_path.display()))?;
    config
        .apply_env_overrides()
        .context("Invalid environment override")?;
    if let Some(root) = args.root_folder {
        config.root_folder = Some(root);
    }
    if let Some(bind) = args.bind {
        config.bind_addr = bind;
    }

    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(format!("{},tower_http=info", config.logging.level))),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!(
        "Starting door2door server (d2d-server) v{} [{}] built {} ({})",
        env!("CARGO_PKG_VERSION"),
        env!("D2D_GIT_HASH"),
        env!("D2D_BUILD_TIMESTAMP"),
        env!("D2D_BUILD_PROFILE")
    );
    if config_path.exists() {
        info!("Loaded configuration from {}", config_path.display());
    } else {
        warn!(
            "Config file not found at {}; running on defaults plus environment overrides",
            config_path.display()
        );
    }

    config.validate().context("Configuration incomplete")?;

    let root = config.ensure_root_folder_exists()?;
    info!("Root folder: {}", root.display());

    let db_path = config.database_path();
    info!("Database: {}", db_path.display());
    let pool = d2d_common::db::init_database_pool(&db_path)
        .await
        .context("Failed to open database")?;
    info!("✓ Database connection established");

    let media_store = CloudinaryStore::new(
        config.media_host.clone(),
        Duration::from_secs(config.media_host.timeout_secs),
    )
    .context("Failed to create media host client")?;
    let classifiers = services::build_classifiers(&config.classifier)
        .context("Failed to create classifier clients")?;
    info!(
        models = ?config.classifier.models.iter().map(|m| m.id.as_str()).collect::<Vec<_>>(),
        "✓ {} classifier(s) configured",
        classifiers.len()
    );

    let ingestor = Ingestor::new(
        Arc::new(media_store),
        Arc::new(LabelAggregator::new(classifiers)),
    );
    let state = AppState::new(pool, Arc::new(ingestor), config.max_upload_bytes);
    let app = build_router(state);

    let listener = tokio::net::TcpListener::bind(&config.bind_addr)
        .await
        .with_context(|| format!("Failed to bind to {}", config.bind_addr))?;
    info!("d2d-server listening on http://{}", config.bind_addr);
    info!("Health check: http://{}/health", config.bind_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("Server shutdown complete");
    Ok(())
}

/// Graceful shutdown signal handler
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
            Ok(mut stream) => {
                stream.recv().await;
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
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down");
        },
        _ = terminate => {
            info!("Received terminate signal, shutting down");
        },
    }
}
