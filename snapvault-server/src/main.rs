//! snapvault-server - photo gallery API
//!
//! Serves the authenticated gallery, AI analysis and media routes.

use std::path::PathBuf;

use anyhow::{Context, Result};
use aws_config::{BehaviorVersion, Region};
use clap::Parser;
use tokio::signal;
use tracing::{error, info, warn};

use snapvault_common::config::Settings;
use snapvault_server::ai::bedrock::BedrockClient;
use snapvault_server::ai::AnalysisPipeline;
use snapvault_server::api::Diagnostics;
use snapvault_server::storage::MediaStore;
use snapvault_server::{build_router, db, AppState};

const DEFAULT_AWS_REGION: &str = "us-east-1";

/// Command-line arguments for snapvault-server
#[derive(Parser, Debug)]
#[command(name = "snapvault-server")]
#[command(about = "Photo gallery API with AI tagging")]
#[command(version)]
struct Args {
    /// TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Address to listen on (overrides configuration)
    #[arg(short, long)]
    bind: Option<String>,

    /// SQLite database file (overrides configuration)
    #[arg(short, long)]
    database: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    info!(
        "Starting snapvault-server v{} [{}] built {} ({})",
        env!("CARGO_PKG_VERSION"),
        env!("GIT_HASH"),
        env!("BUILD_TIMESTAMP"),
        env!("BUILD_PROFILE")
    );

    let args = Args::parse();

    let mut settings =
        Settings::load(args.config.as_deref()).context("Failed to load configuration")?;
    if let Some(bind) = args.bind {
        settings.server.bind_addr = bind;
    }
    if let Some(database) = args.database {
        settings.server.database = database;
    }

    let region = settings
        .analysis
        .aws_region
        .clone()
        .unwrap_or_else(|| DEFAULT_AWS_REGION.to_string());
    let aws = aws_config::defaults(BehaviorVersion::latest())
        .region(Region::new(region))
        .load()
        .await;

    let pipeline = AnalysisPipeline::from_settings(&settings, &aws)
        .context("Failed to build analysis pipeline")?;

    info!("Database: {}", settings.server.database.display());
    let db_pool = db::init_database_pool(&settings.server.database)
        .await
        .context("Failed to open database")?;
    info!("Database connection established");

    let bind_addr = settings.server.bind_addr.clone();
    let media = match &settings.server.media_dir {
        Some(dir) => {
            let store = MediaStore::new(
                dir.clone(),
                &settings.server.public_base_url,
                settings.server.max_upload_bytes,
            )
            .with_context(|| format!("Failed to open media directory {}", dir.display()))?;
            info!("Media directory: {}", dir.display());
            Some(store)
        }
        None => {
            warn!("No media directory configured; uploads disabled");
            None
        }
    };

    let diagnostics = if settings.diagnostics_enabled() {
        let bedrock = BedrockClient::new(&aws);
        Some(Diagnostics::new(&settings, Some(bedrock)).context("Failed to build diagnostics")?)
    } else {
        None
    };

    let mut state = AppState::new(db_pool, settings, pipeline);
    if let Some(media) = media {
        state = state.with_media(media);
    }
    if let Some(diagnostics) = diagnostics {
        info!("Diagnostic routes enabled");
        state = state.with_diagnostics(diagnostics);
    }

    let app = build_router(state);

    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("Failed to bind to {}", bind_addr))?;
    info!("Listening on http://{}", bind_addr);
    info!("Health check: http://{}/health", bind_addr);

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
            error!("Failed to listen for Ctrl+C: {}", e);
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
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received");
}
