//! `mestrad` — the Mestra shop-floor tracking server.
//!
//! Usage:
//!   mestrad [--data-dir <dir>] [--sqlite <path>] [--listen <addr>]

use std::path::PathBuf;
use std::sync::Arc;

use axum::routing::get;
use axum::Router;
use clap::Parser;
use tracing::info;

use mestra_core::{Module, ServiceConfig};
use mestra_tracking::dispatcher::TrackingService;
use mestra_tracking::pipeline::StorePipeline;
use mestra_tracking::positions::NoPositionData;
use mestra_tracking::store::TrackingStore;
use mestra_tracking::TrackingModule;

const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Mestra tracking server.
#[derive(Parser, Debug)]
#[command(name = "mestrad", about = "Mestra shop-floor tracking server")]
struct Cli {
    /// Directory holding all persistent data.
    #[arg(long = "data-dir")]
    data_dir: Option<PathBuf>,

    /// SQLite database path (overrides {data-dir}/data.sqlite).
    #[arg(long = "sqlite")]
    sqlite: Option<PathBuf>,

    /// HTTP listen address.
    #[arg(long = "listen", default_value = "0.0.0.0:8080")]
    listen: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let cli = Cli::parse();
    let config = ServiceConfig {
        data_dir: cli.data_dir,
        sqlite_path: cli.sqlite,
        listen: cli.listen,
    };

    if let Some(ref dir) = config.data_dir {
        std::fs::create_dir_all(dir)?;
    }
    let sqlite_path = config.resolve_sqlite_path();

    let sql = Arc::new(
        mestra_sql::SqliteStore::open(&sqlite_path)
            .map_err(|e| anyhow::anyhow!("failed to open SQL store: {}", e))?,
    );
    info!("SQLite store opened at {}", sqlite_path.display());

    let store = TrackingStore::new(sql)
        .map_err(|e| anyhow::anyhow!("failed to initialize tracking store: {}", e))?;
    let service = TrackingService::new(store, Box::new(NoPositionData), Box::new(StorePipeline));
    let module = TrackingModule::new(service);
    info!("Tracking module initialized");

    let app = Router::new()
        .route("/health", get(health))
        .route("/version", get(version))
        .merge(module.routes());

    let listener = tokio::net::TcpListener::bind(&config.listen).await?;
    info!("Mestra server listening on {}", config.listen);
    axum::serve(listener, app).await?;

    Ok(())
}

async fn health() -> &'static str {
    "ok"
}

async fn version() -> axum::Json<serde_json::Value> {
    axum::Json(serde_json::json!({ "version": VERSION }))
}
