use anyhow::Context;
use axum::{routing::get, Router};
use clap::Parser;
use data_entry_console::api::SettingsStore;
use data_entry_console::{DataEntryLayer, DatabaseProvider};
use sqlx::postgres::PgPool;
use sqlx::sqlite::SqlitePool;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

mod config;
mod database;

use config::ServerConfig;

/// Serve the data-entry console backend
#[derive(Parser)]
#[command(name = "data-entry-server", version, about, long_about = None)]
struct Cli {
    /// Configuration file (TOML)
    #[arg(long, short, env = "DATA_ENTRY_CONFIG")]
    config: Option<PathBuf>,

    /// Address to listen on, overriding the configuration
    #[arg(long)]
    bind: Option<String>,

    /// Database URL, overriding the configuration
    #[arg(long)]
    database_url: Option<String>,

    /// Mount the unauthenticated debug endpoints
    #[arg(long)]
    debug_endpoints: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let cli = Cli::parse();
    let mut config =
        ServerConfig::load(cli.config.as_deref()).context("Failed to load configuration")?;

    if let Some(bind) = cli.bind {
        config.bind_address = bind;
    }
    if let Some(database_url) = cli.database_url {
        config.database_url = database_url;
    }
    config.debug_endpoints |= cli.debug_endpoints;

    let console = if config.is_postgres() {
        let pool = PgPool::connect(&config.database_url)
            .await
            .context("Failed to connect to PostgreSQL database")?;
        configure(DataEntryLayer::postgres(config.base_path.clone(), pool), &config).into_router()
    } else {
        let pool = SqlitePool::connect(&config.database_url)
            .await
            .context("Failed to connect to SQLite database")?;

        if config.seed_sample_data {
            database::setup(&pool)
                .await
                .context("Failed to set up sample tables")?;
        }
        configure(DataEntryLayer::sqlite(config.base_path.clone(), pool), &config).into_router()
    };

    if config.debug_endpoints {
        tracing::warn!("Debug endpoints are mounted without authentication");
    }

    let app = Router::new()
        .route("/", get(root_handler))
        .merge(console);

    let listener = tokio::net::TcpListener::bind(&config.bind_address)
        .await
        .with_context(|| format!("Failed to bind to {}", config.bind_address))?;

    tracing::info!(
        address = %config.bind_address,
        base_path = %config.base_path,
        "Data entry console backend listening"
    );

    axum::serve(listener, app).await.context("Server error")?;
    Ok(())
}

fn configure<DB: DatabaseProvider>(
    layer: DataEntryLayer<DB>,
    config: &ServerConfig,
) -> DataEntryLayer<DB> {
    layer
        .with_auth(config.auth.clone())
        .with_access_policy(config.access.clone())
        .with_settings(SettingsStore::from_env(config.connection.clone()))
        .with_debug_endpoints(config.debug_endpoints)
}

async fn root_handler() -> &'static str {
    "Data entry console backend"
}
