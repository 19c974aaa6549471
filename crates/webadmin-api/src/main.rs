//! Webadmin API Server
//!
//! Usage:
//!   webadmin [--port <PORT>] [--verbose] [--config <FILE>] [--database-url <URL>]
//!
//! Author: hephaex@gmail.com

use anyhow::Context;
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;
use webadmin_api::auth::password::PasswordConfig;
use webadmin_api::{create_router, state};
use webadmin_core::config::{AppConfig, LoggingConfig};
use webadmin_core::SqliteCredentialStore;

#[derive(Parser)]
#[command(name = "webadmin")]
#[command(about = "User administration API server")]
#[command(version)]
struct Cli {
    /// Port to listen on (overrides API_PORT / PORT)
    #[arg(long)]
    port: Option<u16>,

    /// Log every request and response
    #[arg(long)]
    verbose: bool,

    /// TOML configuration file
    #[arg(long, short)]
    config: Option<PathBuf>,

    /// SQLite database URL (overrides DATABASE_URL)
    #[arg(long)]
    database_url: Option<String>,
}

fn init_tracing(logging: &LoggingConfig, verbose: bool) {
    let default_filter = if verbose {
        format!("{},tower_http=debug", logging.level)
    } else {
        logging.level.clone()
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    if logging.json_format {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Load configuration
    let mut config = match &cli.config {
        Some(path) => AppConfig::from_file(path)?.with_env_override()?,
        None => AppConfig::from_env()?,
    };
    if let Some(port) = cli.port {
        config.server.port = port;
    }
    if cli.verbose {
        config.server.verbose = true;
    }
    if let Some(url) = cli.database_url {
        config.database.url = url;
    }

    init_tracing(&config.logging, config.server.verbose);

    if config.auth.jwt_secret == webadmin_core::config::BUILD_JWT_SECRET
        && option_env!("WEBADMIN_JWT_SECRET").is_none()
    {
        tracing::warn!("Using the built-in development JWT secret; set JWT_SECRET in production");
    }

    // Open the credential store and make sure an admin exists
    let store = SqliteCredentialStore::connect(&config.database.url, config.database.max_connections)
        .await
        .with_context(|| format!("failed to open database {}", config.database.url))?;
    let password = PasswordConfig::default();
    if state::seed_default_admin(&store, &config, &password).await? {
        tracing::warn!(
            username = %config.auth.default_admin_username,
            "Created default admin account; change its password"
        );
    }

    let addr = format!("{}:{}", config.server.host, config.server.port);

    // Create application state
    let state = Arc::new(state::AppState::with_password_config(
        config,
        Arc::new(store),
        password,
    ));

    // Create router
    let app = create_router(state);

    // Start server
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    tracing::info!("Webadmin API server starting on http://{}", addr);
    tracing::info!("OpenAPI spec at http://{}/api-docs/openapi.json", addr);

    axum::serve(listener, app).await?;

    Ok(())
}
