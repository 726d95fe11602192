use std::{net::SocketAddr, path::PathBuf};

use anyhow::{Context, Result};
use clap::Parser;
use tokio::signal;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;
use vidshare::{
    api::{self, AppState},
    config::{DEFAULT_CONFIG_PATH, Overrides, load_runtime_config_from},
    security::{TokenSigner, ensure_not_root},
    store::DocumentStore,
};

#[derive(Parser, Debug)]
#[command(author, version, about = "Serve the vidshare HTTP API")]
struct Cli {
    /// Env file to read settings from
    #[arg(long, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Address to bind, overriding VIDSHARE_HOST
    #[arg(long)]
    host: Option<String>,

    /// Port to bind, overriding VIDSHARE_PORT
    #[arg(long)]
    port: Option<u16>,

    /// SQLite database file, overriding DATABASE_PATH
    #[arg(long)]
    database: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    ensure_not_root("backend")?;
    let cli = Cli::parse();

    let config = load_runtime_config_from(
        &cli.config,
        Overrides {
            host: cli.host,
            port: cli.port,
            database_path: cli.database,
        },
    )
    .with_context(|| format!("loading configuration from {}", cli.config.display()))?;

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.log_filter))
        .context("parsing log filter")?;
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let database_path = config.database_path.clone();
    let store = tokio::task::spawn_blocking(move || DocumentStore::open(database_path))
        .await
        .context("joining store initialization")?
        .context("opening document store")?;
    info!(path = %store.path().display(), "document store opened");

    let tokens = TokenSigner::new(&config.access_token_secret, config.access_token_ttl_secs);
    let cors = api::cors_layer(config.cors_origin.as_deref())?;
    let app = api::router(AppState::new(store, tokens), cors);

    let addr = SocketAddr::new(
        config
            .host
            .parse()
            .with_context(|| format!("parsing host {}", config.host))?,
        config.port,
    );
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("binding to {}", addr))?;
    info!("API server listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("running API server")?;
    info!("API server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = signal::ctrl_c().await {
        error!(%err, "failed to install Ctrl+C handler");
    }
}
