//! Curator server binary.

use anyhow::{Context, Result};
use clap::Parser;
use curator_core::config::AppConfig;
use curator_server::{create_router, AppState};
use curator_store::Datastore;
use curator_upstream::UpstreamClient;
use figment::providers::{Env, Format, Toml};
use figment::Figment;
use std::net::SocketAddr;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Curator - a gateway between dataset authors and the upstream catalog
#[derive(Parser, Debug)]
#[command(name = "curatord")]
#[command(version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(
        short,
        long,
        env = "CURATOR_CONFIG",
        default_value = "config/server.toml"
    )]
    config: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            "curator_server=info,curator_sync=info,curator_store=info,tower_http=info".into()
        }))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();
    let config: AppConfig = Figment::new()
        .merge(Toml::file(&args.config))
        .merge(Env::prefixed("CURATOR_").split("__"))
        .extract()
        .context("failed to load configuration")?;

    let store = Datastore::connect(&config.database.url, config.database.max_connections)
        .await
        .context("failed to connect to the datastore")?;
    tracing::info!("datastore connected and migrated");

    let upstream = UpstreamClient::new(&config.upstream).context("failed to build upstream client")?;
    tracing::info!(url = %config.upstream.url, "upstream client ready");

    let bind = config.server.bind.clone();
    let state = AppState::new(config, store, upstream)
        .map_err(|e| anyhow::anyhow!("failed to build application state: {e}"))?;

    let addr: SocketAddr = bind.parse().context("invalid bind address")?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    tracing::info!(%addr, "listening");

    axum::serve(listener, create_router(state))
        .await
        .context("server error")?;
    Ok(())
}
