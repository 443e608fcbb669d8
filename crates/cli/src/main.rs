//! Administrative CLI for Curator.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use curator_core::config::AppConfig;
use curator_core::{RecordId, User};
use curator_store::Datastore;
use curator_sync::SyncService;
use curator_upstream::UpstreamClient;
use figment::providers::{Env, Format, Toml};
use figment::Figment;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "curatorctl")]
#[command(about = "Administrative CLI for the Curator dataset gateway")]
#[command(version)]
struct Cli {
    /// Path to configuration file
    #[arg(
        short,
        long,
        env = "CURATOR_CONFIG",
        default_value = "config/server.toml"
    )]
    config: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Publish a local record upstream
    Publish {
        /// Record id (32 hex characters)
        id: String,

        /// Owner uid of the record
        #[arg(long)]
        owner: String,

        /// External identity stamped into the provenance fields
        #[arg(long, default_value = "")]
        identity: String,

        /// Comma-separated project list scoping the write
        #[arg(long, default_value = "")]
        projects: String,
    },

    /// Sync a user's records from the upstream
    Sync {
        /// Owner uid to sync
        #[arg(long)]
        owner: String,

        /// External identity to query by, instead of the owner id
        #[arg(long, default_value = "")]
        identity: String,

        /// Ignore the last sync time and read everything
        #[arg(long)]
        all: bool,
    },
}

async fn service(config_path: &str) -> Result<SyncService> {
    let config: AppConfig = Figment::new()
        .merge(Toml::file(config_path))
        .merge(Env::prefixed("CURATOR_").split("__"))
        .extract()
        .context("failed to load configuration")?;

    let store = Datastore::connect(&config.database.url, config.database.max_connections)
        .await
        .context("failed to connect to the datastore")?;
    let upstream = UpstreamClient::new(&config.upstream).context("failed to build upstream client")?;
    Ok(SyncService::new(upstream, store))
}

fn user_from_flags(owner: &str, identity: &str, projects: &str) -> Result<User> {
    let uid = RecordId::parse(owner).context("invalid owner id")?;
    Ok(User {
        uid,
        identity: identity.to_string(),
        name: String::new(),
        email: String::new(),
        organisation: String::new(),
        projects: projects
            .split(',')
            .filter(|p| !p.is_empty())
            .map(str::to_string)
            .collect(),
    })
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "curator_sync=info,curator_cli=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Publish {
            id,
            owner,
            identity,
            projects,
        } => {
            let id = RecordId::parse(&id).context("invalid record id")?;
            let owner = user_from_flags(&owner, &identity, &projects)?;
            let sync = service(&cli.config).await?;

            let outcome = sync.publish(id, &owner).await.context("publish failed")?;
            println!("published: {}", outcome.upstream_id);
            if let Some(new_upstream_id) = outcome.new_upstream_id {
                println!("new version: {new_upstream_id}");
            }
            if let Some(new_record_id) = outcome.new_record_id {
                println!("new record: {new_record_id}");
            }
        }
        Commands::Sync {
            owner,
            identity,
            all,
        } => {
            let uid = RecordId::parse(&owner).context("invalid owner id")?;
            let sync = service(&cli.config).await?;

            let stats = if all {
                sync.fetch_all(uid, &identity).await.context("sync failed")?
            } else {
                sync.fetch(uid, &identity).await.context("sync failed")?
            };
            println!(
                "read {} written {} deleted {} skipped {} failed {}",
                stats.read, stats.written, stats.deleted, stats.skipped, stats.failed
            );
        }
    }

    Ok(())
}
