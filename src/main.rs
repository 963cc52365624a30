//! `repo-ingest` command line
//!
//! ```bash
//! # Full ingestion of a public repository
//! repo-ingest ingest https://github.com/acme/widgets --branch main
//!
//! # Incremental ingestion from a local checkout, without touching LanceDB
//! repo-ingest ingest acme/widgets --since 4f2a9c1 --local ./widgets --dry-run
//!
//! # Print the effective configuration
//! repo-ingest show-config
//! ```

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use repo_ingest::client::TracingObserver;
use repo_ingest::embedding::HashEmbedder;
use repo_ingest::vector_db::InMemoryIndex;
use repo_ingest::{Config, IngestClient, IngestRequest};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

const LONG_VERSION: &str = concat!(
    env!("CARGO_PKG_VERSION"),
    " (",
    env!("GIT_COMMIT_HASH"),
    ", built ",
    env!("BUILD_TIMESTAMP"),
    ")"
);

/// Ingest a repository branch into a namespaced vector index
#[derive(Parser)]
#[command(name = "repo-ingest", version, long_version = LONG_VERSION)]
struct Cli {
    /// Path to a TOML configuration file (defaults to the platform config dir)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Detect changes, load, chunk and store one repository branch
    Ingest {
        /// Repository URL or `owner/repo`
        repo_url: String,

        #[arg(long, default_value = "main")]
        branch: String,

        /// Commit of the previous ingestion; omit for a full load
        #[arg(long)]
        since: Option<String>,

        /// Read files and history from this checkout instead of the API
        #[arg(long)]
        local: Option<PathBuf>,

        /// API token (overrides the configuration file)
        #[arg(long, env = "REPO_INGEST_TOKEN", hide_env_values = true)]
        token: Option<String>,

        /// Keep everything in memory and embed with feature hashing
        #[arg(long)]
        dry_run: bool,
    },

    /// Print the effective configuration as TOML
    ShowConfig,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let mut config = load_config(cli.config.as_ref())?;

    match cli.command {
        Commands::Ingest {
            repo_url,
            branch,
            since,
            local,
            token,
            dry_run,
        } => {
            if token.is_some() {
                config.source_host.token = token;
            }

            let client = if dry_run {
                tracing::info!("Dry run: using an in-memory index");
                IngestClient::with_components(
                    config,
                    Arc::new(InMemoryIndex::new()),
                    Arc::new(HashEmbedder::new(384)),
                )
            } else {
                IngestClient::with_config(config).await?
            };

            let request = IngestRequest {
                repo_url,
                branch,
                since_commit: since,
                local_path: local.map(|p| p.to_string_lossy().into_owned()),
            };
            let response = client
                .ingest_with_observer(request, &TracingObserver)
                .await?;
            println!("{}", serde_json::to_string_pretty(&response)?);
        }
        Commands::ShowConfig => {
            println!(
                "{}",
                toml::to_string_pretty(&config).context("Failed to serialize configuration")?
            );
        }
    }

    Ok(())
}

/// File (explicit or default location), then environment overrides
fn load_config(path: Option<&PathBuf>) -> Result<Config> {
    let config = match path {
        Some(path) => {
            let mut config = Config::from_file(path)?;
            config.apply_env_overrides();
            config.validate()?;
            config
        }
        None => Config::new()?,
    };
    Ok(config)
}
