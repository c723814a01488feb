//! Stumps server
//!
//! # Usage
//!
//! ```bash
//! # Serve every stored instance from ./data
//! stumps-server
//!
//! # Use a configuration file
//! stumps-server --config stumps.yaml
//! ```

use anyhow::Context;
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use stumps_server::config::Config;
use stumps_server::host::{DataAccess, HostSettings, JsonFileDataAccess, StumpsHost};
use tracing::{error, info};

#[derive(Parser, Debug)]
#[command(name = "stumps-server")]
#[command(author, version, about = "HTTP mock server and recording proxy")]
struct Args {
    /// YAML configuration file
    #[arg(short, long, env = "STUMPS_CONFIG")]
    config: Option<PathBuf>,

    /// Storage directory, overrides the configuration file
    #[arg(short, long, env = "STUMPS_STORAGE_PATH")]
    storage_path: Option<PathBuf>,

    /// Log filter used when RUST_LOG is not set
    #[arg(long, default_value = "info", env = "STUMPS_LOG_LEVEL")]
    log_level: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&args.log_level)),
        )
        .init();

    let mut config = match args.config {
        Some(ref path) => Config::from_file(path)
            .with_context(|| format!("Failed to load configuration from {}", path.display()))?,
        None => Config::default(),
    };
    if let Some(storage_path) = args.storage_path {
        config.storage_path = storage_path;
    }
    config.validate()?;

    stumps_server::proxy::install_crypto_provider();

    info!("Using storage at {}", config.storage_path.display());
    let data_access: Arc<dyn DataAccess> =
        Arc::new(JsonFileDataAccess::new(config.storage_path.clone()));
    let host = StumpsHost::new(data_access, HostSettings::from(&config));

    host.load().context("Failed to load stored servers")?;
    if let Err(e) = host.start_all().await {
        error!("Not every server could be started: {e}");
    }
    for instance in host.find_all() {
        info!(
            "Server {} on port {} -> {} ({})",
            instance.server_id(),
            instance.port(),
            instance.remote_server_host_name(),
            if instance.is_running() { "running" } else { "stopped" }
        );
    }

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for shutdown signal")?;
    info!("Shutting down");
    host.shutdown_all().await;
    Ok(())
}
