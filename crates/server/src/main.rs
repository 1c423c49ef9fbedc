use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tokio::net::TcpListener;
use tracing::{info, warn};

use flightdeck_server::{flight, AppState};
use flightdeck_storage::StorageEngine;

/// Serve datasets and query results over Arrow Flight.
#[derive(Parser, Debug)]
#[command(name = "flightdeck-server", version, about)]
struct Cli {
    /// Config profile; keys are read as `{PROFILE}_{KEY}` before `{KEY}`.
    #[arg(long, env = "FLIGHTDECK_PROFILE")]
    profile: Option<String>,

    /// Interface to bind (overrides HOST).
    #[arg(long)]
    host: Option<String>,

    /// Port to bind (overrides PORT).
    #[arg(long)]
    port: Option<u16>,

    /// Storage backend: `sql` or `memory` (overrides BACKEND).
    #[arg(long)]
    backend: Option<String>,

    /// Directory scanned for sample CSV files (overrides DATA_DIR).
    #[arg(long)]
    data_dir: Option<PathBuf>,

    /// Start with no datasets loaded.
    #[arg(long)]
    no_sample_data: bool,
}

fn load_config(cli: &Cli) -> flightdeck_core::Config {
    flightdeck_core::config::load_dotenv();
    let mut config = match &cli.profile {
        Some(profile) => flightdeck_core::Config::for_profile(profile),
        None => flightdeck_core::Config::from_env(),
    };

    if let Some(host) = &cli.host {
        config.server.host = host.clone();
    }
    if let Some(port) = cli.port {
        config.server.port = port;
    }
    if let Some(backend) = &cli.backend {
        config.storage.backend = backend.clone();
    }
    if let Some(dir) = &cli.data_dir {
        config.storage.data_dir = dir.clone();
    }
    if cli.no_sample_data {
        config.storage.load_sample_data = false;
    }
    config
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for ctrl-c: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown requested");
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let cli = Cli::parse();
    let config = load_config(&cli);
    config.log_summary();

    let storage = StorageEngine::from_config(&config.storage)?;
    if config.storage.load_sample_data {
        let loaded = storage
            .load_sample_data()
            .await
            .context("loading sample data")?;
        info!("Loaded {} sample datasets", loaded);
    }

    let state = Arc::new(AppState::from_config(storage.backend.clone(), &config.server));
    flight::log_startup(&state).await;

    let addr = config.server.bind_addr();
    let listener = TcpListener::bind(addr.as_str())
        .await
        .with_context(|| format!("binding {addr}"))?;
    info!("Flight server listening on {} (advertised as {})", addr, config.server.location());

    flightdeck_server::serve(state, listener, shutdown_signal()).await?;
    info!("Server stopped");
    Ok(())
}
