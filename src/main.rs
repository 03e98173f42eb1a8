use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use thumber::{
    config::{Config, duration_serde},
    services::CacheMaintenance,
    storage::FileStore,
    web::{AppState, WebServer},
};

#[derive(Parser)]
#[command(name = "thumber")]
#[command(version)]
#[command(about = "Thumbnail server with per-client rate limiting and render caching")]
#[command(long_about = None)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, default_value = "config.toml")]
    config: String,

    /// Listening IP address
    #[arg(short = 'H', long, value_name = "IP")]
    host: Option<String>,

    /// Listening port
    #[arg(short, long, value_name = "PORT")]
    port: Option<u16>,

    /// Directory holding uploaded originals
    #[arg(short, long, value_name = "DIR")]
    uploads: Option<PathBuf>,

    /// Requests processed at the same time
    #[arg(long, value_name = "N")]
    max_concurrent: Option<usize>,

    /// Length of generated identifiers
    #[arg(long, value_name = "N")]
    id_length: Option<usize>,

    /// Interval between full cache resets, e.g. "3m" ("0" disables)
    #[arg(long, value_name = "DURATION", value_parser = duration_serde::parse)]
    reset_interval: Option<std::time::Duration>,

    /// Disable rate limiting
    #[arg(long)]
    swamped: bool,

    /// Log level
    #[arg(short = 'v', long, default_value = "info")]
    log_level: String,

    /// Also write logs to this file
    #[arg(long, value_name = "FILE")]
    log_file: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_logging(&cli)?;
    info!("Starting Thumber v{}", env!("CARGO_PKG_VERSION"));

    let mut config = Config::load_from_file(&cli.config)
        .with_context(|| format!("Failed to load configuration from {}", cli.config))?;
    info!("Configuration loaded from: {}", cli.config);

    apply_overrides(&mut config, &cli);
    config.validate()?;

    if !config.limits.rate_limiting {
        warn!("Rate limiting disabled");
    }

    let store = FileStore::new(&config.storage.uploads_path, config.storage.permissions);
    store.ensure_root().await.with_context(|| {
        format!(
            "Cannot prepare uploads directory {}",
            config.storage.uploads_path.display()
        )
    })?;
    info!(path = %store.root().display(), "Uploads directory ready");

    let maintenance_config = config.cache.clone();
    let state = AppState::from_config(config, Arc::new(store))?;

    let maintenance =
        CacheMaintenance::from_config(state.thumbnails.cache().clone(), &maintenance_config);
    tokio::spawn(maintenance.start());

    let server = WebServer::new(state)?;
    if let Err(e) = server.serve().await {
        error!("Web server failed: {:#}", e);
        return Err(e);
    }

    Ok(())
}

fn init_logging(cli: &Cli) -> Result<()> {
    let log_filter = format!("thumber={}", cli.log_level);

    let file_layer = match &cli.log_file {
        Some(path) => {
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("Cannot open log file {}", path.display()))?;
            Some(
                tracing_subscriber::fmt::layer()
                    .with_ansi(false)
                    .with_writer(Arc::new(file)),
            )
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| log_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .with(file_layer)
        .init();

    Ok(())
}

fn apply_overrides(config: &mut Config, cli: &Cli) {
    if let Some(host) = &cli.host {
        config.web.host = host.clone();
    }
    if let Some(port) = cli.port {
        config.web.port = port;
    }
    if let Some(uploads) = &cli.uploads {
        config.storage.uploads_path = uploads.clone();
    }
    if let Some(max_concurrent) = cli.max_concurrent {
        config.limits.max_concurrent = max_concurrent;
    }
    if let Some(id_length) = cli.id_length {
        config.storage.id_length = id_length;
    }
    if let Some(reset_interval) = cli.reset_interval {
        config.cache.reset_interval = reset_interval;
    }
    if cli.swamped {
        config.limits.rate_limiting = false;
    }
}
