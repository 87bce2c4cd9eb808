//! Observation inventory service.
//!
//! Walks the configured HPSS tarball sources day by day with:
//! - One `htar -tvf` inspection per source per round
//! - Retry of transient archive failures on later rounds
//! - Inventory records and command telemetry persisted to SQLite
//! - Optional Prometheus metrics endpoint

mod htar;
mod store;

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::Parser;
use obs_inventory::{InventoryError, InventorySink, MemorySink, ObservationsConfig, SearchEngine};
use tracing::{error, info, warn, Level};
use tracing_subscriber::FmtSubscriber;

use htar::HtarTransport;
use store::SqliteInventoryStore;

#[derive(Parser, Debug)]
#[command(name = "obs-inventory")]
#[command(about = "Inventory observation tarballs on the HPSS archive")]
struct Args {
    /// Inventory configuration file
    #[arg(short, long, env = "INVENTORY_CONFIG", default_value = "config/inventory.yaml")]
    config: PathBuf,

    /// Only search these source keys (default: all enabled)
    #[arg(short, long)]
    source: Vec<String>,

    /// Directory for the inventory database
    #[arg(long, env = "STATE_DIR", default_value = "/data/obs-inventory")]
    state_dir: PathBuf,

    /// Override engine.max_concurrent from the config file
    #[arg(long)]
    max_concurrent: Option<usize>,

    /// Keep results in memory instead of writing the database
    #[arg(long)]
    dry_run: bool,

    /// Log level
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Serve Prometheus metrics on this port
    #[arg(long, env = "METRICS_PORT")]
    metrics_port: Option<u16>,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment from .env file if present
    dotenvy::dotenv().ok();

    let args = Args::parse();

    let level = match args.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(true)
        .with_thread_ids(true)
        .json()
        .finish();

    tracing::subscriber::set_global_default(subscriber)?;

    if let Some(port) = args.metrics_port {
        metrics_exporter_prometheus::PrometheusBuilder::new()
            .with_http_listener(SocketAddr::from(([0, 0, 0, 0], port)))
            .install()?;
        info!(port = port, "Prometheus metrics exporter listening");
    }

    info!(config = %args.config.display(), "Starting observation inventory");

    let config = ObservationsConfig::load(&args.config)
        .with_context(|| format!("Failed to load {}", args.config.display()))?;
    let mut engine_config = config.engine.clone();
    if let Some(max_concurrent) = args.max_concurrent {
        engine_config.max_concurrent = max_concurrent.max(1);
    }

    let mut sources = config.search_configs()?;
    if !args.source.is_empty() {
        for key in &args.source {
            if !sources.iter().any(|s| &s.key == key) {
                return Err(InventoryError::UnknownSource(key.clone()).into());
            }
        }
        sources.retain(|s| args.source.contains(&s.key));
    }
    if sources.is_empty() {
        warn!("No enabled search sources configured");
        return Ok(());
    }

    let store = if args.dry_run {
        info!("Dry run: results are kept in memory");
        None
    } else {
        tokio::fs::create_dir_all(&args.state_dir)
            .await
            .with_context(|| format!("Failed to create {}", args.state_dir.display()))?;
        let path = args.state_dir.join("inventory.db");
        Some(Arc::new(SqliteInventoryStore::open(&path).await?))
    };
    let sink: Arc<dyn InventorySink> = match &store {
        Some(store) => store.clone(),
        None => Arc::new(MemorySink::new()),
    };

    let mut engine = SearchEngine::new(sources, &engine_config, Arc::new(HtarTransport::new()), sink);

    let summary = tokio::select! {
        result = engine.get_obs_file_info() => result?,
        _ = tokio::signal::ctrl_c() => {
            info!("Received shutdown signal");
            return Ok(());
        }
    };

    for (key, source) in &summary.sources {
        info!(
            source = %key,
            days_searched = source.days_searched,
            days_skipped = source.days_skipped,
            records = source.records,
            transient_failures = source.transient_failures,
            permanent_failures = source.permanent_failures,
            halted = source.halted,
            "Source summary"
        );
    }
    info!(summary = %serde_json::to_string(&summary)?, "Search summary");

    if let Some(store) = &store {
        let stats = store.get_stats().await?;
        info!(
            records = stats.records,
            total_bytes = stats.total_bytes,
            commands = stats.commands,
            failed_commands = stats.failed_commands,
            "Inventory session complete"
        );
    }

    if summary.all_sources_stalled() {
        error!("No source inspected a single tarball");
        bail!("inventory search made no progress");
    }

    Ok(())
}
