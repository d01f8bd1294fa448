//! docsync CLI

use anyhow::Context;
use clap::Parser;
use docsync_core::prelude::*;
use docsync_engine::{MemoryStore, SyncService};
use docsync_typesense::TypesenseClient;
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser, Debug)]
#[command(name = "docsync")]
#[command(about = "Replicate document store collections into a Typesense index")]
#[command(version)]
struct Args {
    /// Configuration file (toml, yaml or json)
    #[arg(long, env = "DOCSYNC_CONFIG")]
    config: Option<String>,

    /// JSON export of the source store, keyed by document path
    #[arg(long, env = "DOCSYNC_SNAPSHOT")]
    snapshot: String,

    /// Comma-separated collection or document paths; all routes when absent
    #[arg(long, env = "DOCSYNC_PATHS")]
    paths: Option<String>,

    /// Keep running and fire the configured cron schedule
    #[arg(long)]
    schedule: bool,

    /// Create missing target collections before syncing
    #[arg(long)]
    create_collections: bool,

    #[arg(long, env = "LOG_LEVEL")]
    log_level: Option<String>,

    /// "json" or "pretty"
    #[arg(long, env = "LOG_FORMAT")]
    log_format: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let mut config = SyncConfig::load(args.config.as_deref()).context("Failed to load configuration")?;
    if let Some(level) = args.log_level.clone() {
        config.observability.log_level = level;
    }
    if let Some(format) = args.log_format.clone() {
        config.observability.log_format = format;
    }
    init_tracing(&config);

    info!(version = env!("CARGO_PKG_VERSION"), "Starting docsync");
    config.validate()?;
    let config = Arc::new(config);

    let store = Arc::new(MemoryStore::load_snapshot(&args.snapshot).await?);
    let index = Arc::new(TypesenseClient::new((&config.index).into())?);
    if let Err(e) = index.health_check().await {
        warn!(error = %e, "Index health check failed");
    }

    let service = SyncService::new(config.clone(), store.clone(), index);
    if args.create_collections {
        let created = service.create_collections().await?;
        info!(created, "Index collections ready");
    }

    if args.schedule {
        return run_scheduled(&service, store).await;
    }

    let target = match args.paths {
        Some(ref raw) => SyncTarget::Paths(raw.split(',').map(|s| s.trim().to_string()).collect()),
        None => SyncTarget::All,
    };
    let report = service.run(target).await;
    println!("{}", serde_json::to_string_pretty(&report)?);

    if !report.success {
        error!(errors = report.total_errors, "Sync finished with errors");
        std::process::exit(1);
    }
    Ok(())
}

fn init_tracing(config: &SyncConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.observability.log_level));
    let registry = tracing_subscriber::registry().with(filter);

    // stdout carries the report
    match config.observability.log_format.as_str() {
        "pretty" => registry
            .with(fmt::layer().pretty().with_writer(std::io::stderr))
            .init(),
        _ => registry
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init(),
    }
}

async fn run_scheduled(service: &SyncService, store: Arc<MemoryStore>) -> anyhow::Result<()> {
    let scheduled = Arc::new(service.scheduled(store)?);
    if !scheduled.schedule().is_enabled() {
        anyhow::bail!("No sync schedule configured (schedule.interval)");
    }

    let mut scheduler = scheduled.clone().start().await?;
    info!(every = %scheduled.schedule().describe(), "Waiting for scheduled syncs");

    tokio::signal::ctrl_c().await?;
    info!("Shutting down scheduler");
    scheduler
        .shutdown()
        .await
        .map_err(|e| anyhow::anyhow!("Scheduler shutdown failed: {}", e))?;
    Ok(())
}
