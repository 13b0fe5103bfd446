//! Standalone storage garbage collector.
//!
//! Loads a metadata snapshot, points the collector at a local object store,
//! and either runs a single tick or keeps collecting until Ctrl-C. Reclaimed
//! rows are written back to the snapshot on exit.

use std::path::PathBuf;
use std::sync::Arc;

use akidb_core::DataCoordConfig;
use akidb_datacoord::{GarbageCollector, GcOption, MemoryMeta, MetaIndexedFilter};
use akidb_storage::LocalObjectStore;
use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::EnvFilter;

/// AkiDB storage garbage collector
#[derive(Parser, Debug)]
#[command(name = "akidb-gc")]
#[command(version = env!("CARGO_PKG_VERSION"))]
struct Args {
    /// Configuration file (defaults to the standard search path)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Base directory of the local object store
    #[arg(long)]
    root: PathBuf,

    /// JSON metadata snapshot
    #[arg(long)]
    meta: PathBuf,

    /// Run a single tick, print the report as JSON, and exit
    #[arg(long)]
    once: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,akidb=debug")),
        )
        .init();

    let args = Args::parse();

    let config = match &args.config {
        Some(path) => DataCoordConfig::from_file(path)
            .with_context(|| format!("failed to load config {}", path.display()))?,
        None => DataCoordConfig::load().context("failed to load config")?,
    };

    let store = LocalObjectStore::new(&args.root, config.storage.root_path.clone())
        .await
        .context("failed to open object store")?;
    let meta = Arc::new(
        MemoryMeta::load_json(&args.meta)
            .await
            .with_context(|| format!("failed to load metadata {}", args.meta.display()))?,
    );

    let option = GcOption::from_config(&config.gc, Some(Arc::new(store)));
    let gc = GarbageCollector::new(
        meta.clone(),
        Arc::new(MetaIndexedFilter::new(meta.clone())),
        option,
    );

    if args.once {
        let report = gc.run_once().await?;
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        gc.start();
        tokio::signal::ctrl_c()
            .await
            .context("failed to listen for shutdown signal")?;
        tracing::info!("Shutting down garbage collector");
        gc.close().await;
    }

    meta.save_json(&args.meta)
        .await
        .with_context(|| format!("failed to write metadata {}", args.meta.display()))?;
    tracing::info!(path = %args.meta.display(), "Metadata snapshot saved");
    Ok(())
}
