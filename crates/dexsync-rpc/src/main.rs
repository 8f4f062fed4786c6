//! dexsync RPC server - JSON-RPC front end for the Pokemon catalog.
//!
//! This binary wraps dexsync-core in a JSON-RPC 2.0 server. The bound port is
//! printed to stdout as `RPC_PORT=<port>` so a parent process can find it.

mod handlers;
mod server;
mod wrapper;

use anyhow::Result;
use clap::Parser;
use dexsync_core::{BatchSelection, DexSync, SeedOptions, SyncConfig};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[derive(Parser, Debug)]
#[command(name = "dexsync-rpc")]
#[command(about = "JSON-RPC server for the dexsync Pokemon catalog")]
struct Args {
    /// Port to listen on (0 = auto-assign)
    #[arg(short, long, default_value = "0")]
    port: u16,

    /// Host to bind to
    #[arg(long, default_value = "127.0.0.1")]
    host: String,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,

    /// JSON config file (environment variables still override it)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Seed every configured batch in the background after startup
    #[arg(long)]
    seed_on_start: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // RUST_LOG wins over --debug when set
    let default_level = if args.debug { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .compact()
        .init();

    info!("Starting dexsync RPC server");

    let config = SyncConfig::load(args.config.as_deref())?;
    info!("Catalog database: {}", config.database_path.display());
    info!("Upstream: {}", config.upstream.base_url);

    let api = Arc::new(DexSync::new(config)?);

    let addr = server::start_server(api.clone(), &args.host, args.port).await?;

    // Port discovery line for the parent process (intentional stdout)
    println!("RPC_PORT={}", addr.port());

    info!("RPC server running on {}", addr);

    if args.seed_on_start {
        let api = api.clone();
        tokio::spawn(async move {
            match api.seed(&BatchSelection::All, SeedOptions::default()).await {
                Ok(summary) => info!(
                    "Startup seed finished: {} written, {} skipped, {} failed",
                    summary.totals.succeeded, summary.totals.skipped, summary.totals.failed
                ),
                Err(e) => warn!("Startup seed did not run: {}", e),
            }
        });
    }

    // Wait for shutdown signal
    tokio::signal::ctrl_c().await?;
    info!("Shutdown signal received, exiting");

    Ok(())
}
