//! Aggregator Service
//!
//! Collects kernel trace batches posted by Lumen GPU tracers and serves the
//! resulting per-kernel statistics on /kernels and /metrics.

use anyhow::{Context, Result};
use clap::Parser;
use lumen_aggregator::{
    config::AggregatorConfig,
    ingest::KernelTraceStore,
    server::{http, AppState},
};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser, Debug)]
#[command(name = "lumen-aggregator")]
#[command(about = "Kernel trace collector for Lumen GPU tracers", long_about = None)]
#[command(version)]
struct Args {
    /// TOML configuration file
    #[arg(short, long, env = "LUMEN_AGGREGATOR_CONFIG")]
    config: Option<PathBuf>,

    /// Listen address (overrides the configuration)
    #[arg(short, long)]
    listen: Option<String>,

    /// Verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Emit logs as JSON
    #[arg(long)]
    json_logs: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_tracing(args.verbose, args.json_logs);

    let mut config =
        AggregatorConfig::load(args.config.as_deref()).context("Failed to load configuration")?;
    if let Some(listen) = args.listen {
        config.listen_addr = listen;
    }
    let addr = config.socket_addr()?;
    info!("Starting Lumen aggregator on {}", addr);

    let store = Arc::new(KernelTraceStore::new());
    let state = Arc::new(AppState::new(store.clone(), config.max_body_bytes));
    let (_, server) = http::bind(addr, state, shutdown_signal()).context("Failed to bind HTTP server")?;

    server.await.context("HTTP server error")?;

    let totals = store.totals();
    info!(
        "Lumen aggregator stopped after {} batches ({} kernel dispatches)",
        totals.batches, totals.events
    );
    Ok(())
}

/// Initialize tracing/logging
fn init_tracing(verbose: bool, json: bool) {
    let filter = if verbose {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug"))
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_target(false))
            .init();
    }
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("Received Ctrl-C, shutting down"),
        Err(e) => {
            warn!("Cannot listen for Ctrl-C, running until killed: {}", e);
            std::future::pending::<()>().await;
        }
    }
}
