//! AlphaEnsemble Sync Engine
//!
//! Polls the AlphaEnsemble coordinator and its agent contracts, and keeps
//! prices, positions, PnL history and the leaderboard current in a local
//! projection (optionally mirrored to a JSON snapshot file).
//!
//! Signals:
//!   SIGHUP          re-query the coordinator's agent list next cycle
//!   SIGINT/SIGTERM  finish the running cycle, write the snapshot, exit
//!
//! Usage:
//!   ensemble-sync
//!   ensemble-sync --config /path/to/sync.toml --json-logs
//!   ensemble-sync --once --start-block 1200
//!
//! Created: 2026-10-14

use anyhow::{Context, Result};
use clap::Parser;
use ensemble_sync::config::load_config;
use ensemble_sync::projection::ProjectionStore;
use ensemble_sync::sync::{CycleOutcome, Scheduler, SyncEngine};
use ensemble_sync::RpcLedger;
use futures::StreamExt;
use signal_hook::consts::{SIGHUP, SIGINT, SIGTERM};
use signal_hook_tokio::Signals;
use std::path::PathBuf;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, EnvFilter};

/// AlphaEnsemble event sync and reconciliation engine
#[derive(Parser)]
#[command(name = "ensemble-sync")]
struct Args {
    /// TOML config file (environment variables override it)
    #[arg(short, long, env = "SYNC_CONFIG")]
    config: Option<PathBuf>,

    /// Run a single cycle and exit
    #[arg(long)]
    once: bool,

    /// Emit logs as JSON lines
    #[arg(long)]
    json_logs: bool,

    /// Start from this block instead of the current chain height
    #[arg(long)]
    start_block: Option<u64>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    if args.json_logs {
        fmt().json().with_env_filter(filter).init();
    } else {
        fmt().with_env_filter(filter).init();
    }

    info!("===========================================");
    info!("   AlphaEnsemble Sync Engine");
    info!("===========================================");

    let mut config = load_config(args.config.as_deref()).context("Failed to load configuration")?;
    if args.start_block.is_some() {
        config.start_block = args.start_block;
    }
    info!("Poll interval: {:?}", config.poll_interval());
    if let Some(path) = &config.snapshot_file {
        info!("Snapshot file: {}", path.display());
    }

    let ledger = Arc::new(RpcLedger::connect(&config.rpc_url).await?);
    let store = ProjectionStore::new();
    let engine = SyncEngine::open(ledger, &config, store)
        .await
        .context("Failed to open sync engine")?;
    let refresh = engine.refresh_flag();
    let scheduler = Scheduler::new(engine, config.poll_interval());

    if args.once {
        let outcome = scheduler.run_once().await;
        scheduler.engine().lock().await.close();
        if matches!(outcome, CycleOutcome::Failed) {
            anyhow::bail!("Sync cycle failed");
        }
        return Ok(());
    }

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let mut signals = Signals::new([SIGHUP, SIGINT, SIGTERM])?;
    let signals_handle = signals.handle();
    tokio::spawn(async move {
        while let Some(sig) = signals.next().await {
            match sig {
                SIGHUP => {
                    info!("Received SIGHUP - flagging registry refresh");
                    refresh.store(true, Ordering::SeqCst);
                }
                _ => {
                    info!("Received signal {} - shutting down", sig);
                    if shutdown_tx.send(true).is_err() {
                        warn!("Scheduler already stopped");
                    }
                    break;
                }
            }
        }
    });

    scheduler.run(shutdown_rx).await;
    signals_handle.close();

    let engine = scheduler.engine();
    let mut engine = engine.lock().await;
    engine.close();
    if engine.stats().committed_cycles == 0 {
        error!("Stopped without committing a cycle");
    }
    Ok(())
}
