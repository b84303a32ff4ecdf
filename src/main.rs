mod api;
mod config;
mod db;
mod dexscreener;
mod error;
mod models;
mod reconcile;
mod retry;
mod rpc;
mod runner;
mod scheduler;

use clap::Parser;
use db::{SqliteStore, StaticWallets, WalletDirectory};
use dexscreener::DexscreenerClient;
use reconcile::ReconciliationEngine;
use retry::RetryPolicy;
use rpc::SolanaRpcClient;
use runner::{WalletBatchRunner, WalletResult};
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

type Runner = WalletBatchRunner<SolanaRpcClient, DexscreenerClient, SqliteStore>;

async fn run_batch(runner: &Runner, directory: &dyn WalletDirectory) {
    match runner.run_from_directory(directory).await {
        Ok(report) => {
            for failure in report.wallets.iter().filter_map(|w| match w {
                WalletResult::Failed { wallet, reason } => Some((wallet, reason)),
                _ => None,
            }) {
                error!("  {} → {}", failure.0, failure.1);
            }
            info!(
                "Batch summary: {} wallets ok, {} failed",
                report.succeeded, report.failed
            );
        }
        Err(e) => error!("Could not list monitored wallets: {}", e),
    }
}

#[tokio::main]
async fn main() -> eyre::Result<()> {
    // Logs to stdout, level from RUST_LOG (default info)
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stdout)
        .with_target(false)
        .init();

    info!("Solana holdings sync starting...");

    let cli = config::Cli::parse();
    let cfg = config::load(&cli)?;
    info!("  RPC URL: {}", cfg.rpc_url);
    info!("  DB Path: {}", cfg.db_path);
    info!("  Interval: {} min", cfg.interval_minutes);

    // Run DB migrations once at startup
    let conn = db::connect(&cfg.db_path)?;
    db::run_migrations(&conn)?;
    let store = SqliteStore::new(conn);

    for wallet in &cli.add_wallets {
        rpc::validate_address(wallet)?;
        store.add_wallet(wallet)?;
        info!("Added {} to wallets_to_monitor", wallet);
    }

    let directory: Arc<dyn WalletDirectory> = if cfg.wallets.is_empty() {
        info!("  Wallets: from wallets_to_monitor table");
        Arc::new(store.clone())
    } else {
        info!("  Wallets: {:?}", cfg.wallets);
        Arc::new(StaticWallets(cfg.wallets.clone()))
    };

    let timeout = Duration::from_secs(cfg.rpc_timeout_secs);
    let engine = ReconciliationEngine::new(
        SolanaRpcClient::new(&cfg.rpc_url, timeout)?,
        DexscreenerClient::new(&cfg.dexscreener_url, timeout)?,
        store.clone(),
        RetryPolicy::from_secs(cfg.ledger_retry_attempts, cfg.ledger_retry_delay_secs),
        RetryPolicy::from_secs(cfg.metadata_retry_attempts, cfg.metadata_retry_delay_secs),
    )
    .with_metadata_refresh(cfg.refresh_known_metadata);
    let runner: Arc<Runner> = Arc::new(WalletBatchRunner::new(engine));

    if cli.once {
        run_batch(&runner, directory.as_ref()).await;
        info!("Single run finished.");
        return Ok(());
    }

    // Spawn API task
    let api_handle = tokio::spawn({
        let cfg = cfg.clone();
        let store = store.clone();
        let enabled = !cli.no_api;
        async move {
            if enabled {
                api::serve(cfg, store).await
            } else {
                std::future::pending().await
            }
        }
    });

    // Spawn scheduler task
    let interval = Duration::from_secs(cfg.interval_minutes.saturating_mul(60));
    let scheduler_handle = tokio::spawn(scheduler::run_every(interval, cli.run_now, move || {
        let runner = Arc::clone(&runner);
        let directory = Arc::clone(&directory);
        async move { run_batch(&runner, directory.as_ref()).await }
    }));

    // Graceful shutdown
    tokio::select! {
        res = api_handle => match res {
            Ok(Ok(_)) => info!("API exited cleanly"),
            Ok(Err(e)) => error!("API error: {:?}", e),
            Err(e) => error!("API task panicked: {:?}", e),
        },
        res = scheduler_handle => if let Err(e) = res {
            error!("Scheduler task panicked: {:?}", e);
        },
        _ = signal::ctrl_c() => {
            info!("Shutdown signal received, stopping...");
        }
    }

    info!("Solana holdings sync stopped.");
    Ok(())
}
