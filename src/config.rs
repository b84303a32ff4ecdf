use clap::Parser;
use dotenvy::dotenv;
use eyre::Result;
use serde::Deserialize;
use std::env;
use std::str::FromStr;
use tracing::{info, warn};

/// Command-line flags; each overrides its environment counterpart
#[derive(Debug, Parser)]
#[command(name = "solana-holdings-sync", about = "Mirror Solana wallet holdings into SQLite")]
pub struct Cli {
    /// Wallet to monitor (repeatable). Replaces WALLET_ADDRESSES and the DB list.
    #[arg(long = "wallet")]
    pub wallets: Vec<String>,

    /// Register a wallet in the wallets_to_monitor table (repeatable)
    #[arg(long = "add-wallet")]
    pub add_wallets: Vec<String>,

    /// Minutes between batch runs
    #[arg(long)]
    pub interval: Option<u64>,

    /// Run a batch immediately, then follow the schedule
    #[arg(long)]
    pub run_now: bool,

    /// Run a single batch and exit
    #[arg(long)]
    pub once: bool,

    /// Don't start the read API
    #[arg(long)]
    pub no_api: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub rpc_url: String,
    pub rpc_timeout_secs: u64,
    pub dexscreener_url: String,
    pub db_path: String,
    pub port: u16,
    pub wallets: Vec<String>,       // empty → wallets_to_monitor table
    pub ledger_retry_attempts: u32,
    pub ledger_retry_delay_secs: u64,
    pub metadata_retry_attempts: u32,
    pub metadata_retry_delay_secs: u64,
    pub interval_minutes: u64,
    pub refresh_known_metadata: bool,
}

/// Longest accepted batch interval: one week
pub const MAX_INTERVAL_MINUTES: u64 = 7 * 24 * 60;

fn clamp_interval(minutes: u64) -> u64 {
    let clamped = minutes.clamp(1, MAX_INTERVAL_MINUTES);
    if clamped != minutes {
        warn!("Interval of {} min out of range, using {} min", minutes, clamped);
    }
    clamped
}

fn env_or<T: FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

/// Comma separated list → trimmed, non-empty, first occurrence kept
pub fn parse_wallet_list(raw: &str) -> Vec<String> {
    let mut wallets: Vec<String> = Vec::new();
    for w in raw.split(',').map(str::trim).filter(|s| !s.is_empty()) {
        if !wallets.iter().any(|x| x == w) {
            wallets.push(w.to_string());
        }
    }
    wallets
}

pub fn load(cli: &Cli) -> Result<Config> {
    dotenv().ok(); // load from .env file

    let rpc_url = env::var("SOLANA_RPC_URL")
        .unwrap_or_else(|_| "https://api.mainnet-beta.solana.com".to_string());

    let dexscreener_url = env::var("DEXSCREENER_URL")
        .unwrap_or_else(|_| "https://api.dexscreener.com".to_string());

    let db_path = env::var("DATABASE_URL").unwrap_or_else(|_| "wallet_monitor.db".to_string());

    let wallets = if cli.wallets.is_empty() {
        env::var("WALLET_ADDRESSES")
            .or_else(|_| env::var("SOLANA_WALLET_ADDRESS")) // alias support
            .map(|raw| parse_wallet_list(&raw))
            .unwrap_or_default()
    } else {
        parse_wallet_list(&cli.wallets.join(","))
    };

    let cfg = Config {
        rpc_url,
        rpc_timeout_secs: env_or("SOLANA_RPC_TIMEOUT", 30),
        dexscreener_url,
        db_path,
        port: env_or("PORT", 8080),
        wallets,
        ledger_retry_attempts: env_or("LEDGER_RETRY_ATTEMPTS", 3),
        ledger_retry_delay_secs: env_or("LEDGER_RETRY_DELAY_SECS", 2),
        metadata_retry_attempts: env_or("METADATA_RETRY_ATTEMPTS", 3),
        metadata_retry_delay_secs: env_or("METADATA_RETRY_DELAY_SECS", 5),
        interval_minutes: clamp_interval(
            cli.interval
                .unwrap_or_else(|| env_or("SYNC_INTERVAL_MINUTES", 120)),
        ),
        refresh_known_metadata: env_or("REFRESH_KNOWN_METADATA", false),
    };

    info!("Loaded config: {:?}", cfg);

    Ok(cfg)
}
