// src/models.rs
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;

/// Mint used to report the native SOL balance next to SPL tokens
pub const WRAPPED_SOL_MINT: &str = "So11111111111111111111111111111111111111112";
pub const NATIVE_DECIMALS: u8 = 9;
pub const NATIVE_SYMBOL: &str = "SOL";

/// One mint currently held by a wallet, as reported by the ledger
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Holding {
    pub mint: String,
    pub raw_balance: u64,      // smallest-unit amount, never scaled
    pub decimals: u8,
    pub symbol_hint: Option<String>,
}

/// Market identity of a token as returned by the price service
#[derive(Debug, Clone, PartialEq)]
pub struct TokenMetadata {
    pub name: String,
    pub symbol: String,
    pub price: Decimal,
    pub price_24h_change: Option<Decimal>,
    pub image_url: Option<String>,
}

/// Persisted `token_entity` row
#[derive(Debug, Serialize)]
pub struct TokenEntity {
    pub token_id: String,
    pub name: String,
    pub symbol: String,
    pub price: Decimal,
    pub price_24h_change: Option<Decimal>,
    pub image_url: Option<String>,
    pub updated_at: DateTime<Utc>,
}

/// Persisted `token_accounts` row joined with its token entity
#[derive(Debug, Serialize)]
pub struct TokenAccount {
    pub wallet_address: String,
    pub token_mint: String,
    pub balance: String,        // u64 kept as string (lossless in SQLite + JSON)
    pub decimals: u8,
    pub symbol: Option<String>,
    pub last_updated: DateTime<Utc>,
    pub token_name: Option<String>,
    pub token_price: Option<Decimal>,
}
