use crate::error::SyncError;
use crate::models::{TokenAccount, TokenEntity, TokenMetadata};
use chrono::{DateTime, Utc};
use eyre::Result;
use rusqlite::{params, Connection, OptionalExtension};
use rust_decimal::Decimal;
use std::str::FromStr;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{info, warn};

const INIT_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS wallets_to_monitor (
  wallet_address TEXT PRIMARY KEY,
  added_at       TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%SZ', 'now'))
);

CREATE TABLE IF NOT EXISTS token_entity (
  token_id         TEXT PRIMARY KEY,
  name             TEXT NOT NULL,
  symbol           TEXT NOT NULL,
  price            TEXT NOT NULL, -- Decimal stored as string
  price_24h_change TEXT,
  image_url        TEXT,
  updated_at       TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS token_accounts (
  id             INTEGER PRIMARY KEY AUTOINCREMENT,
  wallet_address TEXT NOT NULL,
  token_mint     TEXT NOT NULL REFERENCES token_entity(token_id),
  balance        TEXT NOT NULL, -- raw u64 amount stored as string
  decimals       INTEGER NOT NULL,
  symbol         TEXT,
  last_updated   TEXT NOT NULL,
  UNIQUE(wallet_address, token_mint)
);

CREATE INDEX IF NOT EXISTS idx_token_accounts_wallet ON token_accounts(wallet_address);
"#;

/// Connect to SQLite (WAL mode, foreign keys enforced)
pub fn connect(path: &str) -> Result<Connection> {
    let conn = Connection::open(path)?;
    conn.pragma_update(None, "journal_mode", "WAL")?;
    conn.pragma_update(None, "foreign_keys", "ON")?;
    Ok(conn)
}

/// Run schema migrations
pub fn run_migrations(conn: &Connection) -> Result<()> {
    conn.execute_batch(INIT_SQL)?;
    Ok(())
}

/// Persistence for token metadata and wallet → token balance links.
///
/// Every method is a single atomic statement against the store.
pub trait HoldingsStore: Send + Sync {
    fn upsert_token_entity(&self, token_id: &str, meta: &TokenMetadata) -> Result<(), SyncError>;
    fn upsert_token_account(
        &self,
        wallet: &str,
        mint: &str,
        balance: u64,
        decimals: u8,
        symbol: Option<&str>,
    ) -> Result<(), SyncError>;
    fn delete_token_account(&self, wallet: &str, mint: &str) -> Result<(), SyncError>;
    fn list_token_accounts(&self, wallet: &str) -> Result<Vec<String>, SyncError>;
    fn token_entity_exists(&self, mint: &str) -> Result<bool, SyncError>;
}

/// Source of the monitored-wallet list
pub trait WalletDirectory: Send + Sync {
    fn list_monitored_wallets(&self) -> Result<Vec<String>, SyncError>;
}

/// Fixed wallet list handed in from config / command line
pub struct StaticWallets(pub Vec<String>);

impl WalletDirectory for StaticWallets {
    fn list_monitored_wallets(&self) -> Result<Vec<String>, SyncError> {
        Ok(self.0.clone())
    }
}

/// SQLite-backed store shared between the sync loop and the API
#[derive(Clone)]
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStore {
    pub fn new(conn: Connection) -> Self {
        Self {
            conn: Arc::new(Mutex::new(conn)),
        }
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>, SyncError> {
        self.conn
            .lock()
            .map_err(|_| SyncError::Storage("connection mutex poisoned".into()))
    }

    pub fn add_wallet(&self, wallet: &str) -> Result<(), SyncError> {
        self.lock()?.execute(
            "INSERT INTO wallets_to_monitor (wallet_address) VALUES (?1)
             ON CONFLICT(wallet_address) DO NOTHING",
            params![wallet],
        )?;
        Ok(())
    }

    /// Token accounts of a wallet joined with their token entity
    pub fn token_accounts_by_wallet(&self, wallet: &str) -> Result<Vec<TokenAccount>, SyncError> {
        let db = self.lock()?;
        let mut stmt = db.prepare(
            "SELECT ta.wallet_address, ta.token_mint, ta.balance, ta.decimals, ta.symbol,
                    ta.last_updated, te.name, te.price
             FROM token_accounts ta
             LEFT JOIN token_entity te ON ta.token_mint = te.token_id
             WHERE ta.wallet_address = ?1
             ORDER BY ta.id",
        )?;

        let rows = stmt.query_map([wallet], |r| {
            let last_updated: String = r.get(5)?;
            let price: Option<String> = r.get(7)?;
            let mint: String = r.get(1)?;
            Ok(TokenAccount {
                wallet_address: r.get(0)?,
                token_price: price.and_then(|p| parse_price(&mint, &p)),
                token_mint: mint,
                balance: r.get(2)?,
                decimals: r.get(3)?,
                symbol: r.get(4)?,
                last_updated: parse_timestamp(&last_updated),
                token_name: r.get(6)?,
            })
        })?;

        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    pub fn all_tokens(&self) -> Result<Vec<TokenEntity>, SyncError> {
        let db = self.lock()?;
        let mut stmt = db.prepare(
            "SELECT token_id, name, symbol, price, price_24h_change, image_url, updated_at
             FROM token_entity ORDER BY name",
        )?;

        let rows = stmt.query_map([], |r| {
            let token_id: String = r.get(0)?;
            let price: String = r.get(3)?;
            let change: Option<String> = r.get(4)?;
            let updated_at: String = r.get(6)?;
            Ok(TokenEntity {
                price: parse_price(&token_id, &price).unwrap_or(Decimal::ZERO),
                token_id,
                name: r.get(1)?,
                symbol: r.get(2)?,
                price_24h_change: change.and_then(|c| Decimal::from_str(&c).ok()),
                image_url: r.get(5)?,
                updated_at: parse_timestamp(&updated_at),
            })
        })?;

        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }
}

/// Stored prices are `Decimal` text; anything else is reported and dropped
fn parse_price(token_id: &str, raw: &str) -> Option<Decimal> {
    match Decimal::from_str(raw) {
        Ok(p) => Some(p),
        Err(e) => {
            warn!("Corrupt price {:?} stored for {}: {}", raw, token_id, e);
            None
        }
    }
}

fn parse_timestamp(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

impl HoldingsStore for SqliteStore {
    fn upsert_token_entity(&self, token_id: &str, meta: &TokenMetadata) -> Result<(), SyncError> {
        self.lock()?.execute(
            r#"
            INSERT INTO token_entity (token_id, name, symbol, price, price_24h_change, image_url, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            ON CONFLICT(token_id) DO UPDATE SET
                name             = excluded.name,
                symbol           = excluded.symbol,
                price            = excluded.price,
                price_24h_change = excluded.price_24h_change,
                image_url        = excluded.image_url,
                updated_at       = excluded.updated_at
            "#,
            params![
                token_id,
                meta.name,
                meta.symbol,
                meta.price.to_string(),
                meta.price_24h_change.map(|c| c.to_string()),
                meta.image_url,
                Utc::now().to_rfc3339(),
            ],
        )?;
        info!("💾 Saved token {} ({}) price {}", token_id, meta.symbol, meta.price);
        Ok(())
    }

    fn upsert_token_account(
        &self,
        wallet: &str,
        mint: &str,
        balance: u64,
        decimals: u8,
        symbol: Option<&str>,
    ) -> Result<(), SyncError> {
        self.lock()?.execute(
            r#"
            INSERT INTO token_accounts (wallet_address, token_mint, balance, decimals, symbol, last_updated)
            VALUES (?1, ?2, ?3, ?4,
                    COALESCE(?5, (SELECT symbol FROM token_entity WHERE token_id = ?2)), ?6)
            ON CONFLICT(wallet_address, token_mint) DO UPDATE SET
                balance      = excluded.balance,
                decimals     = excluded.decimals,
                symbol       = excluded.symbol,
                last_updated = excluded.last_updated
            "#,
            params![
                wallet,
                mint,
                balance.to_string(),
                decimals,
                symbol,
                Utc::now().to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    fn delete_token_account(&self, wallet: &str, mint: &str) -> Result<(), SyncError> {
        self.lock()?.execute(
            "DELETE FROM token_accounts WHERE wallet_address = ?1 AND token_mint = ?2",
            params![wallet, mint],
        )?;
        Ok(())
    }

    fn list_token_accounts(&self, wallet: &str) -> Result<Vec<String>, SyncError> {
        let db = self.lock()?;
        let mut stmt =
            db.prepare("SELECT token_mint FROM token_accounts WHERE wallet_address = ?1")?;
        let mints = stmt
            .query_map([wallet], |r| r.get(0))?
            .collect::<Result<Vec<String>, _>>()?;
        Ok(mints)
    }

    fn token_entity_exists(&self, mint: &str) -> Result<bool, SyncError> {
        let found = self
            .lock()?
            .query_row(
                "SELECT 1 FROM token_entity WHERE token_id = ?1",
                [mint],
                |_| Ok(()),
            )
            .optional()?;
        Ok(found.is_some())
    }
}

impl WalletDirectory for SqliteStore {
    fn list_monitored_wallets(&self) -> Result<Vec<String>, SyncError> {
        let db = self.lock()?;
        let mut stmt =
            db.prepare("SELECT wallet_address FROM wallets_to_monitor ORDER BY wallet_address")?;
        let wallets = stmt
            .query_map([], |r| r.get(0))?
            .collect::<Result<Vec<String>, _>>()?;
        info!("Retrieved {} wallet addresses from database", wallets.len());
        Ok(wallets)
    }
}

/// In-memory store with the production schema, for tests
#[cfg(test)]
pub fn memory_store() -> SqliteStore {
    let conn = Connection::open_in_memory().expect("open in-memory sqlite");
    conn.pragma_update(None, "foreign_keys", "ON").expect("enable foreign keys");
    run_migrations(&conn).expect("migrations");
    SqliteStore::new(conn)
}
