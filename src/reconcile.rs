// src/reconcile.rs
use crate::db::HoldingsStore;
use crate::dexscreener::PriceMetadataClient;
use crate::error::SyncError;
use crate::models::Holding;
use crate::retry::RetryPolicy;
use crate::rpc::LedgerClient;
use serde::Serialize;
use std::collections::HashSet;
use tracing::{debug, info, warn};

/// Why a held mint got no token account this pass
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum SkipReason {
    MetadataNotFound,
    MetadataUnavailable(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SkippedToken {
    pub mint: String,
    pub reason: SkipReason,
}

/// Summary of one successful reconciliation pass
#[derive(Debug, Default, Clone, Serialize)]
pub struct ReconcileOutcome {
    pub wallet: String,
    pub upserted: Vec<String>,
    pub pruned: Vec<String>,
    pub skipped: Vec<SkippedToken>,
}

/// Brings a wallet's persisted holdings in line with the ledger.
pub struct ReconciliationEngine<L, P, S> {
    ledger: L,
    prices: P,
    store: S,
    ledger_retry: RetryPolicy,
    metadata_retry: RetryPolicy,
    refresh_known_metadata: bool,
}

impl<L, P, S> ReconciliationEngine<L, P, S>
where
    L: LedgerClient,
    P: PriceMetadataClient,
    S: HoldingsStore,
{
    pub fn new(
        ledger: L,
        prices: P,
        store: S,
        ledger_retry: RetryPolicy,
        metadata_retry: RetryPolicy,
    ) -> Self {
        Self {
            ledger,
            prices,
            store,
            ledger_retry,
            metadata_retry,
            refresh_known_metadata: false,
        }
    }

    /// Also re-fetch metadata for mints that already have a token entity
    pub fn with_metadata_refresh(mut self, enabled: bool) -> Self {
        self.refresh_known_metadata = enabled;
        self
    }

    /// One fetch → upsert → prune pass for `wallet`.
    ///
    /// Fails before touching the store if the ledger can't be read. A storage
    /// error mid-pass aborts the pass; rows already written stay (each write
    /// is atomic on its own) and the next pass converges them.
    pub async fn reconcile_wallet(&self, wallet: &str) -> Result<ReconcileOutcome, SyncError> {
        let label = format!("getHoldings({})", wallet);
        let holdings = self
            .ledger_retry
            .execute(&label, || self.ledger.get_holdings(wallet))
            .await?;

        info!("Wallet {}: {} holdings on-chain", wallet, holdings.len());

        let mut outcome = ReconcileOutcome {
            wallet: wallet.to_string(),
            ..Default::default()
        };
        let mut held: HashSet<String> = HashSet::with_capacity(holdings.len());

        for holding in holdings {
            if !held.insert(holding.mint.clone()) {
                // ledger clients merge per mint; a repeat would double-write
                warn!("Wallet {}: duplicate holding for {} ignored", wallet, holding.mint);
                continue;
            }

            match self.ensure_token_entity(&holding).await? {
                Some(reason) => {
                    warn!("Wallet {}: skipping {} ({:?})", wallet, holding.mint, reason);
                    outcome.skipped.push(SkippedToken {
                        mint: holding.mint,
                        reason,
                    });
                }
                None => {
                    self.store.upsert_token_account(
                        wallet,
                        &holding.mint,
                        holding.raw_balance,
                        holding.decimals,
                        holding.symbol_hint.as_deref(),
                    )?;
                    debug!(
                        "Wallet {}: {} balance {} (decimals {})",
                        wallet, holding.mint, holding.raw_balance, holding.decimals
                    );
                    outcome.upserted.push(holding.mint);
                }
            }
        }

        for mint in self.store.list_token_accounts(wallet)? {
            if !held.contains(&mint) {
                self.store.delete_token_account(wallet, &mint)?;
                info!("🧹 Wallet {}: removed {} (no longer held)", wallet, mint);
                outcome.pruned.push(mint);
            }
        }

        info!(
            "✅ Wallet {} reconciled: {} upserted, {} pruned, {} skipped",
            wallet,
            outcome.upserted.len(),
            outcome.pruned.len(),
            outcome.skipped.len()
        );
        Ok(outcome)
    }

    /// Make sure a token entity exists for the holding's mint.
    ///
    /// Returns the skip reason when it doesn't and couldn't be created. Only
    /// storage errors propagate.
    async fn ensure_token_entity(&self, holding: &Holding) -> Result<Option<SkipReason>, SyncError> {
        let known = self.store.token_entity_exists(&holding.mint)?;
        if known && !self.refresh_known_metadata {
            return Ok(None);
        }

        let label = format!("getMetadata({})", holding.mint);
        let fetched = self
            .metadata_retry
            .execute(&label, || self.prices.get_metadata(&holding.mint))
            .await;

        match fetched {
            Ok(Some(meta)) => {
                self.store.upsert_token_entity(&holding.mint, &meta)?;
                Ok(None)
            }
            // an existing entity still satisfies the foreign key
            _ if known => Ok(None),
            Ok(None) => Ok(Some(SkipReason::MetadataNotFound)),
            Err(e) => Ok(Some(SkipReason::MetadataUnavailable(e.to_string()))),
        }
    }
}
