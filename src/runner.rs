// src/runner.rs
use crate::db::{HoldingsStore, WalletDirectory};
use crate::dexscreener::PriceMetadataClient;
use crate::error::SyncError;
use crate::reconcile::{ReconcileOutcome, ReconciliationEngine};
use crate::rpc::LedgerClient;
use serde::Serialize;
use tracing::{error, info};

#[derive(Debug, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum WalletResult {
    Succeeded(ReconcileOutcome),
    Failed { wallet: String, reason: String },
}

#[derive(Debug, Default, Serialize)]
pub struct BatchReport {
    pub wallets: Vec<WalletResult>,
    pub succeeded: usize,
    pub failed: usize,
    pub tokens_upserted: usize,
    pub tokens_pruned: usize,
    pub tokens_skipped: usize,
}

impl BatchReport {
    fn record(&mut self, wallet: &str, result: Result<ReconcileOutcome, SyncError>) {
        match result {
            Ok(outcome) => {
                self.succeeded += 1;
                self.tokens_upserted += outcome.upserted.len();
                self.tokens_pruned += outcome.pruned.len();
                self.tokens_skipped += outcome.skipped.len();
                self.wallets.push(WalletResult::Succeeded(outcome));
            }
            Err(e) => {
                error!("❌ Wallet {} failed: {}", wallet, e);
                self.failed += 1;
                self.wallets.push(WalletResult::Failed {
                    wallet: wallet.to_string(),
                    reason: e.to_string(),
                });
            }
        }
    }
}

/// Drives the engine over every monitored wallet, one at a time.
pub struct WalletBatchRunner<L, P, S> {
    engine: ReconciliationEngine<L, P, S>,
}

impl<L, P, S> WalletBatchRunner<L, P, S>
where
    L: LedgerClient,
    P: PriceMetadataClient,
    S: HoldingsStore,
{
    pub fn new(engine: ReconciliationEngine<L, P, S>) -> Self {
        Self { engine }
    }

    /// Reconcile each wallet; a failing wallet is recorded, never fatal.
    pub async fn run_all(&self, wallets: &[String]) -> BatchReport {
        info!("Starting batch over {} wallets", wallets.len());
        let mut report = BatchReport::default();

        for wallet in wallets {
            let result = self.engine.reconcile_wallet(wallet).await;
            report.record(wallet, result);
        }

        info!(
            "Batch done: {} succeeded, {} failed, {} upserted, {} pruned, {} skipped",
            report.succeeded,
            report.failed,
            report.tokens_upserted,
            report.tokens_pruned,
            report.tokens_skipped
        );
        report
    }

    /// Fails only if the wallet list itself can't be read.
    pub async fn run_from_directory(
        &self,
        directory: &dyn WalletDirectory,
    ) -> Result<BatchReport, SyncError> {
        let wallets = directory.list_monitored_wallets()?;
        Ok(self.run_all(&wallets).await)
    }
}
