// src/retry.rs
use crate::error::SyncError;
use std::future::Future;
use tokio::time::{sleep, Duration};
use tracing::{error, warn};

/// Bounded retry with a fixed pause between attempts.
///
/// Holds only its limits; nothing carries over from one `execute` call to the
/// next. Non-retryable errors are returned straight away.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            delay,
        }
    }

    pub fn from_secs(max_attempts: u32, delay_secs: u64) -> Self {
        Self::new(max_attempts, Duration::from_secs(delay_secs))
    }

    /// Run `op` until it succeeds, fails with a non-retryable error, or
    /// `max_attempts` consecutive attempts have failed.
    pub async fn execute<T, F, Fut>(&self, label: &str, mut op: F) -> Result<T, SyncError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, SyncError>>,
    {
        let mut attempt = 1;
        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(e) if !e.is_retryable() => return Err(e),
                Err(e) if attempt < self.max_attempts => {
                    warn!(
                        "⚠️ {} failed (attempt {}/{}): {}. Retrying in {:?}...",
                        label, attempt, self.max_attempts, e, self.delay
                    );
                    sleep(self.delay).await;
                    attempt += 1;
                }
                Err(e) => {
                    error!("❌ {} failed after {} attempts: {}", label, self.max_attempts, e);
                    return Err(e);
                }
            }
        }
    }
}
