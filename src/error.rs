// src/error.rs
use thiserror::Error;

/// Failures surfaced by the ledger, metadata and storage collaborators.
///
/// "Metadata not found" is deliberately absent: a price service answering
/// with no data is `Ok(None)`, not an error.
#[derive(Debug, Error)]
pub enum SyncError {
    /// Remote call failed; may succeed if tried again.
    #[error("transient fetch error: {0}")]
    TransientFetch(String),

    /// Malformed wallet or mint. Never retried.
    #[error("invalid address '{0}'")]
    InvalidAddress(String),

    /// Persistence failure. Not retried, aborts the current wallet pass.
    #[error("storage error: {0}")]
    Storage(String),
}

impl SyncError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, SyncError::TransientFetch(_))
    }
}

impl From<rusqlite::Error> for SyncError {
    fn from(e: rusqlite::Error) -> Self {
        SyncError::Storage(e.to_string())
    }
}

impl From<reqwest::Error> for SyncError {
    fn from(e: reqwest::Error) -> Self {
        SyncError::TransientFetch(e.to_string())
    }
}
