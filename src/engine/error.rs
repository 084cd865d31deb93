//! Failure reasons surfaced by [`TransferEngine::execute`](super::TransferEngine::execute).

use std::time::Duration;

use thiserror::Error;

use crate::Amount;
use crate::model::AccountId;
use crate::store::StoreError;

/// Why a transfer did not complete. No partial state persists for any variant.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum Failure {
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("account {0} not found")]
    NotFound(AccountId),

    #[error("insufficient funds in {account}: balance {balance}, requested {amount}")]
    InsufficientFunds {
        account: AccountId,
        balance: i64,
        amount: Amount,
    },

    #[error("store unavailable: {0}")]
    StorageUnavailable(String),

    /// The store rejected the unit itself, e.g. a constraint violation or an
    /// unreadable row. Retrying with the same input fails the same way.
    #[error("storage error: {0}")]
    Storage(String),

    /// Outcome unknown to the caller; retrying with the same key is safe.
    #[error("commit failed: {0}")]
    CommitError(String),

    #[error("timed out after {0:?}")]
    Timeout(Duration),
}

impl Failure {
    /// Infrastructure faults the caller may retry with the same idempotency key.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Failure::StorageUnavailable(_) | Failure::CommitError(_) | Failure::Timeout(_)
        )
    }
}

impl From<StoreError> for Failure {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound(id) => Failure::NotFound(id),
            StoreError::Storage(
                e @ (sqlx::Error::Io(_)
                | sqlx::Error::PoolTimedOut
                | sqlx::Error::PoolClosed
                | sqlx::Error::WorkerCrashed),
            ) => Failure::StorageUnavailable(e.to_string()),
            other => Failure::Storage(other.to_string()),
        }
    }
}
