//! Error types for the storage layer.

use thiserror::Error;

use crate::model::{AccountId, IdempotencyKey};

/// Error returned by [`AccountStore`](super::AccountStore) and
/// [`TransactionLedger`](super::TransactionLedger).
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("account {0} not found")]
    NotFound(AccountId),

    /// Uniqueness constraint on the ledger rejected the insert.
    #[error("transfer with idempotency key {0} already recorded")]
    DuplicateKey(IdempotencyKey),

    #[error("storage error: {0}")]
    Storage(#[from] sqlx::Error),

    #[error("corrupt row: {0}")]
    Corrupt(String),
}

impl StoreError {
    /// Map an insert failure, turning a primary key violation into `DuplicateKey`.
    pub(crate) fn from_insert(err: sqlx::Error, key: &str) -> Self {
        match &err {
            sqlx::Error::Database(db) if db.is_unique_violation() => {
                StoreError::DuplicateKey(key.to_string())
            }
            _ => StoreError::Storage(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display() {
        assert_eq!(
            StoreError::NotFound("a".into()).to_string(),
            "account a not found"
        );
        assert_eq!(
            StoreError::DuplicateKey("k1".into()).to_string(),
            "transfer with idempotency key k1 already recorded"
        );
    }

    #[test]
    fn non_database_insert_error_stays_storage() {
        let err = StoreError::from_insert(sqlx::Error::PoolTimedOut, "k1");
        assert!(matches!(err, StoreError::Storage(sqlx::Error::PoolTimedOut)));
    }
}
