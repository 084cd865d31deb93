use sqlx::sqlite::SqliteRow;
use sqlx::{Executor, Row, Sqlite, Transaction};

use super::StoreError;
use crate::Amount;
use crate::model::{TransferRecord, TransferStatus};

/// Append-only record of committed transfers, keyed by idempotency key.
///
/// The primary key constraint on the key, not any read before the write, is what
/// guarantees a key is executed at most once.
pub struct TransactionLedger;

impl TransactionLedger {
    /// Point lookup by idempotency key. Runs on the pool or inside a transaction.
    pub async fn lookup<'e, E>(executor: E, key: &str) -> Result<Option<TransferRecord>, StoreError>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        let row = sqlx::query(
            r#"
            SELECT idempotency_key, from_account, to_account, amount, status
            FROM transfers
            WHERE idempotency_key = ?
            "#,
        )
        .bind(key)
        .fetch_optional(executor)
        .await?;

        row.as_ref().map(record_from_row).transpose()
    }

    /// Insert `record` inside the caller's transaction.
    ///
    /// Fails with [`StoreError::DuplicateKey`] when a record with the same key is
    /// already committed, or is committed by a concurrent transaction first.
    pub async fn insert(
        tx: &mut Transaction<'_, Sqlite>,
        record: &TransferRecord,
    ) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO transfers (idempotency_key, from_account, to_account, amount, status)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(&record.idempotency_key)
        .bind(&record.from_account)
        .bind(&record.to_account)
        .bind(record.amount.value())
        .bind(record.status.as_str())
        .execute(&mut **tx)
        .await
        .map_err(|e| StoreError::from_insert(e, &record.idempotency_key))?;

        Ok(())
    }

    /// Every recorded transfer, oldest first.
    pub async fn list<'e, E>(executor: E) -> Result<Vec<TransferRecord>, StoreError>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        let rows = sqlx::query(
            r#"
            SELECT idempotency_key, from_account, to_account, amount, status
            FROM transfers
            ORDER BY rowid
            "#,
        )
        .fetch_all(executor)
        .await?;

        rows.iter().map(record_from_row).collect()
    }
}

fn record_from_row(row: &SqliteRow) -> Result<TransferRecord, StoreError> {
    let status: String = row.try_get("status")?;
    let status = TransferStatus::parse(&status)
        .ok_or_else(|| StoreError::Corrupt(format!("unknown transfer status '{status}'")))?;

    Ok(TransferRecord {
        idempotency_key: row.try_get("idempotency_key")?,
        from_account: row.try_get("from_account")?,
        to_account: row.try_get("to_account")?,
        amount: Amount::new(row.try_get("amount")?),
        status,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::TransferRequest;
    use crate::store::test_store;

    fn record(key: &str, amount: i64) -> TransferRecord {
        TransferRecord::succeeded(&TransferRequest::new(key, "a", "b", amount))
    }

    #[tokio::test]
    async fn lookup_missing_key() {
        let (store, _dir) = test_store(&[("a", 100), ("b", 0)]).await;
        let found = TransactionLedger::lookup(store.pool(), "k1").await.unwrap();
        assert!(found.is_none());
    }

    #[tokio::test]
    async fn insert_then_lookup() {
        let (store, _dir) = test_store(&[("a", 100), ("b", 0)]).await;

        let mut tx = store.begin().await.unwrap();
        TransactionLedger::insert(&mut tx, &record("k1", 10))
            .await
            .unwrap();

        // visible inside the unit before commit, invisible outside
        let inside = TransactionLedger::lookup(&mut *tx, "k1").await.unwrap();
        assert_eq!(inside, Some(record("k1", 10)));
        let outside = TransactionLedger::lookup(store.pool(), "k1").await.unwrap();
        assert!(outside.is_none());

        tx.commit().await.unwrap();

        let found = TransactionLedger::lookup(store.pool(), "k1").await.unwrap();
        assert_eq!(found, Some(record("k1", 10)));
    }

    #[tokio::test]
    async fn insert_duplicate_key_is_rejected_by_constraint() {
        let (store, _dir) = test_store(&[("a", 100), ("b", 0)]).await;

        let mut tx = store.begin().await.unwrap();
        TransactionLedger::insert(&mut tx, &record("k1", 10))
            .await
            .unwrap();
        tx.commit().await.unwrap();

        let mut tx = store.begin().await.unwrap();
        let err = TransactionLedger::insert(&mut tx, &record("k1", 99))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::DuplicateKey(key) if key == "k1"));
        tx.rollback().await.unwrap();

        // the original record is untouched
        let found = TransactionLedger::lookup(store.pool(), "k1").await.unwrap();
        assert_eq!(found.unwrap().amount, Amount::new(10));
    }

    #[tokio::test]
    async fn list_in_insertion_order() {
        let (store, _dir) = test_store(&[("a", 100), ("b", 0)]).await;

        let mut tx = store.begin().await.unwrap();
        for (key, amount) in [("z", 1), ("m", 2), ("a", 3)] {
            TransactionLedger::insert(&mut tx, &record(key, amount))
                .await
                .unwrap();
        }
        tx.commit().await.unwrap();

        let keys: Vec<_> = TransactionLedger::list(store.pool())
            .await
            .unwrap()
            .into_iter()
            .map(|r| r.idempotency_key)
            .collect();
        assert_eq!(keys, ["z", "m", "a"]);
    }
}
