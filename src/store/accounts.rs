use sqlx::{Executor, Row, Sqlite, Transaction};

use super::StoreError;
use crate::model::Account;

/// Account balances.
///
/// Performs no business validation: overdraft policy belongs to the engine.
pub struct AccountStore;

impl AccountStore {
    /// Read the current balance of `id`.
    pub async fn get_balance<'e, E>(executor: E, id: &str) -> Result<i64, StoreError>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        sqlx::query_scalar::<_, i64>("SELECT balance FROM accounts WHERE id = ?")
            .bind(id)
            .fetch_optional(executor)
            .await?
            .ok_or_else(|| StoreError::NotFound(id.to_string()))
    }

    /// Apply `balance += delta` inside the caller's transaction and return the new
    /// balance. The addition is evaluated by the store under its write lock, so
    /// concurrent adjustments to the same account cannot be lost.
    pub async fn adjust(
        tx: &mut Transaction<'_, Sqlite>,
        id: &str,
        delta: i64,
    ) -> Result<i64, StoreError> {
        sqlx::query_scalar::<_, i64>(
            "UPDATE accounts SET balance = balance + ? WHERE id = ? RETURNING balance",
        )
        .bind(delta)
        .bind(id)
        .fetch_optional(&mut **tx)
        .await?
        .ok_or_else(|| StoreError::NotFound(id.to_string()))
    }

    /// Create `account` unless an account with the same id exists.
    ///
    /// Returns whether a row was inserted.
    pub async fn create<'e, E>(executor: E, account: &Account) -> Result<bool, StoreError>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        let result = sqlx::query("INSERT OR IGNORE INTO accounts (id, balance) VALUES (?, ?)")
            .bind(&account.id)
            .bind(account.balance)
            .execute(executor)
            .await?;
        Ok(result.rows_affected() == 1)
    }

    /// All accounts, sorted by id.
    pub async fn list<'e, E>(executor: E) -> Result<Vec<Account>, StoreError>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        let rows = sqlx::query("SELECT id, balance FROM accounts ORDER BY id")
            .fetch_all(executor)
            .await?;

        rows.iter()
            .map(|row| -> Result<Account, StoreError> {
                Ok(Account {
                    id: row.try_get("id")?,
                    balance: row.try_get("balance")?,
                })
            })
            .collect()
    }
}
