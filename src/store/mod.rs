//! Durable transactional store.
//!
//! [`Store`] owns the connection pool and is created once at startup, handed to the
//! engine, and closed on shutdown. [`AccountStore`] and [`TransactionLedger`] are
//! stateless repositories: every mutating call takes the caller's open transaction,
//! so commit and rollback stay with whoever began the unit.

use std::str::FromStr;

use sqlx::Sqlite;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use tracing::info;

use crate::config::StoreConfig;
use crate::model::Account;

mod accounts;
pub use accounts::AccountStore;

mod error;
pub use error::StoreError;

mod ledger;
pub use ledger::TransactionLedger;

/// An open atomic unit against the store.
pub type Tx = sqlx::Transaction<'static, Sqlite>;

const CREATE_ACCOUNTS: &str = r#"
CREATE TABLE IF NOT EXISTS accounts (
    id      TEXT PRIMARY KEY,
    balance INTEGER NOT NULL CHECK (typeof(balance) = 'integer')
)
"#;

// The primary key on idempotency_key is the idempotency gate.
const CREATE_TRANSFERS: &str = r#"
CREATE TABLE IF NOT EXISTS transfers (
    idempotency_key TEXT PRIMARY KEY,
    from_account    TEXT NOT NULL REFERENCES accounts (id),
    to_account      TEXT NOT NULL REFERENCES accounts (id),
    amount          INTEGER NOT NULL CHECK (amount > 0),
    status          TEXT NOT NULL,
    created_at      TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
)
"#;

/// Handle to the SQLite database backing accounts and the ledger.
#[derive(Debug, Clone)]
pub struct Store {
    pool: SqlitePool,
}

impl Store {
    /// Open (creating if missing) the database described by `config`.
    pub async fn connect(config: &StoreConfig) -> Result<Self, StoreError> {
        let options = SqliteConnectOptions::from_str(&config.url)?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(config.busy_timeout);

        let pool = SqlitePoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(config.acquire_timeout)
            .connect_with(options)
            .await?;

        info!(url = %config.url, "ledger store connected");
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Create the `accounts` and `transfers` tables if they do not exist yet.
    pub async fn bootstrap(&self) -> Result<(), StoreError> {
        sqlx::query(CREATE_ACCOUNTS).execute(&self.pool).await?;
        sqlx::query(CREATE_TRANSFERS).execute(&self.pool).await?;
        Ok(())
    }

    /// Insert seed accounts, leaving already existing accounts untouched.
    ///
    /// Returns the number of accounts actually created.
    pub async fn seed(
        &self,
        accounts: impl IntoIterator<Item = Account>,
    ) -> Result<u64, StoreError> {
        let mut tx = self.begin().await?;
        let mut created = 0;
        for account in accounts {
            if AccountStore::create(&mut *tx, &account).await? {
                created += 1;
            }
        }
        tx.commit().await?;
        Ok(created)
    }

    /// Begin an atomic unit.
    pub async fn begin(&self) -> Result<Tx, StoreError> {
        Ok(self.pool.begin().await?)
    }

    pub async fn health_check(&self) -> Result<(), StoreError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    /// Wait for in-flight connections to be returned, then close the pool.
    pub async fn close(&self) {
        self.pool.close().await;
    }
}

/// Temporary on-disk store for tests. The directory lives as long as the guard.
#[cfg(test)]
pub(crate) async fn test_store(accounts: &[(&str, i64)]) -> (Store, tempfile::TempDir) {
    let config = StoreConfig {
        busy_timeout: std::time::Duration::from_secs(30),
        ..StoreConfig::default()
    };
    test_store_with(accounts, config).await
}

/// Like [`test_store`], with every setting but the url taken from `config`.
#[cfg(test)]
pub(crate) async fn test_store_with(
    accounts: &[(&str, i64)],
    config: StoreConfig,
) -> (Store, tempfile::TempDir) {
    let dir = tempfile::tempdir().unwrap();
    let config = StoreConfig {
        url: format!("sqlite://{}", dir.path().join("ledger.db").display()),
        ..config
    };
    let store = Store::connect(&config).await.unwrap();
    store.bootstrap().await.unwrap();
    store
        .seed(accounts.iter().map(|(id, balance)| Account::new(*id, *balance)))
        .await
        .unwrap();
    (store, dir)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn bootstrap_is_repeatable() {
        let (store, _dir) = test_store(&[]).await;
        store.bootstrap().await.unwrap();
        store.health_check().await.unwrap();
    }

    #[tokio::test]
    async fn seed_ignores_existing_accounts() {
        let (store, _dir) = test_store(&[("a", 100)]).await;

        let created = store
            .seed([Account::new("a", 5), Account::new("b", 0)])
            .await
            .unwrap();
        assert_eq!(created, 1);

        let accounts = AccountStore::list(store.pool()).await.unwrap();
        assert_eq!(accounts, vec![Account::new("a", 100), Account::new("b", 0)]);
    }

    #[tokio::test]
    async fn dropped_transaction_rolls_back() {
        let (store, _dir) = test_store(&[("a", 100)]).await;

        {
            let mut tx = store.begin().await.unwrap();
            AccountStore::adjust(&mut tx, "a", -40).await.unwrap();
        }

        let balance = AccountStore::get_balance(store.pool(), "a").await.unwrap();
        assert_eq!(balance, 100);
    }
}
