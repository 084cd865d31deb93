//! Idempotent transfer engine.
//!
//! One call to [`TransferEngine::execute`] moves an amount between two accounts at
//! most once per idempotency key. The balance mutations and the ledger insert share
//! one store transaction, so the ledger's uniqueness constraint decides which of
//! several concurrent calls with the same key wins; the losers roll back and replay
//! the winner's record.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Semaphore;
use tokio::task::{JoinError, JoinSet};
use tokio_stream::{Stream, StreamExt};
use tracing::{debug, error, info, warn};

use crate::Amount;
use crate::config::{EngineConfig, OverdraftPolicy};
use crate::model::{AccountId, IdempotencyKey, TransferRecord, TransferRequest};
use crate::store::{AccountStore, Store, StoreError, TransactionLedger, Tx};

mod error;
pub use error::Failure;

mod state;
pub use state::TransferPhase;

/// Terminal result of one `execute` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// The transfer ran during this call and committed.
    Executed(TransferRecord),
    /// A transfer with this key was already committed; no balance was touched.
    Replayed(TransferRecord),
    Failed(Failure),
}

impl Outcome {
    pub fn record(&self) -> Option<&TransferRecord> {
        match self {
            Outcome::Executed(record) | Outcome::Replayed(record) => Some(record),
            Outcome::Failed(_) => None,
        }
    }

    pub fn is_executed(&self) -> bool {
        matches!(self, Outcome::Executed(_))
    }

    pub fn is_replayed(&self) -> bool {
        matches!(self, Outcome::Replayed(_))
    }
}

/// Outcome counts of a [`TransferEngine::run`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub executed: usize,
    pub replayed: usize,
    pub failed: usize,
}

impl RunSummary {
    fn record(&mut self, joined: Result<Outcome, JoinError>) {
        match joined {
            Ok(Outcome::Executed(_)) => self.executed += 1,
            Ok(Outcome::Replayed(_)) => self.replayed += 1,
            Ok(Outcome::Failed(_)) => self.failed += 1,
            Err(e) => {
                error!(error = %e, "transfer task aborted");
                self.failed += 1;
            }
        }
    }
}

/// Why the atomic unit stopped short of commit.
enum Abort {
    Failed(TransferPhase, Failure),
    /// The ledger insert hit the uniqueness constraint.
    Duplicate,
}

/// Executes transfers against a [`Store`].
///
/// Cheap to clone; clones share the store's connection pool. No lock is held across
/// calls, all mutual exclusion comes from the store's transactions.
#[derive(Debug, Clone)]
pub struct TransferEngine {
    store: Store,
    config: EngineConfig,
}

/// Public API
impl TransferEngine {
    pub fn new(store: Store, config: EngineConfig) -> Self {
        Self { store, config }
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    /// Move `amount` from `from` to `to`, at most once for `key`.
    pub async fn execute(
        &self,
        key: impl Into<IdempotencyKey>,
        from: impl Into<AccountId>,
        to: impl Into<AccountId>,
        amount: impl Into<Amount>,
    ) -> Outcome {
        self.execute_request(TransferRequest::new(key, from, to, amount))
            .await
    }

    /// Execute `request` under the configured timeout.
    pub async fn execute_request(&self, request: TransferRequest) -> Outcome {
        self.execute_with_timeout(&request, self.config.timeout)
            .await
    }

    /// Execute `request`, aborting the call once `timeout` elapses.
    ///
    /// The deadline covers the ledger lookup as well as the atomic unit, so a
    /// saturated pool cannot hold the caller past it.
    pub async fn execute_with_timeout(
        &self,
        request: &TransferRequest,
        timeout: Duration,
    ) -> Outcome {
        let outcome = match tokio::time::timeout(timeout, self.process(request)).await {
            Ok(outcome) => outcome,
            // dropping the future drops any open transaction, which rolls back
            Err(_) => Outcome::Failed(Failure::Timeout(timeout)),
        };
        Self::log_outcome(request, &outcome);
        outcome
    }

    /// Execute every request of `stream` concurrently, at most
    /// `max_in_flight` at a time. Failed transfers do not stop the run.
    pub async fn run(
        &self,
        mut stream: impl Stream<Item = TransferRequest> + Unpin,
    ) -> RunSummary {
        let permits = Arc::new(Semaphore::new(self.config.max_in_flight.max(1)));
        let mut tasks = JoinSet::new();

        while let Some(request) = stream.next().await {
            let Ok(permit) = permits.clone().acquire_owned().await else {
                break;
            };
            let engine = self.clone();
            tasks.spawn(async move {
                let outcome = engine.execute_request(request).await;
                drop(permit);
                outcome
            });
        }

        let mut summary = RunSummary::default();
        while let Some(joined) = tasks.join_next().await {
            summary.record(joined);
        }
        summary
    }
}

/// Private API
impl TransferEngine {
    async fn process(&self, request: &TransferRequest) -> Outcome {
        // Fast path only: a concurrent call may still be about to commit this key.
        match TransactionLedger::lookup(self.store.pool(), &request.key).await {
            Ok(Some(record)) => return Self::replay(request, record),
            Ok(None) => {}
            Err(e) => {
                warn!(
                    key = %request.key,
                    phase = %TransferPhase::Checking,
                    reason = %e,
                    "ledger lookup failed, continuing with atomic unit"
                );
            }
        }

        self.atomic_unit(request).await
    }

    /// Begin, mutate, record, commit. Every exit other than a successful commit
    /// leaves the store as it was.
    async fn atomic_unit(&self, request: &TransferRequest) -> Outcome {
        let mut tx = match self.store.begin().await {
            Ok(tx) => tx,
            Err(e) => {
                debug!(
                    key = %request.key,
                    phase = %TransferPhase::Begun,
                    error = %e,
                    "begin failed"
                );
                return Outcome::Failed(Failure::StorageUnavailable(e.to_string()));
            }
        };

        match self.apply(&mut tx, request).await {
            Ok(record) => match tx.commit().await {
                Ok(()) => Outcome::Executed(record),
                Err(e) => {
                    debug!(
                        key = %request.key,
                        phase = %TransferPhase::Committing,
                        error = %e,
                        "commit failed"
                    );
                    Outcome::Failed(Failure::CommitError(e.to_string()))
                }
            },
            Err(Abort::Failed(phase, failure)) => {
                Self::rollback(tx, request, phase).await;
                Outcome::Failed(failure)
            }
            Err(Abort::Duplicate) => {
                Self::rollback(tx, request, TransferPhase::Recording).await;
                match TransactionLedger::lookup(self.store.pool(), &request.key).await {
                    Ok(Some(record)) => Self::replay(request, record),
                    Ok(None) => Outcome::Failed(Failure::Storage(format!(
                        "key {} rejected as duplicate but no record found",
                        request.key
                    ))),
                    Err(e) => Outcome::Failed(e.into()),
                }
            }
        }
    }

    /// Validate, then debit, credit and insert the ledger record inside `tx`.
    async fn apply(
        &self,
        tx: &mut Tx,
        request: &TransferRequest,
    ) -> Result<TransferRecord, Abort> {
        use TransferPhase::{Mutating, Recording, Validating};

        Self::validate(request).map_err(|f| Abort::Failed(Validating, f))?;

        let balance = AccountStore::adjust(tx, &request.from, request.amount.debit_delta())
            .await
            .map_err(|e| Abort::Failed(Mutating, e.into()))?;

        if self.config.overdraft == OverdraftPolicy::Reject && balance < 0 {
            return Err(Abort::Failed(
                Mutating,
                Failure::InsufficientFunds {
                    account: request.from.clone(),
                    balance: balance + request.amount.value(),
                    amount: request.amount,
                },
            ));
        }

        AccountStore::adjust(tx, &request.to, request.amount.credit_delta())
            .await
            .map_err(|e| Abort::Failed(Mutating, e.into()))?;

        let record = TransferRecord::succeeded(request);
        match TransactionLedger::insert(tx, &record).await {
            Ok(()) => Ok(record),
            Err(StoreError::DuplicateKey(_)) => Err(Abort::Duplicate),
            Err(e) => Err(Abort::Failed(Recording, e.into())),
        }
    }

    fn validate(request: &TransferRequest) -> Result<(), Failure> {
        if request.key.is_empty() {
            return Err(Failure::InvalidRequest("empty idempotency key".into()));
        }
        if !request.amount.is_positive() {
            return Err(Failure::InvalidRequest(format!(
                "amount must be positive, got {}",
                request.amount
            )));
        }
        if request.from == request.to {
            return Err(Failure::InvalidRequest(format!(
                "source and target account are both {}",
                request.from
            )));
        }
        Ok(())
    }

    fn replay(request: &TransferRequest, record: TransferRecord) -> Outcome {
        if !record.matches(request) {
            warn!(
                key = %request.key,
                from = %request.from,
                to = %request.to,
                amount = %request.amount,
                recorded_from = %record.from_account,
                recorded_to = %record.to_account,
                recorded_amount = %record.amount,
                "idempotency key reused with different parameters, replaying recorded transfer"
            );
        }
        Outcome::Replayed(record)
    }

    async fn rollback(tx: Tx, request: &TransferRequest, phase: TransferPhase) {
        debug!(key = %request.key, phase = %phase, "rolling back atomic unit");
        if let Err(e) = tx.rollback().await {
            // the connection is discarded and the unit is still never committed
            warn!(key = %request.key, phase = %phase, error = %e, "rollback failed");
        }
    }

    /// Small helper to log `execute` outcomes
    fn log_outcome(request: &TransferRequest, outcome: &Outcome) {
        match outcome {
            Outcome::Executed(_) => info!(
                key = %request.key,
                from = %request.from,
                to = %request.to,
                amount = %request.amount,
                "transfer executed"
            ),
            Outcome::Replayed(_) => info!(
                key = %request.key,
                from = %request.from,
                to = %request.to,
                amount = %request.amount,
                "transfer replayed"
            ),
            Outcome::Failed(reason) if reason.is_retryable() => warn!(
                key = %request.key,
                from = %request.from,
                to = %request.to,
                amount = %request.amount,
                reason = %reason,
                "transfer failed, safe to retry"
            ),
            Outcome::Failed(reason) => info!(
                key = %request.key,
                from = %request.from,
                to = %request.to,
                amount = %request.amount,
                reason = %reason,
                "transfer rejected"
            ),
        }
    }
}
