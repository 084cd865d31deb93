pub mod amount;
pub mod config;
pub mod csv;
pub mod engine;
pub mod model;
pub mod store;

pub use amount::Amount;
pub use config::{EngineConfig, OverdraftPolicy, StoreConfig};
pub use engine::{Failure, Outcome, RunSummary, TransferEngine};
pub use model::{Account, AccountId, IdempotencyKey, TransferRecord, TransferRequest};
pub use store::{AccountStore, Store, StoreError, TransactionLedger};
