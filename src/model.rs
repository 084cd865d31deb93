//! Core domain types for the ledger.

use std::fmt;

use crate::Amount;

/// Account identifier.
pub type AccountId = String;

/// Client-supplied token identifying one logical transfer request.
pub type IdempotencyKey = String;

/// An account row as seen by the bootstrap layer and reconciliation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Account {
    pub id: AccountId,
    /// Balance in the smallest currency unit.
    pub balance: i64,
}

impl Account {
    pub fn new(id: impl Into<AccountId>, balance: i64) -> Self {
        Self {
            id: id.into(),
            balance,
        }
    }
}

/// A request to move `amount` from one account to another, exactly once per key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferRequest {
    pub key: IdempotencyKey,
    pub from: AccountId,
    pub to: AccountId,
    pub amount: Amount,
}

impl TransferRequest {
    pub fn new(
        key: impl Into<IdempotencyKey>,
        from: impl Into<AccountId>,
        to: impl Into<AccountId>,
        amount: impl Into<Amount>,
    ) -> Self {
        Self {
            key: key.into(),
            from: from.into(),
            to: to.into(),
            amount: amount.into(),
        }
    }
}

/// Stored result summary of a committed transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferStatus {
    /// Balances were moved and the unit committed.
    Succeeded,
}

impl TransferStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransferStatus::Succeeded => "SUCCESS",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "SUCCESS" => Some(TransferStatus::Succeeded),
            _ => None,
        }
    }
}

impl fmt::Display for TransferStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Ledger entry written exactly once, when a transfer first commits.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferRecord {
    pub idempotency_key: IdempotencyKey,
    pub from_account: AccountId,
    pub to_account: AccountId,
    pub amount: Amount,
    pub status: TransferStatus,
}

impl TransferRecord {
    /// Build the record a successful execution of `request` will insert.
    pub fn succeeded(request: &TransferRequest) -> Self {
        Self {
            idempotency_key: request.key.clone(),
            from_account: request.from.clone(),
            to_account: request.to.clone(),
            amount: request.amount,
            status: TransferStatus::Succeeded,
        }
    }

    /// Whether `request` carries the same parameters this record was written with.
    pub fn matches(&self, request: &TransferRequest) -> bool {
        self.from_account == request.from
            && self.to_account == request.to
            && self.amount == request.amount
    }
}
