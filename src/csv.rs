use serde::{Deserialize, Serialize};
use std::io;
use std::path::Path;
use thiserror::Error;

use crate::model::{Account, AccountId, IdempotencyKey, TransferRequest};

/// Errors that can occur when reading or writing csv files
#[derive(Debug, Error)]
pub enum CsvError {
    #[error("failed to open {path}: {source}")]
    Open { path: String, source: csv::Error },

    #[error("line {line}: failed to parse row: {source}")]
    Parse { line: usize, source: csv::Error },

    #[error("line {line}: missing idempotency key")]
    MissingKey { line: usize },

    #[error("failed to write csv: {0}")]
    Write(#[from] csv::Error),

    #[error("failed to flush csv: {0}")]
    Flush(#[from] io::Error),
}

#[derive(Debug, Deserialize)]
struct AccountRow {
    account: AccountId,
    balance: i64,
}

#[derive(Debug, Deserialize)]
struct TransferRow {
    key: IdempotencyKey,
    from: AccountId,
    to: AccountId,
    amount: i64,
}

#[derive(Debug, Serialize)]
struct BalanceRow<'a> {
    account: &'a str,
    balance: i64,
}

fn open(path: &Path) -> Result<csv::Reader<std::fs::File>, CsvError> {
    csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_path(path)
        .map_err(|source| CsvError::Open {
            path: path.display().to_string(),
            source,
        })
}

/// Read seed accounts (`account,balance`) from a csv file
pub fn read_accounts(
    path: impl AsRef<Path>,
) -> Result<impl Iterator<Item = Result<Account, CsvError>>, CsvError> {
    let reader = open(path.as_ref())?;

    Ok(reader
        .into_deserialize::<AccountRow>()
        .enumerate()
        .map(|(idx, result)| {
            let line = idx + 2; // 1-indexed, skip header
            let row = result.map_err(|source| CsvError::Parse { line, source })?;
            Ok(Account::new(row.account, row.balance))
        }))
}

/// Read transfer requests (`key,from,to,amount`) from a csv file
///
/// Amounts are not validated here; the engine reports bad amounts as failed
/// transfers.
pub fn read_transfers(
    path: impl AsRef<Path>,
) -> Result<impl Iterator<Item = Result<TransferRequest, CsvError>>, CsvError> {
    let reader = open(path.as_ref())?;

    Ok(reader
        .into_deserialize::<TransferRow>()
        .enumerate()
        .map(|(idx, result)| {
            let line = idx + 2;
            let row = result.map_err(|source| CsvError::Parse { line, source })?;
            if row.key.is_empty() {
                return Err(CsvError::MissingKey { line });
            }
            Ok(TransferRequest::new(row.key, row.from, row.to, row.amount))
        }))
}

/// Write account balances (`account,balance`) in csv format
pub fn write_balances<'a>(
    writer: impl io::Write,
    accounts: impl IntoIterator<Item = &'a Account>,
) -> Result<(), CsvError> {
    let mut writer = csv::Writer::from_writer(writer);

    for account in accounts {
        writer.serialize(BalanceRow {
            account: &account.id,
            balance: account.balance,
        })?;
    }

    writer.flush()?;
    Ok(())
}
