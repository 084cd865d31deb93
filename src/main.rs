use std::env;
use std::io;
use std::process::ExitCode;

use tokio_stream::wrappers::ReceiverStream;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;
use txs_ledger::csv::{read_accounts, read_transfers, write_balances};
use txs_ledger::{AccountStore, EngineConfig, Store, StoreConfig, TransferEngine};

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args: Vec<String> = env::args().skip(1).collect();
    let [accounts_path, transfers_path] = args.as_slice() else {
        eprintln!("usage: txs-ledger <accounts.csv> <transfers.csv>");
        return ExitCode::from(2);
    };

    match run(accounts_path, transfers_path).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e}");
            ExitCode::FAILURE
        }
    }
}

async fn run(
    accounts_path: &str,
    transfers_path: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let store_config = StoreConfig::from_env()?;
    let engine_config = EngineConfig::from_env()?;

    let store = Store::connect(&store_config).await?;
    store.bootstrap().await?;

    let mut accounts = Vec::new();
    for result in read_accounts(accounts_path)? {
        match result {
            Ok(account) => accounts.push(account),
            Err(e) => warn!("{e}"),
        }
    }
    let created = store.seed(accounts).await?;
    info!(created, "accounts seeded");

    // owned path so the reader can move to its own task
    let transfers = read_transfers(transfers_path.to_owned())?;
    let (tx_sender, tx_receiver) = tokio::sync::mpsc::channel(16);

    let reader = tokio::spawn(async move {
        for result in transfers {
            match result {
                Ok(request) => {
                    if tx_sender.send(request).await.is_err() {
                        break;
                    }
                }
                Err(e) => warn!("{e}"),
            }
        }
    });

    let engine = TransferEngine::new(store.clone(), engine_config);
    let summary = engine.run(ReceiverStream::new(tx_receiver)).await;
    reader.await?;
    info!(
        executed = summary.executed,
        replayed = summary.replayed,
        failed = summary.failed,
        "transfers processed"
    );

    let balances = AccountStore::list(store.pool()).await?;
    write_balances(io::stdout().lock(), &balances)?;

    store.close().await;
    Ok(())
}
