use std::{num::NonZeroUsize, path::PathBuf};

use clap::Parser;
use tokio_util::sync::CancellationToken;

use accounts::{CredentialPool, ACCOUNTS_FILE_EXAMPLE};
use claimer::HttpClaimClient;
use config::Config;
use constants::{ACCOUNTS_FILE_PATH, DEFAULT_WORKERS};
use dispatcher::Dispatcher;
use ledger::Ledger;
use logger::init_default_logger;
use source::HttpWorkSource;

mod accounts;
mod claimer;
mod config;
mod constants;
mod dispatcher;
mod error;
mod http;
mod ledger;
mod logger;
mod source;

/// Claims points for newly listed usernames, rotating through several accounts.
#[derive(Parser, Debug)]
#[command(version, about)]
struct Args {
    /// Accounts file: a JSON array of objects with a `cookie` field
    #[arg(short, long, default_value = ACCOUNTS_FILE_PATH)]
    accounts: PathBuf,

    /// Number of concurrent claim workers
    #[arg(short, long, default_value_t = DEFAULT_WORKERS)]
    threads: NonZeroUsize,
}

#[tokio::main]
async fn main() -> eyre::Result<()> {
    let args = Args::parse();
    let _guard = init_default_logger();

    let config = Config::read_default().await?;

    let pool = match CredentialPool::load(&args.accounts).await {
        Ok(pool) => pool,
        Err(e) => {
            tracing::error!("{e}");
            println!(
                "Create the accounts file {} in the following format:\n{ACCOUNTS_FILE_EXAMPLE}",
                args.accounts.display()
            );
            return Ok(());
        }
    };

    let cancel = CancellationToken::new();
    let interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupt received, stopping...");
            interrupt.cancel();
        }
    });

    let dispatcher = Dispatcher::new(
        HttpWorkSource::new(&config)?,
        Ledger::new(&config.ledger_path),
        pool,
        HttpClaimClient::new(&config)?,
        args.threads,
        cancel,
    );

    let report = dispatcher.run().await;
    tracing::debug!("Run ended with {:?}", report.outcome);

    Ok(())
}
