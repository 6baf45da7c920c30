//! Pinmeter operator binary.
//!
//! Reads billing state from a redb database without modifying it.

mod cli;

use std::sync::Arc;

use clap::Parser;
use eyre::{Result, WrapErr};
use pinmeter_api::SystemClock;
use pinmeter_billing::{
    BillingArgs, BillingConfig, DebtBook, RefCounter, UsageLedger, config, keys, list_entries,
};
use pinmeter_storage::KvStore;
use pinmeter_storage_redb::RedbKvStore;
use tracing::debug;

use crate::cli::{Cli, Commands};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    pinmeter_observability::init_logging(&cli.logs)?;

    let billing = resolve_billing(&cli)?;
    if let Commands::Config = cli.command {
        print!("{}", toml::to_string_pretty(&billing)?);
        return Ok(());
    }

    let store: Arc<dyn KvStore> = Arc::new(
        RedbKvStore::open(&cli.db)
            .wrap_err_with(|| format!("failed to open {}", cli.db.display()))?,
    );
    debug!(db = %cli.db.display(), "database opened");

    let attempts = billing.max_update_attempts();
    let usage = UsageLedger::new(store.clone(), Arc::new(SystemClock), attempts);
    let debts = DebtBook::new(store.clone(), attempts);

    match cli.command {
        Commands::Usage { account } => {
            let record = usage.record(&account).await?;
            let accrued = usage.accrued_units(&account).await?;
            println!("account:         {account}");
            println!("occupied bytes:  {}", record.as_ref().map_or(0, |r| r.occupied_bytes));
            println!("checkpoint:      {}", record.as_ref().map_or(0, |r| r.checkpoint));
            println!("accrued units:   {accrued}");
            println!("current amount:  {}", accrued / billing.denominator());
            println!("status:          {}", <&'static str>::from(debts.status(&account).await?));
        }
        Commands::PastDue { account } => {
            println!("{}", debts.get(&account).await?.unwrap_or_default());
        }
        Commands::Files { account } => {
            for (filename, entry) in list_entries(store.as_ref(), &account).await? {
                println!("{filename}\t{}\t{}", entry.content_hash, entry.size_bytes);
            }
        }
        Commands::Refs { hash } => {
            match RefCounter::new(store.clone(), attempts).count(&hash).await? {
                Some(count) => println!("{count}"),
                None => println!("untracked"),
            }
        }
        Commands::Accounts => {
            for account in keys::active_accounts(store.as_ref()).await? {
                let status = debts.status(&account).await?;
                println!("{account}\t{}\t{}", <&'static str>::from(status), status.amount_owed());
            }
        }
        Commands::Config => {}
    }

    Ok(())
}

/// Billing settings from `--config` if given, else from the flags.
fn resolve_billing(cli: &Cli) -> Result<BillingArgs> {
    let billing = match &cli.config {
        Some(path) => config::load_toml(path)?,
        None => cli.billing.clone(),
    };
    billing.validate().map_err(|e| eyre::eyre!(e))?;
    Ok(billing)
}
