//! Command line definition.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use pinmeter_api::{Account, ContentHash};
use pinmeter_billing::BillingArgs;
use pinmeter_observability::LogArgs;

/// Pinmeter - storage metering and settlement inspector
#[derive(Debug, Parser)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Logging configuration (applies to all subcommands).
    #[command(flatten)]
    pub logs: LogArgs,

    /// Path of the billing database.
    #[arg(long, value_name = "FILE", default_value = "pinmeter.redb", global = true)]
    pub db: PathBuf,

    /// Load billing settings from a TOML file instead of the `--billing.*` flags.
    #[arg(long, value_name = "FILE", global = true)]
    pub config: Option<PathBuf>,

    /// Billing configuration.
    #[command(flatten)]
    pub billing: BillingArgs,

    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands.
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Show an account's usage and the amount of its open window.
    Usage {
        /// Account address.
        account: Account,
    },
    /// Show an account's past-due amount.
    PastDue {
        /// Account address.
        account: Account,
    },
    /// List an account's files.
    Files {
        /// Account address.
        account: Account,
    },
    /// Show the reference count of a content hash.
    Refs {
        /// Content hash.
        hash: ContentHash,
    },
    /// List accounts holding usage or debt.
    Accounts,
    /// Print the resolved billing configuration as TOML.
    Config,
}
