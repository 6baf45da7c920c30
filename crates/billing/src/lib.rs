//! Storage metering and settlement for a pinning front-end.
//!
//! Accounts pay for the bytes they keep stored, integrated over time. Usage accrues in
//! byte-seconds, is closed into billing windows by a periodic sweep, and is charged through an
//! external settlement ledger. A failed charge turns into a past-due debt that blocks further
//! mutations until it is paid.
//!
//! # Components
//!
//! - [`UsageLedger`] - Per-account occupancy and byte-second accrual
//! - [`RefCounter`] - Reference counts deciding when shared content is released
//! - [`FileEntryStore`] - Named file entries keeping pins, counts and usage in step
//! - [`DebtBook`] - Past-due debts and account standing
//! - [`SettlementSweeper`] / [`SweepScheduler`] - Periodic charging with bounded parallelism
//! - [`BillingService`] - Facade exposing every operation with past-due gating
//!
//! All amounts are in the ledger's smallest currency unit (wei). The price is expressed as a
//! denominator: `amount = byte_seconds / price_denominator`.

pub mod args;
pub mod config;
pub mod constants;
mod debt;
mod entries;
mod error;
pub mod keys;
mod locks;
mod metrics;
mod refcount;
mod scheduler;
mod service;
mod sweep;
mod usage;

pub use args::BillingArgs;
pub use config::{BillingConfig, ConfigError, DefaultBillingConfig};
pub use debt::{BillingStatus, DebtBook, DebtRecord};
pub use entries::{FileEntry, FileEntryStore, PutOutcome, list_entries};
pub use error::BillingError;
pub use refcount::{RefCounter, ReleaseOutcome};
pub use scheduler::{SweepCommand, SweepHandle, SweepScheduler};
pub use service::BillingService;
pub use sweep::{SettlementSweeper, SweepOutcome, SweepReport};
pub use usage::{UsageLedger, UsageRecord};
