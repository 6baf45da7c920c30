//! Billing error types.

use alloy_primitives::U256;
use pinmeter_api::{Account, ContentHash, InputError, LedgerError, PinningError};
use pinmeter_storage::DatabaseError;

/// Errors returned by the metering and settlement core.
#[derive(Debug, thiserror::Error)]
pub enum BillingError {
    /// Malformed input, rejected before touching any state.
    #[error(transparent)]
    Input(#[from] InputError),

    /// The account has an outstanding debt and may not mutate state.
    #[error("account {account} is past due ({amount} owed)")]
    PastDue {
        /// The blocked account.
        account: Account,
        /// Outstanding debt.
        amount: U256,
    },

    /// A payment was requested for an account without debt.
    #[error("account {account} has no past-due bill")]
    NoPastDue {
        /// The account.
        account: Account,
    },

    /// The pinning service failed to store content.
    #[error("pinning failed: {0}")]
    Pinning(#[from] PinningError),

    /// The pinning service failed to release content whose last reference was dropped.
    ///
    /// The reference counter is left at zero so the release can be retried.
    #[error("failed to release content {hash}: {source}")]
    Unpin {
        /// Content that is still physically stored.
        hash: ContentHash,
        /// Pinning failure.
        source: PinningError,
    },

    /// The settlement ledger refused or failed a charge.
    #[error("charge of {amount} to {account} failed: {source}")]
    Charge {
        /// Charged account.
        account: Account,
        /// Attempted amount.
        amount: U256,
        /// Ledger failure.
        source: LedgerError,
    },

    /// The sweep scheduler is no longer running.
    #[error("sweep scheduler stopped")]
    SchedulerStopped,

    /// Storage failure.
    #[error(transparent)]
    Storage(#[from] DatabaseError),
}
