//! Settlement ledger interface.

use crate::{Account, Amount, LedgerError};

/// External ledger that moves funds on behalf of the billing core.
///
/// Calls must be safe to retry: the settlement sweep may charge the same outstanding amount
/// again after a partial failure, and relies on the ledger to treat that as the same
/// obligation.
#[async_trait::async_trait]
pub trait SettlementLedger: Send + Sync + 'static {
    /// Charge `amount` to `account`.
    async fn charge(&self, account: Account, amount: Amount) -> Result<(), LedgerError>;

    /// Record that a past-due `amount` for `account` has been paid.
    async fn record_payment(&self, account: Account, amount: Amount) -> Result<(), LedgerError>;

    /// Human-readable name for logging.
    fn name(&self) -> &'static str {
        "ledger"
    }
}
