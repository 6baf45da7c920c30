//! Billing service facade.

use std::{sync::Arc, time::Duration};

use alloy_primitives::U256;
use bytes::Bytes;
use pinmeter_api::{Account, Clock, Filename, PinningService, SettlementLedger};
use pinmeter_storage::KvStore;
use tracing::{info, warn};

use crate::{
    BillingError,
    config::BillingConfig,
    debt::{BillingStatus, DebtBook},
    entries::{FileEntry, FileEntryStore, PutOutcome},
    keys,
    locks::LockStripes,
    refcount::RefCounter,
    scheduler::{SweepHandle, SweepScheduler},
    sweep::{SettlementSweeper, SweepReport},
    usage::UsageLedger,
};

/// Entry point for every metering and settlement operation.
///
/// All collaborators are injected; nothing is process-global. Mutations are refused with
/// [`BillingError::PastDue`] while the account owes a past-due amount. Reads always succeed.
///
/// A mutation holds its account's lock from the past-due check to its last write. Settlement
/// and payment of the same account take that lock too.
pub struct BillingService {
    usage: UsageLedger,
    refs: RefCounter,
    debts: DebtBook,
    entries: FileEntryStore,
    sweeper: Arc<SettlementSweeper>,
    account_locks: Arc<LockStripes>,
    ledger: Arc<dyn SettlementLedger>,
    denominator: U256,
    sweep_interval: Duration,
}

impl std::fmt::Debug for BillingService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BillingService")
            .field("entries", &self.entries)
            .field("sweeper", &self.sweeper)
            .finish_non_exhaustive()
    }
}

impl BillingService {
    /// Wire the service over its collaborators.
    pub fn new(
        config: &impl BillingConfig,
        store: Arc<dyn KvStore>,
        pinning: Arc<dyn PinningService>,
        ledger: Arc<dyn SettlementLedger>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let attempts = config.max_update_attempts();
        let usage = UsageLedger::new(store.clone(), clock, attempts);
        let refs = RefCounter::new(store.clone(), attempts);
        let debts = DebtBook::new(store.clone(), attempts);
        let entries = FileEntryStore::new(store.clone(), pinning, refs.clone(), usage.clone());
        let sweeper = Arc::new(SettlementSweeper::new(
            store,
            usage.clone(),
            debts.clone(),
            ledger.clone(),
            config.denominator(),
            config.sweep_concurrency(),
        ));
        let account_locks = sweeper.account_locks().clone();

        Self {
            usage,
            refs,
            debts,
            entries,
            sweeper,
            account_locks,
            ledger,
            denominator: config.denominator(),
            sweep_interval: config.sweep_interval(),
        }
    }

    /// Record a change of `delta` bytes in the account's stored size.
    ///
    /// Returns the byte-seconds accrued in the current window.
    pub async fn report_usage_delta(
        &self,
        account: &Account,
        delta: i64,
    ) -> Result<U256, BillingError> {
        let _guard = self.account_locks.lock(&keys::account_lock(account)).await;
        self.debts.ensure_current(account).await?;
        self.usage.report_delta(account, delta).await
    }

    /// Store `content` as the account's file `filename`.
    pub async fn put_file_entry(
        &self,
        account: &Account,
        filename: &Filename,
        content: Bytes,
    ) -> Result<PutOutcome, BillingError> {
        let _guard = self.account_locks.lock(&keys::account_lock(account)).await;
        self.debts.ensure_current(account).await?;
        self.entries.put(account, filename, content).await
    }

    /// Delete the account's file `filename`. Returns `false` if it did not exist.
    pub async fn delete_file_entry(
        &self,
        account: &Account,
        filename: &Filename,
    ) -> Result<bool, BillingError> {
        let _guard = self.account_locks.lock(&keys::account_lock(account)).await;
        self.debts.ensure_current(account).await?;
        self.entries.delete(account, filename).await
    }

    /// The account's file `filename`, if any.
    pub async fn get_file_entry(
        &self,
        account: &Account,
        filename: &Filename,
    ) -> Result<Option<FileEntry>, BillingError> {
        self.entries.get(account, filename).await
    }

    /// All files of the account, ordered by filename.
    pub async fn list_file_entries(
        &self,
        account: &Account,
    ) -> Result<Vec<(Filename, FileEntry)>, BillingError> {
        self.entries.list(account).await
    }

    /// What the open window would cost if it closed now. Does not write.
    pub async fn current_period_amount(&self, account: &Account) -> Result<U256, BillingError> {
        Ok(self.usage.accrued_units(account).await? / self.denominator)
    }

    /// Outstanding past-due amount, zero when current.
    pub async fn past_due_amount(&self, account: &Account) -> Result<U256, BillingError> {
        Ok(self.debts.get(account).await?.unwrap_or_default())
    }

    /// Whether the account is current or past due.
    pub async fn billing_status(&self, account: &Account) -> Result<BillingStatus, BillingError> {
        self.debts.status(account).await
    }

    /// Charge the full past-due amount and clear it.
    ///
    /// Fails with [`BillingError::NoPastDue`] when nothing is owed and with
    /// [`BillingError::Charge`] when the ledger refuses; the debt is unchanged in both cases.
    /// Returns the amount paid.
    pub async fn pay_past_due(&self, account: &Account) -> Result<U256, BillingError> {
        let _guard = self.account_locks.lock(&keys::account_lock(account)).await;
        let Some(owed) = self.debts.get(account).await? else {
            return Err(BillingError::NoPastDue { account: *account });
        };

        self.ledger
            .charge(*account, owed)
            .await
            .map_err(|source| BillingError::Charge { account: *account, amount: owed, source })?;
        self.debts.settle(account, owed).await?;
        if let Err(e) = self.ledger.record_payment(*account, owed).await {
            warn!(%account, %owed, error = %e, "failed to record past-due payment");
        }

        info!(%account, %owed, "past-due amount paid");
        Ok(owed)
    }

    /// Run one settlement sweep over every active account.
    pub async fn run_settlement_sweep(&self) -> Result<SweepReport, BillingError> {
        self.sweeper.run().await
    }

    /// A scheduler sweeping at the configured interval, and its handle.
    pub fn sweep_scheduler(&self) -> (SweepScheduler, SweepHandle) {
        SweepScheduler::new(self.sweeper.clone(), self.sweep_interval)
    }

    /// The usage accrual ledger.
    pub fn usage(&self) -> &UsageLedger {
        &self.usage
    }

    /// The content reference counter.
    pub fn refs(&self) -> &RefCounter {
        &self.refs
    }

    /// The past-due debt book.
    pub fn debts(&self) -> &DebtBook {
        &self.debts
    }
}
