//! Periodic settlement.
//!
//! A sweep visits every account with a usage or debt record:
//!
//! 1. An account with debt gets the debt charged. Success clears it, failure leaves it. New
//!    usage is not billed in the same pass.
//! 2. Otherwise the current window is closed, and the accrued byte-seconds divided by the
//!    price denominator are charged. A failed charge becomes the account's debt.
//!
//! Accounts are processed concurrently up to a configured bound. A failure on one account is
//! reported in its outcome and never stops the others. Each account is settled under its
//! account lock, which the service's mutations also take, so no mutation slips between a past-due
//! check and a debt being recorded.

use std::{
    collections::{BTreeMap, BTreeSet},
    sync::Arc,
};

use alloy_primitives::U256;
use futures::{StreamExt, stream};
use pinmeter_api::{Account, SettlementLedger};
use pinmeter_storage::KvStore;
use tracing::{debug, error, info, instrument, warn};

use crate::{
    BillingError, constants::ACCOUNT_LOCK_STRIPES, debt::DebtBook, keys, locks::LockStripes,
    metrics::SweepMetrics, usage::UsageLedger,
};

/// What a sweep did for one account.
#[derive(Debug, Clone, PartialEq, Eq, strum::IntoStaticStr)]
#[strum(serialize_all = "snake_case")]
pub enum SweepOutcome {
    /// The closed window was worth less than one currency unit.
    Idle,
    /// The closed window was charged.
    Charged {
        /// Amount charged.
        amount: U256,
    },
    /// The charge failed; the amount is now owed.
    DebtRecorded {
        /// Amount that became debt.
        amount: U256,
    },
    /// An outstanding debt was collected.
    DebtCleared {
        /// Amount collected.
        amount: U256,
    },
    /// An outstanding debt could not be collected.
    DebtOutstanding {
        /// Amount still owed.
        amount: U256,
    },
    /// Processing stopped on a storage error.
    Failed {
        /// Rendered error.
        error: String,
    },
}

impl SweepOutcome {
    /// Amount successfully collected from the account.
    pub fn collected(&self) -> U256 {
        match self {
            Self::Charged { amount } | Self::DebtCleared { amount } => *amount,
            _ => U256::ZERO,
        }
    }

    /// Whether the account is past due after the sweep.
    pub fn is_past_due(&self) -> bool {
        matches!(self, Self::DebtRecorded { .. } | Self::DebtOutstanding { .. })
    }
}

/// Per-account outcomes of one sweep.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SweepReport {
    outcomes: BTreeMap<Account, SweepOutcome>,
}

impl SweepReport {
    /// Outcome for `account`, if it was visited.
    pub fn outcome(&self, account: &Account) -> Option<&SweepOutcome> {
        self.outcomes.get(account)
    }

    /// Visited accounts and their outcomes, ordered by account.
    pub fn iter(&self) -> impl Iterator<Item = (&Account, &SweepOutcome)> {
        self.outcomes.iter()
    }

    /// Number of visited accounts.
    pub fn len(&self) -> usize {
        self.outcomes.len()
    }

    /// Whether no account was visited.
    pub fn is_empty(&self) -> bool {
        self.outcomes.is_empty()
    }

    /// Sum collected across all accounts.
    pub fn total_collected(&self) -> U256 {
        self.outcomes.values().fold(U256::ZERO, |sum, o| sum.saturating_add(o.collected()))
    }

    /// Number of accounts that ended with a storage failure.
    pub fn failures(&self) -> usize {
        self.outcomes.values().filter(|o| matches!(o, SweepOutcome::Failed { .. })).count()
    }
}

impl Extend<(Account, SweepOutcome)> for SweepReport {
    fn extend<I: IntoIterator<Item = (Account, SweepOutcome)>>(&mut self, iter: I) {
        self.outcomes.extend(iter);
    }
}

/// Closes usage windows and charges accounts.
pub struct SettlementSweeper {
    store: Arc<dyn KvStore>,
    usage: UsageLedger,
    debts: DebtBook,
    ledger: Arc<dyn SettlementLedger>,
    denominator: U256,
    concurrency: usize,
    metrics: SweepMetrics,
    account_locks: Arc<LockStripes>,
}

impl std::fmt::Debug for SettlementSweeper {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SettlementSweeper")
            .field("ledger", &self.ledger.name())
            .field("denominator", &self.denominator)
            .field("concurrency", &self.concurrency)
            .finish()
    }
}

impl SettlementSweeper {
    /// Create a sweeper charging `denominator` byte-seconds per currency unit.
    pub fn new(
        store: Arc<dyn KvStore>,
        usage: UsageLedger,
        debts: DebtBook,
        ledger: Arc<dyn SettlementLedger>,
        denominator: U256,
        concurrency: usize,
    ) -> Self {
        Self {
            store,
            usage,
            debts,
            ledger,
            denominator: denominator.max(U256::from(1)),
            concurrency: concurrency.max(1),
            metrics: SweepMetrics::default(),
            account_locks: Arc::new(LockStripes::new(ACCOUNT_LOCK_STRIPES)),
        }
    }

    /// Locks serializing settlement of an account with its mutations.
    pub(crate) fn account_locks(&self) -> &Arc<LockStripes> {
        &self.account_locks
    }

    /// Accounts holding a usage or debt record.
    pub async fn active_accounts(&self) -> Result<BTreeSet<Account>, BillingError> {
        keys::active_accounts(self.store.as_ref()).await
    }

    /// Sweep every active account.
    pub async fn run(&self) -> Result<SweepReport, BillingError> {
        let accounts = self.active_accounts().await?;
        Ok(self.sweep(accounts).await)
    }

    /// Sweep the given accounts.
    pub async fn sweep(&self, accounts: impl IntoIterator<Item = Account>) -> SweepReport {
        let report: SweepReport = stream::iter(accounts)
            .map(|account| async move { (account, self.sweep_account(account).await) })
            .buffer_unordered(self.concurrency)
            .collect()
            .await;

        self.metrics.inc_sweeps();
        info!(
            accounts = report.len(),
            collected = %report.total_collected(),
            failures = report.failures(),
            "settlement sweep finished"
        );
        report
    }

    #[instrument(skip_all, fields(%account))]
    async fn sweep_account(&self, account: Account) -> SweepOutcome {
        let outcome = match self.try_sweep_account(&account).await {
            Ok(outcome) => outcome,
            Err(e) => {
                error!(error = %e, "settlement failed");
                SweepOutcome::Failed { error: e.to_string() }
            }
        };
        self.metrics.record(&outcome);
        debug!(outcome = <&'static str>::from(&outcome), "account settled");
        outcome
    }

    async fn try_sweep_account(&self, account: &Account) -> Result<SweepOutcome, BillingError> {
        let _guard = self.account_locks.lock(&keys::account_lock(account)).await;

        if let Some(owed) = self.debts.get(account).await? {
            return self.collect_debt(account, owed).await;
        }

        let amount = self.usage.close_billing_window(account, self.denominator).await?;
        if amount.is_zero() {
            return Ok(SweepOutcome::Idle);
        }

        match self.ledger.charge(*account, amount).await {
            Ok(()) => Ok(SweepOutcome::Charged { amount }),
            Err(e) => {
                warn!(
                    %amount,
                    error = %e,
                    ledger = self.ledger.name(),
                    "charge failed, recording debt"
                );
                self.debts.record(account, amount).await?;
                Ok(SweepOutcome::DebtRecorded { amount })
            }
        }
    }

    async fn collect_debt(
        &self,
        account: &Account,
        owed: U256,
    ) -> Result<SweepOutcome, BillingError> {
        if let Err(e) = self.ledger.charge(*account, owed).await {
            warn!(%owed, error = %e, ledger = self.ledger.name(), "past-due charge failed");
            return Ok(SweepOutcome::DebtOutstanding { amount: owed });
        }
        self.debts.settle(account, owed).await?;
        if let Err(e) = self.ledger.record_payment(*account, owed).await {
            warn!(%owed, error = %e, "failed to record past-due payment");
        }
        Ok(SweepOutcome::DebtCleared { amount: owed })
    }
}
