//! Past-due debts.
//!
//! A debt exists only when a settlement charge failed. While it exists the account is past
//! due: mutations are refused and sweeps try to collect the debt instead of billing new usage.

use std::sync::Arc;

use alloy_primitives::U256;
use pinmeter_api::Account;
use pinmeter_storage::{KvStore, KvStoreExt};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::{BillingError, keys};

/// Persisted debt of one account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DebtRecord {
    /// Amount owed, always positive while the record exists.
    pub amount_owed: U256,
}

/// Whether an account is in good standing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum::IntoStaticStr)]
#[serde(tag = "status", rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum BillingStatus {
    /// No outstanding debt.
    Current,
    /// A failed charge is outstanding.
    PastDue {
        /// Amount owed.
        amount: U256,
    },
}

impl BillingStatus {
    /// Amount owed, zero when current.
    pub fn amount_owed(&self) -> U256 {
        match self {
            Self::Current => U256::ZERO,
            Self::PastDue { amount } => *amount,
        }
    }
}

/// Store of past-due debts.
#[derive(Clone)]
pub struct DebtBook {
    store: Arc<dyn KvStore>,
    max_attempts: u32,
}

impl std::fmt::Debug for DebtBook {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DebtBook").field("max_attempts", &self.max_attempts).finish()
    }
}

impl DebtBook {
    /// Create a debt book over `store`.
    pub fn new(store: Arc<dyn KvStore>, max_attempts: u32) -> Self {
        Self { store, max_attempts }
    }

    /// Outstanding debt, `None` when the account is current.
    pub async fn get(&self, account: &Account) -> Result<Option<U256>, BillingError> {
        let record: Option<DebtRecord> = self.store.get_record(&keys::debt(account)).await?;
        Ok(record.map(|r| r.amount_owed).filter(|amount| !amount.is_zero()))
    }

    /// Standing of the account.
    pub async fn status(&self, account: &Account) -> Result<BillingStatus, BillingError> {
        Ok(match self.get(account).await? {
            Some(amount) => BillingStatus::PastDue { amount },
            None => BillingStatus::Current,
        })
    }

    /// Fail with [`BillingError::PastDue`] if the account owes anything.
    pub async fn ensure_current(&self, account: &Account) -> Result<(), BillingError> {
        match self.get(account).await? {
            Some(amount) => Err(BillingError::PastDue { account: *account, amount }),
            None => Ok(()),
        }
    }

    /// Add `amount` to the account's debt. Returns the total owed.
    pub async fn record(&self, account: &Account, amount: U256) -> Result<U256, BillingError> {
        if amount.is_zero() {
            return Ok(self.get(account).await?.unwrap_or_default());
        }
        let total = self
            .store
            .update_record::<DebtRecord, _, _>(&keys::debt(account), self.max_attempts, |current| {
                let owed = current.map_or(U256::ZERO, |r| r.amount_owed).saturating_add(amount);
                (Some(DebtRecord { amount_owed: owed }), owed)
            })
            .await?;
        info!(%account, %amount, %total, "debt recorded");
        Ok(total)
    }

    /// Apply a payment of `paid`. The record is removed once nothing is owed.
    ///
    /// Returns the amount still owed.
    pub async fn settle(&self, account: &Account, paid: U256) -> Result<U256, BillingError> {
        let remaining = self
            .store
            .update_record::<DebtRecord, _, _>(&keys::debt(account), self.max_attempts, |current| {
                let owed = current.map_or(U256::ZERO, |r| r.amount_owed).saturating_sub(paid);
                let next = (!owed.is_zero()).then_some(DebtRecord { amount_owed: owed });
                (next, owed)
            })
            .await?;
        debug!(%account, %paid, %remaining, "debt settled");
        Ok(remaining)
    }
}
