//! Time-integrated storage usage per account.
//!
//! Each account carries the bytes it currently occupies, the byte-seconds accrued since the
//! last billing window closed, and the checkpoint up to which accrual has been integrated.
//! Every mutation first integrates `[checkpoint, now)` at the occupancy that held during that
//! interval, then applies the change. Reads project the same integration without writing.

use std::sync::Arc;

use alloy_primitives::U256;
use pinmeter_api::{Account, Clock};
use pinmeter_storage::{KvStore, KvStoreExt};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::{BillingError, keys};

/// Persisted usage state of one account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageRecord {
    /// Bytes currently stored.
    pub occupied_bytes: u64,
    /// Byte-seconds accrued since the last window close.
    pub accrued_units: U256,
    /// Unix seconds up to which `accrued_units` is integrated.
    pub checkpoint: u64,
}

impl UsageRecord {
    /// Empty record whose accrual starts at `now`.
    pub fn new(now: u64) -> Self {
        Self { occupied_bytes: 0, accrued_units: U256::ZERO, checkpoint: now }
    }

    /// Accrued units as of `now`, without moving the checkpoint.
    ///
    /// A clock reading before the checkpoint integrates nothing.
    pub fn accrued_at(&self, now: u64) -> U256 {
        let elapsed = now.saturating_sub(self.checkpoint);
        self.accrued_units
            .saturating_add(U256::from(self.occupied_bytes).saturating_mul(U256::from(elapsed)))
    }

    /// Integrate up to `now` and advance the checkpoint. Never moves the checkpoint backwards.
    fn accrue(&mut self, now: u64) {
        self.accrued_units = self.accrued_at(now);
        self.checkpoint = self.checkpoint.max(now);
    }

    /// Whether the record carries no state worth keeping.
    pub fn is_idle(&self) -> bool {
        self.occupied_bytes == 0 && self.accrued_units.is_zero()
    }
}

/// How much of the accrued units a touch consumes.
#[derive(Debug, Clone, Copy)]
enum Reset {
    /// Leave accrual untouched.
    Keep,
    /// Zero all accrued units.
    All,
    /// Consume whole currency units at the given denominator, keep the remainder.
    WholeUnits(U256),
}

/// Result of applying one mutation to a usage record.
#[derive(Debug, Clone, Copy)]
struct Touched {
    /// Accrued units after integration, before any reset.
    accrued: U256,
    /// Accrued units left in the record.
    remaining: U256,
    /// The size delta drove occupancy below zero and was clamped.
    clamped: bool,
}

/// Usage accrual ledger.
///
/// Cheap to clone; clones share the same store and clock.
#[derive(Clone)]
pub struct UsageLedger {
    store: Arc<dyn KvStore>,
    clock: Arc<dyn Clock>,
    max_attempts: u32,
}

impl std::fmt::Debug for UsageLedger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UsageLedger").field("max_attempts", &self.max_attempts).finish()
    }
}

impl UsageLedger {
    /// Create a ledger over `store`, reading time from `clock`.
    pub fn new(store: Arc<dyn KvStore>, clock: Arc<dyn Clock>, max_attempts: u32) -> Self {
        Self { store, clock, max_attempts }
    }

    /// Integrate accrual up to now, then adjust occupancy by `delta` bytes.
    ///
    /// Creates the record on first use. A negative delta larger than the current occupancy
    /// clamps it to zero. Returns the accrued units after the update.
    pub async fn report_delta(&self, account: &Account, delta: i64) -> Result<U256, BillingError> {
        let touched = self.touch(account, delta, Reset::Keep).await?;
        if touched.clamped {
            warn!(%account, delta, "usage delta below zero occupancy, clamped");
        }
        debug!(%account, delta, accrued = %touched.remaining, "usage reported");
        Ok(touched.remaining)
    }

    /// Integrate accrual up to now and return the accrued units.
    ///
    /// With `reset`, the accrued units are zeroed in the same atomic update, so no accrual is
    /// lost or counted twice across a concurrent report.
    pub async fn close_window(&self, account: &Account, reset: bool) -> Result<U256, BillingError> {
        let mode = if reset { Reset::All } else { Reset::Keep };
        let touched = self.touch(account, 0, mode).await?;
        debug!(%account, reset, accrued = %touched.accrued, "usage window closed");
        Ok(touched.accrued)
    }

    /// Close the window for billing at `denominator` byte-seconds per currency unit.
    ///
    /// Returns the billable amount. Byte-seconds short of a whole unit carry over into the
    /// next window while the account still stores data, and are dropped once it stores none.
    pub async fn close_billing_window(
        &self,
        account: &Account,
        denominator: U256,
    ) -> Result<U256, BillingError> {
        let denominator = denominator.max(U256::from(1));
        let touched = self.touch(account, 0, Reset::WholeUnits(denominator)).await?;
        let amount = touched.accrued / denominator;
        debug!(
            %account,
            accrued = %touched.accrued,
            carried = %touched.remaining,
            %amount,
            "billing window closed"
        );
        Ok(amount)
    }

    /// Accrued units as of now, projected without writing.
    pub async fn accrued_units(&self, account: &Account) -> Result<U256, BillingError> {
        let now = self.clock.now();
        Ok(self.record(account).await?.map_or(U256::ZERO, |record| record.accrued_at(now)))
    }

    /// The stored record, if any.
    pub async fn record(&self, account: &Account) -> Result<Option<UsageRecord>, BillingError> {
        Ok(self.store.get_record(&keys::usage(account)).await?)
    }

    async fn touch(
        &self,
        account: &Account,
        delta: i64,
        reset: Reset,
    ) -> Result<Touched, BillingError> {
        let now = self.clock.now();
        let key = keys::usage(account);

        let touched = self
            .store
            .update_record::<UsageRecord, _, _>(&key, self.max_attempts, |current| {
                let mut record = current.unwrap_or_else(|| UsageRecord::new(now));
                record.accrue(now);
                let accrued = record.accrued_units;

                let (occupied, clamped) = apply_delta(record.occupied_bytes, delta);
                record.occupied_bytes = occupied;
                record.accrued_units = match reset {
                    Reset::Keep => accrued,
                    Reset::All => U256::ZERO,
                    Reset::WholeUnits(_) if record.occupied_bytes == 0 => U256::ZERO,
                    Reset::WholeUnits(denominator) => accrued % denominator,
                };

                let touched = Touched { accrued, remaining: record.accrued_units, clamped };
                // Idle records are dropped, and never created.
                let next = (!record.is_idle()).then_some(record);
                (next, touched)
            })
            .await?;

        Ok(touched)
    }
}

/// Apply a signed delta to an occupancy, clamping at zero and saturating at `u64::MAX`.
fn apply_delta(occupied: u64, delta: i64) -> (u64, bool) {
    match occupied.checked_add_signed(delta) {
        Some(next) => (next, false),
        None if delta < 0 => (0, true),
        None => (u64::MAX, false),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pinmeter_storage::MemoryKvStore;
    use pinmeter_test_utils::ManualClock;
    use proptest::prelude::*;

    fn setup(start: u64) -> (UsageLedger, Arc<ManualClock>, Arc<MemoryKvStore>) {
        let store = Arc::new(MemoryKvStore::new());
        let clock = Arc::new(ManualClock::new(start));
        let ledger = UsageLedger::new(store.clone(), clock.clone(), 8);
        (ledger, clock, store)
    }

    fn account() -> Account {
        "0x00000000000000000000000000000000000000aa".parse().unwrap()
    }

    #[tokio::test]
    async fn test_first_report_creates_record() {
        let (ledger, _clock, _store) = setup(1_000);
        let account = account();

        ledger.report_delta(&account, 100).await.unwrap();

        let record = ledger.record(&account).await.unwrap().unwrap();
        assert_eq!(
            record,
            UsageRecord { occupied_bytes: 100, accrued_units: U256::ZERO, checkpoint: 1_000 }
        );
    }

    #[tokio::test]
    async fn test_accrual_uses_prior_occupancy() {
        let (ledger, clock, _store) = setup(1_000);
        let account = account();

        ledger.report_delta(&account, 100).await.unwrap();
        clock.advance(10);
        ledger.report_delta(&account, 50).await.unwrap();
        clock.advance(4);

        assert_eq!(ledger.close_window(&account, false).await.unwrap(), U256::from(1_600));
        let record = ledger.record(&account).await.unwrap().unwrap();
        assert_eq!(record.occupied_bytes, 150);
        assert_eq!(record.checkpoint, 1_014);
    }

    #[tokio::test]
    async fn test_close_window_reset() {
        let (ledger, clock, _store) = setup(0);
        let account = account();

        ledger.report_delta(&account, 10).await.unwrap();
        clock.advance(100);

        assert_eq!(ledger.close_window(&account, true).await.unwrap(), U256::from(1_000));
        assert_eq!(ledger.close_window(&account, false).await.unwrap(), U256::ZERO);

        let record = ledger.record(&account).await.unwrap().unwrap();
        assert_eq!(record.occupied_bytes, 10);
        assert_eq!(record.accrued_units, U256::ZERO);
    }

    #[tokio::test]
    async fn test_billing_window_carries_remainder() {
        let (ledger, clock, _store) = setup(0);
        let account = account();
        let denominator = U256::from(50);

        ledger.report_delta(&account, 7).await.unwrap();
        clock.advance(10);
        assert_eq!(
            ledger.close_billing_window(&account, denominator).await.unwrap(),
            U256::from(1)
        );
        assert_eq!(ledger.accrued_units(&account).await.unwrap(), U256::from(20));

        clock.advance(5);
        assert_eq!(
            ledger.close_billing_window(&account, denominator).await.unwrap(),
            U256::from(1)
        );
        assert_eq!(ledger.accrued_units(&account).await.unwrap(), U256::from(5));

        // An empty account has its fraction dropped.
        ledger.report_delta(&account, -7).await.unwrap();
        assert_eq!(ledger.close_billing_window(&account, denominator).await.unwrap(), U256::ZERO);
        assert_eq!(ledger.record(&account).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_projection_does_not_write() {
        let (ledger, clock, _store) = setup(0);
        let account = account();

        ledger.report_delta(&account, 5).await.unwrap();
        clock.advance(20);

        assert_eq!(ledger.accrued_units(&account).await.unwrap(), U256::from(100));
        assert_eq!(ledger.record(&account).await.unwrap().unwrap().checkpoint, 0);
    }

    #[tokio::test]
    async fn test_underflow_clamps_to_zero() {
        let (ledger, clock, _store) = setup(0);
        let account = account();

        ledger.report_delta(&account, 10).await.unwrap();
        clock.advance(3);
        ledger.report_delta(&account, -25).await.unwrap();

        let record = ledger.record(&account).await.unwrap().unwrap();
        assert_eq!(record.occupied_bytes, 0);
        assert_eq!(record.accrued_units, U256::from(30));
    }

    #[tokio::test]
    async fn test_clock_regression_accrues_nothing() {
        let (ledger, clock, _store) = setup(100);
        let account = account();

        ledger.report_delta(&account, 10).await.unwrap();
        clock.set(50);
        ledger.report_delta(&account, 0).await.unwrap();
        clock.set(110);

        assert_eq!(ledger.close_window(&account, false).await.unwrap(), U256::from(100));
    }

    #[tokio::test]
    async fn test_idle_record_removed() {
        let (ledger, clock, store) = setup(0);
        let account = account();

        ledger.report_delta(&account, 10).await.unwrap();
        clock.advance(1);
        ledger.report_delta(&account, -10).await.unwrap();
        assert!(store.get(&keys::usage(&account)).await.unwrap().is_some());

        ledger.close_window(&account, true).await.unwrap();
        assert!(store.get(&keys::usage(&account)).await.unwrap().is_none());

        // Closing a window for an unknown account does not create a record.
        ledger.close_window(&account, true).await.unwrap();
        assert!(store.is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_reports_lose_nothing() {
        let (ledger, _clock, _store) = setup(0);
        let account = account();

        let tasks: Vec<_> = (0..8)
            .map(|_| {
                let ledger = ledger.clone();
                tokio::spawn(async move {
                    for _ in 0..25 {
                        ledger.report_delta(&account, 2).await.unwrap();
                    }
                })
            })
            .collect();
        for task in tasks {
            task.await.unwrap();
        }

        let record = ledger.record(&account).await.unwrap().unwrap();
        assert_eq!(record.occupied_bytes, 400);
    }

    #[test]
    fn test_apply_delta() {
        assert_eq!(apply_delta(10, -3), (7, false));
        assert_eq!(apply_delta(10, -11), (0, true));
        assert_eq!(apply_delta(u64::MAX, 1), (u64::MAX, false));
    }

    proptest! {
        /// Accrual equals the exact integral of the occupancy step function.
        #[test]
        fn prop_accrual_matches_integral(
            steps in proptest::collection::vec((0u64..1_000, 0i64..10_000), 1..20),
        ) {
            let rt = tokio::runtime::Builder::new_current_thread().build().unwrap();
            rt.block_on(async {
                let (ledger, clock, _store) = setup(0);
                let account = account();
                let mut expected = U256::ZERO;
                let mut occupied = 0u64;

                for (gap, size) in steps {
                    ledger.report_delta(&account, size).await.unwrap();
                    occupied += size as u64;
                    clock.advance(gap);
                    expected += U256::from(occupied) * U256::from(gap);
                }

                prop_assert_eq!(ledger.close_window(&account, false).await.unwrap(), expected);
                Ok::<(), TestCaseError>(())
            })?;
        }
    }
}
