use std::sync::Arc;

use alloy_primitives::{Address, U256};
use assert_matches::assert_matches;
use bytes::Bytes;
use pinmeter_api::{Account, Amount, Filename, LedgerError, SettlementLedger};
use pinmeter_billing::{
    BillingArgs, BillingError, BillingService, BillingStatus, SweepOutcome, keys,
};
use pinmeter_storage::{KvStore, MemoryKvStore};
use pinmeter_storage_redb::RedbKvStore;
use pinmeter_test_utils::{ManualClock, MemoryPinning, ScriptedLedger};
use tokio::sync::Notify;

struct Harness {
    service: BillingService,
    store: Arc<dyn KvStore>,
    pinning: Arc<MemoryPinning>,
    ledger: Arc<ScriptedLedger>,
    clock: Arc<ManualClock>,
}

fn harness_with(store: Arc<dyn KvStore>) -> Harness {
    let pinning = Arc::new(MemoryPinning::new());
    let ledger = Arc::new(ScriptedLedger::new());
    let clock = Arc::new(ManualClock::new(1_700_000_000));
    let config = BillingArgs { sweep_concurrency: 3, ..Default::default() };
    let service =
        BillingService::new(&config, store.clone(), pinning.clone(), ledger.clone(), clock.clone());
    Harness { service, store, pinning, ledger, clock }
}

fn harness() -> Harness {
    harness_with(Arc::new(MemoryKvStore::new()))
}

fn account(n: u8) -> Account {
    Account::new(Address::with_last_byte(n))
}

fn name(s: &str) -> Filename {
    Filename::new(s).unwrap()
}

fn blob(len: usize, fill: u8) -> Bytes {
    Bytes::from(vec![fill; len])
}

#[tokio::test]
async fn store_wait_delete_then_bill() {
    let h = harness();
    let a = account(0xa);

    h.service.put_file_entry(&a, &name("file.bin"), blob(1000, 1)).await.unwrap();
    h.clock.advance(50);
    assert_eq!(h.service.current_period_amount(&a).await.unwrap(), U256::from(1000));

    assert!(h.service.delete_file_entry(&a, &name("file.bin")).await.unwrap());
    assert_eq!(h.service.usage().close_window(&a, false).await.unwrap(), U256::from(50_000));
    let record = h.service.usage().record(&a).await.unwrap().unwrap();
    assert_eq!(record.occupied_bytes, 0);

    let report = h.service.run_settlement_sweep().await.unwrap();
    assert_eq!(report.outcome(&a), Some(&SweepOutcome::Charged { amount: U256::from(1000) }));
    assert_eq!(h.service.usage().record(&a).await.unwrap(), None);
    assert!(h.store.get(&keys::usage(&a)).await.unwrap().is_none());
}

#[tokio::test]
async fn failed_charge_blocks_until_paid() {
    let h = harness();
    let b = account(0xb);

    h.service.report_usage_delta(&b, 500).await.unwrap();
    h.clock.advance(50);
    h.ledger.fail_for(b);

    let report = h.service.run_settlement_sweep().await.unwrap();
    assert_eq!(report.outcome(&b), Some(&SweepOutcome::DebtRecorded { amount: U256::from(500) }));
    assert_eq!(h.service.past_due_amount(&b).await.unwrap(), U256::from(500));
    assert_eq!(
        h.service.billing_status(&b).await.unwrap(),
        BillingStatus::PastDue { amount: U256::from(500) }
    );

    // Mutations are refused, reads are not.
    assert_matches!(
        h.service.put_file_entry(&b, &name("x"), blob(10, 2)).await,
        Err(BillingError::PastDue { amount, .. }) if amount == U256::from(500)
    );
    assert_matches!(h.service.report_usage_delta(&b, 1).await, Err(BillingError::PastDue { .. }));
    assert_matches!(
        h.service.delete_file_entry(&b, &name("x")).await,
        Err(BillingError::PastDue { .. })
    );
    assert!(h.service.list_file_entries(&b).await.unwrap().is_empty());

    // A failing payment leaves the debt in place.
    assert_matches!(h.service.pay_past_due(&b).await, Err(BillingError::Charge { .. }));
    assert_eq!(h.service.past_due_amount(&b).await.unwrap(), U256::from(500));

    h.ledger.succeed_for(b);
    assert_eq!(h.service.pay_past_due(&b).await.unwrap(), U256::from(500));
    assert_eq!(h.service.billing_status(&b).await.unwrap(), BillingStatus::Current);
    assert_eq!(h.service.past_due_amount(&b).await.unwrap(), U256::ZERO);
    assert_eq!(h.ledger.payments(), vec![(b, U256::from(500))]);

    assert_matches!(h.service.pay_past_due(&b).await, Err(BillingError::NoPastDue { .. }));
    h.service.report_usage_delta(&b, 1).await.unwrap();
}

#[tokio::test]
async fn identical_content_shares_one_reference() {
    let h = harness();
    let (a, b) = (account(1), account(2));

    let first = h.service.put_file_entry(&a, &name("cat.gif"), blob(64, 7)).await.unwrap();
    let second = h.service.put_file_entry(&b, &name("copy.gif"), blob(64, 7)).await.unwrap();

    assert!(!first.was_duplicate);
    assert!(second.was_duplicate);
    assert_eq!(first.entry.content_hash, second.entry.content_hash);
    assert_eq!(h.service.refs().count(&first.entry.content_hash).await.unwrap(), Some(2));
    assert_eq!(h.pinning.pinned_count(), 1);

    h.service.delete_file_entry(&a, &name("cat.gif")).await.unwrap();
    assert!(h.pinning.is_pinned(&first.entry.content_hash));

    h.service.delete_file_entry(&b, &name("copy.gif")).await.unwrap();
    assert!(!h.pinning.is_pinned(&first.entry.content_hash));
    assert_eq!(h.service.refs().count(&first.entry.content_hash).await.unwrap(), None);
}

#[tokio::test]
async fn deleting_missing_file_changes_nothing() {
    let h = harness();
    let a = account(3);

    h.service.put_file_entry(&a, &name("kept"), blob(10, 3)).await.unwrap();
    let before = {
        let mut keys = Vec::new();
        for prefix in ["usage/", "refcount/", "files/"] {
            for entry in h.store.list(prefix).await.unwrap() {
                keys.push((entry.key.clone(), h.store.get(&entry.key).await.unwrap()));
            }
        }
        keys
    };

    assert!(!h.service.delete_file_entry(&a, &name("missing")).await.unwrap());

    let mut after = Vec::new();
    for prefix in ["usage/", "refcount/", "files/"] {
        for entry in h.store.list(prefix).await.unwrap() {
            after.push((entry.key.clone(), h.store.get(&entry.key).await.unwrap()));
        }
    }
    assert_eq!(before, after);
}

#[tokio::test]
async fn sweep_isolates_failures_and_keeps_debt_stable() {
    let h = harness();
    let accounts: Vec<_> = (1..=8).map(account).collect();
    for (i, a) in accounts.iter().enumerate() {
        h.service.report_usage_delta(a, 100 * (i as i64 + 1)).await.unwrap();
    }
    h.clock.advance(10);
    let failing = account(5);
    h.ledger.fail_for(failing);

    let report = h.service.run_settlement_sweep().await.unwrap();
    assert_eq!(report.len(), 8);
    for (i, a) in accounts.iter().enumerate() {
        let amount = U256::from(20 * (i as u64 + 1));
        if *a == failing {
            assert_eq!(report.outcome(a), Some(&SweepOutcome::DebtRecorded { amount }));
        } else {
            assert_eq!(report.outcome(a), Some(&SweepOutcome::Charged { amount }));
            assert_eq!(h.service.billing_status(a).await.unwrap(), BillingStatus::Current);
        }
    }
    assert_eq!(h.service.past_due_amount(&failing).await.unwrap(), U256::from(100));

    // More usage accrues, but the debt is re-attempted as is.
    h.clock.advance(1_000);
    let report = h.service.run_settlement_sweep().await.unwrap();
    assert_eq!(
        report.outcome(&failing),
        Some(&SweepOutcome::DebtOutstanding { amount: U256::from(100) })
    );
    assert_eq!(h.service.past_due_amount(&failing).await.unwrap(), U256::from(100));
    assert_eq!(h.ledger.charged_total(&failing), U256::ZERO);
}

#[tokio::test]
async fn overwrite_moves_usage_to_new_content() {
    let h = harness();
    let a = account(4);

    let old = h.service.put_file_entry(&a, &name("doc"), blob(100, 1)).await.unwrap();
    h.clock.advance(10);
    let new = h.service.put_file_entry(&a, &name("doc"), blob(40, 2)).await.unwrap();
    h.clock.advance(10);

    assert_eq!(new.replaced.as_ref(), Some(&old.entry));
    assert_eq!(h.service.usage().accrued_units(&a).await.unwrap(), U256::from(1_400));
    assert_eq!(h.pinning.released(), vec![old.entry.content_hash]);

    let listed = h.service.list_file_entries(&a).await.unwrap();
    assert_eq!(listed, vec![(name("doc"), new.entry)]);
}

#[tokio::test]
async fn redb_backend_end_to_end() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(RedbKvStore::open(dir.path().join("pinmeter.redb")).unwrap());
    let h = harness_with(store);
    let a = account(9);

    h.service.put_file_entry(&a, &name("one"), blob(250, 9)).await.unwrap();
    h.clock.advance(20);
    assert_eq!(h.service.current_period_amount(&a).await.unwrap(), U256::from(100));

    let report = h.service.run_settlement_sweep().await.unwrap();
    assert_eq!(report.outcome(&a), Some(&SweepOutcome::Charged { amount: U256::from(100) }));
    assert_eq!(h.service.get_file_entry(&a, &name("one")).await.unwrap().unwrap().size_bytes, 250);
}

/// Ledger whose charges wait until released by the test.
struct GatedLedger {
    inner: ScriptedLedger,
    entered: Notify,
    gate: Notify,
}

#[async_trait::async_trait]
impl SettlementLedger for GatedLedger {
    async fn charge(&self, account: Account, amount: Amount) -> Result<(), LedgerError> {
        self.entered.notify_one();
        self.gate.notified().await;
        self.inner.charge(account, amount).await
    }

    async fn record_payment(&self, account: Account, amount: Amount) -> Result<(), LedgerError> {
        self.inner.record_payment(account, amount).await
    }
}

#[tokio::test]
async fn mutation_waiting_on_settlement_sees_new_debt() {
    let ledger = Arc::new(GatedLedger {
        inner: ScriptedLedger::new(),
        entered: Notify::new(),
        gate: Notify::new(),
    });
    let clock = Arc::new(ManualClock::new(1_700_000_000));
    let service = Arc::new(BillingService::new(
        &BillingArgs::default(),
        Arc::new(MemoryKvStore::new()),
        Arc::new(MemoryPinning::new()),
        ledger.clone(),
        clock.clone(),
    ));
    let b = account(0xb);

    service.report_usage_delta(&b, 500).await.unwrap();
    clock.advance(50);
    ledger.inner.fail_for(b);

    let sweep = tokio::spawn({
        let service = service.clone();
        async move { service.run_settlement_sweep().await }
    });
    ledger.entered.notified().await;

    // The charge is in flight; a put for the same account must wait for its outcome.
    let put = tokio::spawn({
        let service = service.clone();
        async move { service.put_file_entry(&b, &name("late"), blob(10, 1)).await }
    });
    for _ in 0..8 {
        tokio::task::yield_now().await;
    }
    assert!(!put.is_finished());

    ledger.gate.notify_one();
    let report = sweep.await.unwrap().unwrap();
    assert_eq!(report.outcome(&b), Some(&SweepOutcome::DebtRecorded { amount: U256::from(500) }));

    assert_matches!(put.await.unwrap(), Err(BillingError::PastDue { .. }));
    assert_eq!(service.get_file_entry(&b, &name("late")).await.unwrap(), None);
}
