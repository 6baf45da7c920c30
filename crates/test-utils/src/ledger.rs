use std::collections::HashSet;

use alloy_primitives::U256;
use async_trait::async_trait;
use parking_lot::Mutex;
use pinmeter_api::{Account, LedgerError, SettlementLedger};

#[derive(Debug, Default)]
struct State {
    failing: HashSet<Account>,
    fail_all: bool,
    charges: Vec<(Account, U256)>,
    payments: Vec<(Account, U256)>,
}

/// Settlement ledger whose failures are scripted per account.
///
/// Only successful charges are journaled.
#[derive(Debug, Default)]
pub struct ScriptedLedger {
    state: Mutex<State>,
}

impl ScriptedLedger {
    /// Ledger accepting every charge.
    pub fn new() -> Self {
        Self::default()
    }

    /// Refuse charges to `account`.
    pub fn fail_for(&self, account: Account) {
        self.state.lock().failing.insert(account);
    }

    /// Accept charges to `account` again.
    pub fn succeed_for(&self, account: Account) {
        self.state.lock().failing.remove(&account);
    }

    /// Refuse every charge.
    pub fn fail_all(&self, fail: bool) {
        self.state.lock().fail_all = fail;
    }

    /// Successful charges, sorted by account.
    pub fn charges(&self) -> Vec<(Account, U256)> {
        let mut charges = self.state.lock().charges.clone();
        charges.sort();
        charges
    }

    /// Recorded payments, in order.
    pub fn payments(&self) -> Vec<(Account, U256)> {
        self.state.lock().payments.clone()
    }

    /// Sum successfully charged to `account`.
    pub fn charged_total(&self, account: &Account) -> U256 {
        self.state
            .lock()
            .charges
            .iter()
            .filter(|(a, _)| a == account)
            .fold(U256::ZERO, |sum, (_, amount)| sum + *amount)
    }
}

#[async_trait]
impl SettlementLedger for ScriptedLedger {
    async fn charge(&self, account: Account, amount: U256) -> Result<(), LedgerError> {
        let mut state = self.state.lock();
        if state.fail_all || state.failing.contains(&account) {
            return Err(LedgerError::InsufficientFunds);
        }
        state.charges.push((account, amount));
        Ok(())
    }

    async fn record_payment(&self, account: Account, amount: U256) -> Result<(), LedgerError> {
        self.state.lock().payments.push((account, amount));
        Ok(())
    }

    fn name(&self) -> &'static str {
        "scripted"
    }
}
