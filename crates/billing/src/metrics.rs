//! Settlement metrics.

use metrics::Counter;

use crate::sweep::SweepOutcome;

/// Counters updated by the settlement sweeper.
#[derive(Clone, Debug)]
pub(crate) struct SweepMetrics {
    /// Completed sweeps
    pub(crate) sweeps_total: Counter,
    /// Accounts charged for a closed window
    pub(crate) charged_total: Counter,
    /// Accounts with nothing to charge
    pub(crate) idle_total: Counter,
    /// Failed charges turned into debt
    pub(crate) debt_recorded_total: Counter,
    /// Debts collected
    pub(crate) debt_cleared_total: Counter,
    /// Debts that failed collection again
    pub(crate) debt_outstanding_total: Counter,
    /// Accounts skipped by a storage failure
    pub(crate) failed_total: Counter,
}

impl Default for SweepMetrics {
    fn default() -> Self {
        Self {
            sweeps_total: metrics::counter!("billing.sweep.runs_total"),
            charged_total: metrics::counter!("billing.sweep.charged_total"),
            idle_total: metrics::counter!("billing.sweep.idle_total"),
            debt_recorded_total: metrics::counter!("billing.sweep.debt_recorded_total"),
            debt_cleared_total: metrics::counter!("billing.sweep.debt_cleared_total"),
            debt_outstanding_total: metrics::counter!("billing.sweep.debt_outstanding_total"),
            failed_total: metrics::counter!("billing.sweep.failed_total"),
        }
    }
}

impl SweepMetrics {
    /// Count one per-account outcome.
    pub(crate) fn record(&self, outcome: &SweepOutcome) {
        let counter = match outcome {
            SweepOutcome::Idle => &self.idle_total,
            SweepOutcome::Charged { .. } => &self.charged_total,
            SweepOutcome::DebtRecorded { .. } => &self.debt_recorded_total,
            SweepOutcome::DebtCleared { .. } => &self.debt_cleared_total,
            SweepOutcome::DebtOutstanding { .. } => &self.debt_outstanding_total,
            SweepOutcome::Failed { .. } => &self.failed_total,
        };
        counter.increment(1);
    }

    /// Count a completed sweep.
    pub(crate) fn inc_sweeps(&self) {
        self.sweeps_total.increment(1);
    }
}
