//! Sweep scheduler (runs in its own tokio task).
//!
//! Sweeps run once per interval, the first one a full interval after start. A [`SweepHandle`]
//! can request an immediate sweep. The scheduler stops once every handle is dropped.

use std::{sync::Arc, time::Duration};

use tokio::{
    sync::{mpsc, oneshot},
    time::{Instant, MissedTickBehavior},
};
use tracing::{debug, error, info};

use crate::{BillingError, sweep::{SettlementSweeper, SweepReport}};

/// Commands from handles to the scheduler.
pub enum SweepCommand {
    /// Sweep now, outside the schedule.
    RunNow {
        /// Channel receiving the report.
        response_tx: oneshot::Sender<Result<SweepReport, BillingError>>,
    },
}

/// Periodically runs a [`SettlementSweeper`].
pub struct SweepScheduler {
    sweeper: Arc<SettlementSweeper>,
    interval: Duration,
    command_rx: mpsc::UnboundedReceiver<SweepCommand>,
}

/// Handle to a running [`SweepScheduler`].
#[derive(Clone, Debug)]
pub struct SweepHandle {
    command_tx: mpsc::UnboundedSender<SweepCommand>,
}

impl SweepScheduler {
    /// Create a scheduler and its handle.
    pub fn new(sweeper: Arc<SettlementSweeper>, interval: Duration) -> (Self, SweepHandle) {
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        (Self { sweeper, interval, command_rx }, SweepHandle { command_tx })
    }

    /// Run the schedule until all handles are dropped.
    pub async fn run(mut self) {
        let mut ticker = tokio::time::interval_at(Instant::now() + self.interval, self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        info!(interval = ?self.interval, "sweep scheduler started");

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(e) = self.sweeper.run().await {
                        error!(error = %e, "scheduled sweep failed");
                    }
                }
                cmd = self.command_rx.recv() => match cmd {
                    Some(SweepCommand::RunNow { response_tx }) => {
                        debug!("sweep requested");
                        let _ = response_tx.send(self.sweeper.run().await);
                    }
                    None => {
                        debug!("sweep scheduler shutting down");
                        break;
                    }
                },
            }
        }
    }

    /// Convert self into a spawnable future.
    pub async fn into_task(self) {
        self.run().await;
    }
}

impl SweepHandle {
    /// Sweep now and wait for the report.
    pub async fn run_now(&self) -> Result<SweepReport, BillingError> {
        let (response_tx, response_rx) = oneshot::channel();
        self.command_tx
            .send(SweepCommand::RunNow { response_tx })
            .map_err(|_| BillingError::SchedulerStopped)?;
        response_rx.await.map_err(|_| BillingError::SchedulerStopped)?
    }
}
