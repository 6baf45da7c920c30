//! CLI arguments for billing configuration.

use std::time::Duration;

use clap::Args;
use serde::{Deserialize, Serialize};

use crate::{config::BillingConfig, constants::*};

/// Billing CLI arguments, also used as the `[billing]` TOML section.
#[derive(Debug, Args, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[command(next_help_heading = "Billing")]
#[serde(default)]
pub struct BillingArgs {
    /// Byte-seconds per smallest currency unit
    #[arg(long = "billing.price-denominator", default_value_t = DEFAULT_PRICE_DENOMINATOR)]
    pub price_denominator: u64,

    /// Accounts settled in parallel during a sweep
    #[arg(long = "billing.sweep-concurrency", default_value_t = DEFAULT_SWEEP_CONCURRENCY)]
    pub sweep_concurrency: usize,

    /// Seconds between scheduled settlement sweeps
    #[arg(long = "billing.sweep-interval", default_value_t = DEFAULT_SWEEP_INTERVAL_SECS)]
    pub sweep_interval_secs: u64,

    /// Attempts per contended storage update
    #[arg(long = "billing.max-update-attempts", default_value_t = DEFAULT_MAX_UPDATE_ATTEMPTS)]
    pub max_update_attempts: u32,
}

impl Default for BillingArgs {
    fn default() -> Self {
        Self {
            price_denominator: DEFAULT_PRICE_DENOMINATOR,
            sweep_concurrency: DEFAULT_SWEEP_CONCURRENCY,
            sweep_interval_secs: DEFAULT_SWEEP_INTERVAL_SECS,
            max_update_attempts: DEFAULT_MAX_UPDATE_ATTEMPTS,
        }
    }
}

impl BillingArgs {
    /// Validate argument values.
    pub fn validate(&self) -> Result<(), String> {
        if self.price_denominator == 0 {
            return Err("price-denominator must be positive".to_string());
        }
        if self.sweep_concurrency == 0 {
            return Err("sweep-concurrency must be positive".to_string());
        }
        if self.sweep_interval_secs == 0 {
            return Err("sweep-interval must be positive".to_string());
        }
        if self.max_update_attempts == 0 {
            return Err("max-update-attempts must be positive".to_string());
        }
        Ok(())
    }
}

impl BillingConfig for BillingArgs {
    fn price_denominator(&self) -> u64 {
        self.price_denominator
    }

    fn sweep_concurrency(&self) -> usize {
        self.sweep_concurrency
    }

    fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }

    fn max_update_attempts(&self) -> u32 {
        self.max_update_attempts
    }
}
