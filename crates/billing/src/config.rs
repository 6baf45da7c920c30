//! Billing configuration.

use std::{path::Path, time::Duration};

use alloy_primitives::U256;

use crate::{args::BillingArgs, constants::*};

/// Tunables of the metering and settlement core.
pub trait BillingConfig: Send + Sync {
    /// Byte-seconds per smallest currency unit.
    fn price_denominator(&self) -> u64;

    /// Accounts settled in parallel during one sweep.
    fn sweep_concurrency(&self) -> usize;

    /// Time between scheduled sweeps.
    fn sweep_interval(&self) -> Duration;

    /// Attempts a contended read-modify-write makes before failing.
    fn max_update_attempts(&self) -> u32;

    /// The price denominator as a currency amount.
    fn denominator(&self) -> U256 {
        U256::from(self.price_denominator().max(1))
    }
}

/// Compiled-in defaults.
#[derive(Clone, Copy, Debug, Default)]
pub struct DefaultBillingConfig;

impl BillingConfig for DefaultBillingConfig {
    fn price_denominator(&self) -> u64 {
        DEFAULT_PRICE_DENOMINATOR
    }

    fn sweep_concurrency(&self) -> usize {
        DEFAULT_SWEEP_CONCURRENCY
    }

    fn sweep_interval(&self) -> Duration {
        Duration::from_secs(DEFAULT_SWEEP_INTERVAL_SECS)
    }

    fn max_update_attempts(&self) -> u32 {
        DEFAULT_MAX_UPDATE_ATTEMPTS
    }
}

/// Errors loading a billing configuration file.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The file could not be read.
    #[error("failed to read {path}: {source}")]
    Io {
        /// Path of the configuration file.
        path: String,
        /// Underlying I/O failure.
        source: std::io::Error,
    },

    /// The file is not valid TOML for [`BillingArgs`].
    #[error("failed to parse billing config: {0}")]
    Parse(#[from] toml::de::Error),

    /// The values are inconsistent.
    #[error("invalid billing config: {0}")]
    Invalid(String),
}

/// Load and validate billing settings from a TOML file.
///
/// Missing keys fall back to their defaults.
pub fn load_toml(path: &Path) -> Result<BillingArgs, ConfigError> {
    let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.display().to_string(),
        source,
    })?;
    parse_toml(&raw)
}

/// Parse and validate billing settings from TOML text.
pub fn parse_toml(raw: &str) -> Result<BillingArgs, ConfigError> {
    let args: BillingArgs = toml::from_str(raw)?;
    args.validate().map_err(ConfigError::Invalid)?;
    Ok(args)
}
