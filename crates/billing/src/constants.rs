//! Default constants for metering and settlement.

/// Byte-seconds per smallest currency unit (wei).
pub const DEFAULT_PRICE_DENOMINATOR: u64 = 50;

/// Accounts settled in parallel during one sweep.
pub const DEFAULT_SWEEP_CONCURRENCY: usize = 16;

/// Billing period: 30 days.
pub const DEFAULT_SWEEP_INTERVAL_SECS: u64 = 30 * 24 * 60 * 60;

/// Attempts a contended read-modify-write makes before failing.
pub const DEFAULT_MAX_UPDATE_ATTEMPTS: u32 = pinmeter_storage::DEFAULT_MAX_UPDATE_ATTEMPTS;

/// Number of lock stripes serializing mutations of the same file entry.
pub(crate) const ENTRY_LOCK_STRIPES: usize = 64;

/// Number of lock stripes serializing reference count changes of the same content.
pub(crate) const CONTENT_LOCK_STRIPES: usize = 64;

/// Number of lock stripes serializing the past-due check with an account's mutations.
pub(crate) const ACCOUNT_LOCK_STRIPES: usize = 64;
