//! Shared primitives and collaborator interfaces for pinmeter.
//!
//! The metering core talks to the outside world only through the traits defined here:
//!
//! - [`PinningService`] - stores content and releases it once nothing references it
//! - [`SettlementLedger`] - moves funds for an account (charges and payment bookkeeping)
//! - [`Clock`] - the source of "now" used for accrual
//!
//! Concrete transports (HTTP pinning APIs, on-chain billing contracts) live outside the core.

mod account;
mod clock;
mod content;
mod error;
mod ledger;
mod pinning;

pub use account::{Account, Filename, MAX_FILENAME_LEN};
pub use alloy_primitives::U256;
pub use clock::{Clock, SystemClock};
pub use content::ContentHash;
pub use error::{InputError, LedgerError, PinningError};
pub use ledger::SettlementLedger;
pub use pinning::{PinnedContent, PinningService};

/// Currency-denominated amount (also used for accrued byte-seconds).
pub type Amount = U256;
