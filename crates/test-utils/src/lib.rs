//! In-memory collaborators for tests.
//!
//! - [`MemoryPinning`] - content-addressed pinning with injectable failures
//! - [`ScriptedLedger`] - settlement ledger with per-account failures and a journal
//! - [`ManualClock`] - clock advanced by hand

mod clock;
mod ledger;
mod pinning;

pub use clock::ManualClock;
pub use ledger::ScriptedLedger;
pub use pinning::MemoryPinning;
