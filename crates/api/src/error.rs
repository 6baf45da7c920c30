//! Error types for inputs and collaborators.
//!
//! Each variant carries typed data so callers can translate failures into user-visible
//! responses without parsing messages.

/// Malformed caller input, rejected before any state is touched.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum InputError {
    /// Account identifier is not a `0x`-prefixed 20-byte hex address.
    #[error("invalid account {input:?}: {reason}")]
    InvalidAccount {
        /// The rejected input.
        input: String,
        /// Why it was rejected.
        reason: String,
    },

    /// Filename is empty.
    #[error("filename must not be empty")]
    EmptyFilename,

    /// Filename exceeds the maximum length.
    #[error("filename is {len} bytes, maximum is {max}")]
    FilenameTooLong {
        /// Length of the rejected filename.
        len: usize,
        /// Maximum accepted length.
        max: usize,
    },

    /// Filename contains a forbidden character.
    #[error("invalid filename: {reason}")]
    InvalidFilename {
        /// Why it was rejected.
        reason: String,
    },

    /// Content hash is empty or contains forbidden characters.
    #[error("invalid content hash {input:?}")]
    InvalidContentHash {
        /// The rejected input.
        input: String,
    },
}

/// Failure reported by the pinning collaborator.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PinningError {
    /// The pinning service could not be reached.
    #[error("pinning service unavailable: {0}")]
    Unavailable(String),

    /// The pinning service refused the request.
    #[error("pinning service rejected request: {0}")]
    Rejected(String),
}

/// Failure reported by the settlement ledger.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LedgerError {
    /// The ledger could not be reached.
    #[error("settlement ledger unavailable: {0}")]
    Unavailable(String),

    /// The account cannot cover the charge.
    #[error("insufficient funds")]
    InsufficientFunds,

    /// The ledger refused the charge.
    #[error("charge rejected: {0}")]
    Rejected(String),
}
