/// Database error type.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum DatabaseError {
    /// Failed to encode a record for storage.
    #[error("failed to encode record: {0}")]
    Encode(String),
    /// Failed to decode a record read from storage.
    #[error("failed to decode record at {key}: {reason}")]
    Decode {
        /// Key the malformed value was read from.
        key: String,
        /// Decoder message.
        reason: String,
    },
    /// A conditional update kept losing to concurrent writers.
    #[error("gave up updating {key} after {attempts} conflicting attempts")]
    Contention {
        /// Contended key.
        key: String,
        /// Number of attempts made.
        attempts: u32,
    },
    /// The storage backend failed.
    #[error("storage backend error: {0}")]
    Backend(String),
}
