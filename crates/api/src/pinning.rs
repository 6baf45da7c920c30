//! Content pinning interface.

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::{ContentHash, PinningError};

/// Result of storing content with the pinning service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PinnedContent {
    /// Hash identifying the stored content.
    pub content_hash: ContentHash,
    /// Size of the content in bytes.
    pub size_bytes: u64,
    /// Whether the content was already pinned, so no new physical storage occurred.
    pub was_duplicate: bool,
}

/// External service that physically stores content.
#[async_trait::async_trait]
pub trait PinningService: Send + Sync + 'static {
    /// Store `content`, returning its hash and size.
    async fn store(&self, content: Bytes) -> Result<PinnedContent, PinningError>;

    /// Release the physical copy of `hash`.
    ///
    /// Releasing content that is already gone must succeed.
    async fn release(&self, hash: &ContentHash) -> Result<(), PinningError>;

    /// Human-readable name for logging.
    fn name(&self) -> &'static str {
        "pinning"
    }
}
