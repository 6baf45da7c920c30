use std::collections::BTreeSet;

use alloy_primitives::keccak256;
use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use pinmeter_api::{ContentHash, PinnedContent, PinningError, PinningService};

#[derive(Debug, Default)]
struct State {
    pinned: BTreeSet<ContentHash>,
    released: Vec<ContentHash>,
    fail_stores: bool,
    fail_releases: bool,
}

/// Pinning service keeping content hashes in memory.
///
/// Content is addressed by its keccak-256 digest.
#[derive(Debug, Default)]
pub struct MemoryPinning {
    state: Mutex<State>,
}

impl MemoryPinning {
    /// Empty service with no failures armed.
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent `store` fail.
    pub fn fail_stores(&self, fail: bool) {
        self.state.lock().fail_stores = fail;
    }

    /// Make every subsequent `release` fail.
    pub fn fail_releases(&self, fail: bool) {
        self.state.lock().fail_releases = fail;
    }

    /// Whether `hash` is currently pinned.
    pub fn is_pinned(&self, hash: &ContentHash) -> bool {
        self.state.lock().pinned.contains(hash)
    }

    /// Number of distinct pinned contents.
    pub fn pinned_count(&self) -> usize {
        self.state.lock().pinned.len()
    }

    /// Successful releases, in order.
    pub fn released(&self) -> Vec<ContentHash> {
        self.state.lock().released.clone()
    }
}

#[async_trait]
impl PinningService for MemoryPinning {
    async fn store(&self, content: Bytes) -> Result<PinnedContent, PinningError> {
        let mut state = self.state.lock();
        if state.fail_stores {
            return Err(PinningError::Unavailable("store failure armed".into()));
        }
        let content_hash = ContentHash::new(keccak256(&content).to_string())
            .map_err(|e| PinningError::Rejected(e.to_string()))?;
        let was_duplicate = !state.pinned.insert(content_hash.clone());
        Ok(PinnedContent { content_hash, size_bytes: content.len() as u64, was_duplicate })
    }

    async fn release(&self, hash: &ContentHash) -> Result<(), PinningError> {
        let mut state = self.state.lock();
        if state.fail_releases {
            return Err(PinningError::Unavailable("release failure armed".into()));
        }
        state.pinned.remove(hash);
        state.released.push(hash.clone());
        Ok(())
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_duplicate_detection() {
        let pinning = MemoryPinning::new();
        let first = pinning.store(Bytes::from_static(b"abc")).await.unwrap();
        let second = pinning.store(Bytes::from_static(b"abc")).await.unwrap();

        assert!(!first.was_duplicate);
        assert!(second.was_duplicate);
        assert_eq!(first.content_hash, second.content_hash);
        assert_eq!(first.size_bytes, 3);

        pinning.release(&first.content_hash).await.unwrap();
        assert!(!pinning.is_pinned(&first.content_hash));
        assert_eq!(pinning.pinned_count(), 0);
    }
}
