//! Reference counts over content hashes.
//!
//! A count tracks how many file entries point at the same content. Content is released from
//! the pinning service only when the count drops to zero.
//!
//! Every change of one hash's count runs under that hash's lock stripe, and the final release
//! holds it until the count is gone. An acquire therefore lands either before the count reaches
//! zero or after the content has been released, in which case the content is stored again.

use std::sync::{
    Arc,
    atomic::{AtomicU64, Ordering},
};

use bytes::Bytes;
use pinmeter_api::{ContentHash, PinningService};
use pinmeter_storage::{KvStore, KvStoreExt};
use tracing::debug;

use crate::{BillingError, constants::CONTENT_LOCK_STRIPES, keys, locks::LockStripes};

/// Result of dropping one reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReleaseOutcome {
    /// No count existed for the hash.
    Absent,
    /// References remain; content stays pinned.
    Remaining(u64),
    /// The last reference was dropped and the content released.
    Released,
}

/// Content reference counter.
///
/// Clones share the same locks, so every writer of one store must use clones of one counter.
#[derive(Clone)]
pub struct RefCounter {
    store: Arc<dyn KvStore>,
    max_attempts: u32,
    locks: Arc<LockStripes>,
    releases: Arc<AtomicU64>,
}

impl std::fmt::Debug for RefCounter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RefCounter")
            .field("max_attempts", &self.max_attempts)
            .field("stripes", &self.locks.len())
            .finish()
    }
}

impl RefCounter {
    /// Create a counter over `store`.
    pub fn new(store: Arc<dyn KvStore>, max_attempts: u32) -> Self {
        Self {
            store,
            max_attempts,
            locks: Arc::new(LockStripes::new(CONTENT_LOCK_STRIPES)),
            releases: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Current count, `None` if the hash is untracked.
    pub async fn count(&self, hash: &ContentHash) -> Result<Option<u64>, BillingError> {
        Ok(self.store.get_record(&keys::refcount(hash)).await?)
    }

    /// Number of contents released so far. Read it before storing content that will be
    /// passed to [`Self::acquire_stored`].
    pub fn release_generation(&self) -> u64 {
        self.releases.load(Ordering::SeqCst)
    }

    /// Add a reference, creating the count at 1. Returns the new count.
    pub async fn acquire(&self, hash: &ContentHash) -> Result<u64, BillingError> {
        let key = keys::refcount(hash);
        let _guard = self.locks.lock(&key).await;
        self.increment(hash, &key).await
    }

    /// Add a reference to `content`, stored with `pinning` after `generation` was read.
    ///
    /// When no live reference exists and some content was released since `generation`, the
    /// content is stored again before the count is raised. A failed store leaves the count
    /// untouched.
    pub async fn acquire_stored(
        &self,
        hash: &ContentHash,
        content: &Bytes,
        generation: u64,
        pinning: &dyn PinningService,
    ) -> Result<u64, BillingError> {
        let key = keys::refcount(hash);
        let _guard = self.locks.lock(&key).await;

        if self.release_generation() != generation && self.count(hash).await?.unwrap_or(0) == 0 {
            debug!(%hash, "content may have been released since it was stored, storing again");
            pinning.store(content.clone()).await?;
        }
        self.increment(hash, &key).await
    }

    /// Drop a reference.
    ///
    /// When the last reference goes, the count is persisted at zero, `pinning` is asked to
    /// release the content, and only then is the count removed. If the release fails the
    /// zero count stays behind and the next release of the same hash retries it. Dropping a
    /// reference of an untracked hash is a no-op.
    pub async fn release(
        &self,
        hash: &ContentHash,
        pinning: &dyn PinningService,
    ) -> Result<ReleaseOutcome, BillingError> {
        let key = keys::refcount(hash);
        let _guard = self.locks.lock(&key).await;

        let remaining = self
            .store
            .update_record::<u64, _, _>(&key, self.max_attempts, |current| match current {
                None => (None, None),
                Some(count) => {
                    let next = count.saturating_sub(1);
                    (Some(next), Some(next))
                }
            })
            .await?;

        match remaining {
            None => {
                debug!(%hash, "release of untracked content ignored");
                Ok(ReleaseOutcome::Absent)
            }
            Some(count) if count > 0 => {
                debug!(%hash, count, "content reference released");
                Ok(ReleaseOutcome::Remaining(count))
            }
            Some(_) => {
                pinning
                    .release(hash)
                    .await
                    .map_err(|source| BillingError::Unpin { hash: hash.clone(), source })?;
                self.releases.fetch_add(1, Ordering::SeqCst);
                self.store.delete(&key).await?;
                debug!(%hash, pinning = pinning.name(), "content released");
                Ok(ReleaseOutcome::Released)
            }
        }
    }

    /// Raise the count of `hash`. The caller holds the hash's lock.
    async fn increment(&self, hash: &ContentHash, key: &str) -> Result<u64, BillingError> {
        let count = self
            .store
            .update_record::<u64, _, _>(key, self.max_attempts, |current| {
                let next = current.unwrap_or(0).saturating_add(1);
                (Some(next), next)
            })
            .await?;
        debug!(%hash, count, "content reference acquired");
        Ok(count)
    }
}
