//! File entries keyed by `(account, filename)`.
//!
//! Every mutation keeps three things consistent: the pinned content, its reference count, and
//! the owner's usage. Mutations of the same entry are serialized through a lock stripe so two
//! concurrent writers cannot both observe the same previous entry.

use std::sync::Arc;

use bytes::Bytes;
use pinmeter_api::{Account, ContentHash, Filename, PinningService};
use pinmeter_storage::{KvStore, KvStoreExt, decode};
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument, warn};

use crate::{
    BillingError, constants::ENTRY_LOCK_STRIPES, keys, locks::LockStripes, refcount::RefCounter,
    usage::UsageLedger,
};

/// A named file owned by an account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileEntry {
    /// Hash of the stored content.
    pub content_hash: ContentHash,
    /// Size of the content in bytes.
    pub size_bytes: u64,
}

/// Result of storing a file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PutOutcome {
    /// The entry now stored under the filename.
    pub entry: FileEntry,
    /// The pinning service already held this content.
    pub was_duplicate: bool,
    /// The entry that was overwritten, if any.
    pub replaced: Option<FileEntry>,
}

/// Adapter storing file entries and keeping pins, reference counts and usage in step.
pub struct FileEntryStore {
    store: Arc<dyn KvStore>,
    pinning: Arc<dyn PinningService>,
    refs: RefCounter,
    usage: UsageLedger,
    locks: LockStripes,
}

impl std::fmt::Debug for FileEntryStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileEntryStore")
            .field("pinning", &self.pinning.name())
            .field("stripes", &self.locks.len())
            .finish()
    }
}

impl FileEntryStore {
    /// Create an entry store.
    pub fn new(
        store: Arc<dyn KvStore>,
        pinning: Arc<dyn PinningService>,
        refs: RefCounter,
        usage: UsageLedger,
    ) -> Self {
        Self { store, pinning, refs, usage, locks: LockStripes::new(ENTRY_LOCK_STRIPES) }
    }

    /// Store `content` under `filename`, replacing any previous entry.
    ///
    /// Content is pinned first; a pinning failure leaves every record untouched. A replaced
    /// entry gives up its reference and its size before the new content takes both. When the
    /// new content hashes the same as the old, the reference is kept as is. Content released
    /// by a concurrent writer between pinning and taking the reference is pinned again.
    #[instrument(skip_all, fields(%account, %filename, len = content.len()))]
    pub async fn put(
        &self,
        account: &Account,
        filename: &Filename,
        content: Bytes,
    ) -> Result<PutOutcome, BillingError> {
        let key = keys::file(account, filename);
        let _guard = self.locks.lock(&key).await;

        let generation = self.refs.release_generation();
        let pinned = self.pinning.store(content.clone()).await?;
        let entry = FileEntry { content_hash: pinned.content_hash, size_bytes: pinned.size_bytes };

        let replaced: Option<FileEntry> = self.store.get_record(&key).await?;
        let same_content =
            replaced.as_ref().is_some_and(|old| old.content_hash == entry.content_hash);

        if let Some(old) = &replaced {
            if !same_content {
                self.release_reference(&old.content_hash).await?;
            }
            self.usage.report_delta(account, -signed(old.size_bytes)).await?;
        }
        if !same_content {
            self.refs
                .acquire_stored(&entry.content_hash, &content, generation, self.pinning.as_ref())
                .await?;
        }
        self.usage.report_delta(account, signed(entry.size_bytes)).await?;
        self.store.put_record(&key, &entry).await?;

        debug!(hash = %entry.content_hash, size = entry.size_bytes, "file entry stored");
        Ok(PutOutcome { entry, was_duplicate: pinned.was_duplicate, replaced })
    }

    /// Remove the entry under `filename`. Returns `false` if there was none.
    #[instrument(skip_all, fields(%account, %filename))]
    pub async fn delete(
        &self,
        account: &Account,
        filename: &Filename,
    ) -> Result<bool, BillingError> {
        let key = keys::file(account, filename);
        let _guard = self.locks.lock(&key).await;

        let Some(entry) = self.store.get_record::<FileEntry>(&key).await? else {
            debug!("no file entry to delete");
            return Ok(false);
        };

        self.release_reference(&entry.content_hash).await?;
        self.usage.report_delta(account, -signed(entry.size_bytes)).await?;
        self.store.delete(&key).await?;

        debug!(hash = %entry.content_hash, "file entry deleted");
        Ok(true)
    }

    /// The entry under `filename`, if any.
    pub async fn get(
        &self,
        account: &Account,
        filename: &Filename,
    ) -> Result<Option<FileEntry>, BillingError> {
        Ok(self.store.get_record(&keys::file(account, filename)).await?)
    }

    /// All entries owned by `account`, ordered by filename.
    pub async fn list(
        &self,
        account: &Account,
    ) -> Result<Vec<(Filename, FileEntry)>, BillingError> {
        list_entries(self.store.as_ref(), account).await
    }

    /// Drop one reference to `hash`. A failed unpin is logged and tolerated.
    async fn release_reference(&self, hash: &ContentHash) -> Result<(), BillingError> {
        match self.refs.release(hash, self.pinning.as_ref()).await {
            Ok(_) => Ok(()),
            Err(BillingError::Unpin { hash, source }) => {
                metrics::counter!("billing.unpin_failures_total").increment(1);
                warn!(%hash, %source, "failed to release content, will retry on next release");
                Ok(())
            }
            Err(e) => Err(e),
        }
    }
}

/// Read every file entry owned by `account` directly from `store`.
pub async fn list_entries(
    store: &dyn KvStore,
    account: &Account,
) -> Result<Vec<(Filename, FileEntry)>, BillingError> {
    let prefix = keys::files(account);
    let mut entries = Vec::new();
    for listed in store.list(&prefix).await? {
        let Some(raw) = store.get(&listed.key).await? else {
            // Deleted between list and get.
            continue;
        };
        let name = listed.key.strip_prefix(&prefix).unwrap_or(&listed.key);
        let filename = Filename::new(name)?;
        entries.push((filename, decode(&listed.key, &raw)?));
    }
    Ok(entries)
}

fn signed(size: u64) -> i64 {
    i64::try_from(size).unwrap_or(i64::MAX)
}
