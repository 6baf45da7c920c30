//! Key/value storage for pinmeter.
//!
//! Every persisted aggregate (usage records, debt records, reference counts, file entries)
//! lives as a flat `key -> value` pair in a [`KvStore`]. Values are JSON text produced by
//! [`encode`] and read back with [`decode`].
//!
//! Read-modify-write cycles never use a plain overwrite: callers go through
//! [`KvStore::compare_and_swap`] (directly, or via [`KvStoreExt::update_record`]) so that two
//! writers racing on the same key cannot lose each other's update.

use async_trait::async_trait;
use bytes::Bytes;

mod error;
mod memory;
mod record;

pub use error::DatabaseError;
pub use memory::MemoryKvStore;
pub use record::{KvStoreExt, decode, encode};

/// Default number of attempts [`KvStoreExt::update_record`] makes before giving up.
pub const DEFAULT_MAX_UPDATE_ATTEMPTS: u32 = 32;

/// A key and the size of the value stored under it, as returned by [`KvStore::list`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListEntry {
    /// Full key.
    pub key: String,
    /// Size of the stored value in bytes.
    pub size: u64,
}

/// Async key/value store with atomic conditional updates.
///
/// Implementations must make [`compare_and_swap`](KvStore::compare_and_swap) atomic with
/// respect to every other mutating call on the same key.
#[async_trait]
pub trait KvStore: Send + Sync + 'static {
    /// Fetch the value stored at `key`.
    async fn get(&self, key: &str) -> Result<Option<Bytes>, DatabaseError>;

    /// Unconditionally store `value` at `key`.
    async fn put(&self, key: &str, value: Bytes) -> Result<(), DatabaseError>;

    /// Remove `key`. Removing an absent key is not an error.
    async fn delete(&self, key: &str) -> Result<(), DatabaseError>;

    /// List every key starting with `prefix`, in ascending key order.
    async fn list(&self, prefix: &str) -> Result<Vec<ListEntry>, DatabaseError>;

    /// Replace the value at `key` with `new` if the current value equals `expected`.
    ///
    /// `None` on either side means "absent": `expected = None` only matches a missing key and
    /// `new = None` deletes it. Returns `false` without writing when the current value differs.
    async fn compare_and_swap(
        &self,
        key: &str,
        expected: Option<&[u8]>,
        new: Option<Bytes>,
    ) -> Result<bool, DatabaseError>;
}
