//! Typed JSON records on top of [`KvStore`].

use async_trait::async_trait;
use bytes::Bytes;
use serde::{Serialize, de::DeserializeOwned};
use tracing::trace;

use crate::{DatabaseError, KvStore};

/// Encode a record as JSON text.
pub fn encode<T: Serialize>(value: &T) -> Result<Bytes, DatabaseError> {
    serde_json::to_vec(value)
        .map(Bytes::from)
        .map_err(|e| DatabaseError::Encode(e.to_string()))
}

/// Decode a record read from `key`.
pub fn decode<T: DeserializeOwned>(key: &str, raw: &[u8]) -> Result<T, DatabaseError> {
    serde_json::from_slice(raw).map_err(|e| DatabaseError::Decode {
        key: key.to_owned(),
        reason: e.to_string(),
    })
}

/// Record-level helpers available on every [`KvStore`].
#[async_trait]
pub trait KvStoreExt: KvStore {
    /// Fetch and decode the record at `key`.
    async fn get_record<T>(&self, key: &str) -> Result<Option<T>, DatabaseError>
    where
        T: DeserializeOwned + Send,
    {
        match self.get(key).await? {
            Some(raw) => decode(key, &raw).map(Some),
            None => Ok(None),
        }
    }

    /// Encode and unconditionally store `value` at `key`.
    async fn put_record<T>(&self, key: &str, value: &T) -> Result<(), DatabaseError>
    where
        T: Serialize + Sync,
    {
        self.put(key, encode(value)?).await
    }

    /// Read-modify-write the record at `key` under compare-and-swap.
    ///
    /// `apply` receives the current record (`None` if absent) and returns the record to store
    /// (`None` deletes it) plus an output handed back to the caller. When the stored value
    /// changed between the read and the write, `apply` runs again against the fresh value, up
    /// to `max_attempts` times. `apply` must therefore be free of side effects.
    async fn update_record<T, R, F>(
        &self,
        key: &str,
        max_attempts: u32,
        mut apply: F,
    ) -> Result<R, DatabaseError>
    where
        T: Serialize + DeserializeOwned + Send,
        R: Send,
        F: FnMut(Option<T>) -> (Option<T>, R) + Send,
    {
        for attempt in 1..=max_attempts {
            let current = self.get(key).await?;
            let decoded = match current.as_deref() {
                Some(raw) => Some(decode::<T>(key, raw)?),
                None => None,
            };

            let (next, output) = apply(decoded);
            let next = match next {
                Some(record) => Some(encode(&record)?),
                None => None,
            };

            // Nothing changed, skip the write.
            if next.as_deref() == current.as_deref() {
                return Ok(output);
            }

            if self.compare_and_swap(key, current.as_deref(), next).await? {
                return Ok(output);
            }

            metrics::counter!("storage.cas_conflicts_total").increment(1);
            trace!(key, attempt, "compare-and-swap conflict, retrying");
        }

        Err(DatabaseError::Contention {
            key: key.to_owned(),
            attempts: max_attempts,
        })
    }
}

impl<S: KvStore + ?Sized> KvStoreExt for S {}
