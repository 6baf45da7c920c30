//! In-memory [`KvStore`].

use std::collections::BTreeMap;

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::RwLock;

use crate::{DatabaseError, KvStore, ListEntry};

/// Ordered in-memory key/value store.
///
/// A single lock guards the whole map, so every call (including compare-and-swap) is atomic.
#[derive(Debug, Default)]
pub struct MemoryKvStore {
    entries: RwLock<BTreeMap<String, Bytes>>,
}

impl MemoryKvStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored keys.
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// Whether the store holds no keys.
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// All keys currently stored, in order.
    pub fn keys(&self) -> Vec<String> {
        self.entries.read().keys().cloned().collect()
    }
}

#[async_trait]
impl KvStore for MemoryKvStore {
    async fn get(&self, key: &str) -> Result<Option<Bytes>, DatabaseError> {
        Ok(self.entries.read().get(key).cloned())
    }

    async fn put(&self, key: &str, value: Bytes) -> Result<(), DatabaseError> {
        self.entries.write().insert(key.to_owned(), value);
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), DatabaseError> {
        self.entries.write().remove(key);
        Ok(())
    }

    async fn list(&self, prefix: &str) -> Result<Vec<ListEntry>, DatabaseError> {
        let entries = self.entries.read();
        Ok(entries
            .range(prefix.to_owned()..)
            .take_while(|(key, _)| key.starts_with(prefix))
            .map(|(key, value)| ListEntry {
                key: key.clone(),
                size: value.len() as u64,
            })
            .collect())
    }

    async fn compare_and_swap(
        &self,
        key: &str,
        expected: Option<&[u8]>,
        new: Option<Bytes>,
    ) -> Result<bool, DatabaseError> {
        let mut entries = self.entries.write();
        if entries.get(key).map(|v| &v[..]) != expected {
            return Ok(false);
        }
        match new {
            Some(value) => {
                entries.insert(key.to_owned(), value);
            }
            None => {
                entries.remove(key);
            }
        }
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_put_get_delete() {
        let store = MemoryKvStore::new();
        assert_eq!(store.get("a").await.unwrap(), None);

        store.put("a", Bytes::from_static(b"1")).await.unwrap();
        assert_eq!(store.get("a").await.unwrap(), Some(Bytes::from_static(b"1")));

        store.delete("a").await.unwrap();
        assert_eq!(store.get("a").await.unwrap(), None);

        // Deleting twice is fine
        store.delete("a").await.unwrap();
    }

    #[tokio::test]
    async fn test_list_prefix_ordered() {
        let store = MemoryKvStore::new();
        store.put("files/b", Bytes::from_static(b"xx")).await.unwrap();
        store.put("files/a", Bytes::from_static(b"x")).await.unwrap();
        store.put("filesz", Bytes::from_static(b"x")).await.unwrap();
        store.put("usage/a", Bytes::from_static(b"x")).await.unwrap();

        let listed = store.list("files/").await.unwrap();
        assert_eq!(
            listed,
            vec![
                ListEntry { key: "files/a".into(), size: 1 },
                ListEntry { key: "files/b".into(), size: 2 },
            ]
        );
    }

    #[tokio::test]
    async fn test_compare_and_swap() {
        let store = MemoryKvStore::new();

        // Insert only if absent
        assert!(store.compare_and_swap("k", None, Some(Bytes::from_static(b"1"))).await.unwrap());
        assert!(!store.compare_and_swap("k", None, Some(Bytes::from_static(b"2"))).await.unwrap());

        // Stale expectation is rejected
        let swapped = store
            .compare_and_swap("k", Some(&b"0"[..]), Some(Bytes::from_static(b"2")))
            .await
            .unwrap();
        assert!(!swapped);
        assert_eq!(store.get("k").await.unwrap(), Some(Bytes::from_static(b"1")));

        // Conditional delete
        assert!(store.compare_and_swap("k", Some(&b"1"[..]), None).await.unwrap());
        assert!(store.is_empty());

        // Absent -> absent is a successful no-op
        assert!(store.compare_and_swap("k", None, None).await.unwrap());
    }
}
