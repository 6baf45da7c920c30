//! [redb](https://docs.rs/redb) backend for [`pinmeter_storage::KvStore`].
//!
//! All keys live in a single table. Compare-and-swap runs inside one write transaction, and
//! redb serializes write transactions, so the check and the write are atomic. Blocking redb
//! calls are moved off the async runtime with [`tokio::task::spawn_blocking`].

use std::fmt::Display;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use pinmeter_storage::{DatabaseError, KvStore, ListEntry};
use redb::{Database, ReadableTable, TableDefinition};
use tracing::debug;

const KV_TABLE: TableDefinition<'static, &str, &[u8]> = TableDefinition::new("kv");

/// Persistent [`KvStore`] backed by a redb file.
#[derive(Clone)]
pub struct RedbKvStore {
    db: Arc<Database>,
}

impl std::fmt::Debug for RedbKvStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedbKvStore").finish_non_exhaustive()
    }
}

impl RedbKvStore {
    /// Open the database at `path`, creating the file and table if needed.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, DatabaseError> {
        let path = path.as_ref();
        let db = Database::create(path).map_err(backend)?;

        let txn = db.begin_write().map_err(backend)?;
        txn.open_table(KV_TABLE).map_err(backend)?;
        txn.commit().map_err(backend)?;

        debug!(path = %path.display(), "opened redb store");
        Ok(Self { db: Arc::new(db) })
    }

    async fn blocking<T, F>(&self, op: F) -> Result<T, DatabaseError>
    where
        T: Send + 'static,
        F: FnOnce(&Database) -> Result<T, DatabaseError> + Send + 'static,
    {
        let db = Arc::clone(&self.db);
        tokio::task::spawn_blocking(move || op(&db))
            .await
            .map_err(backend)?
    }
}

fn backend<E: Display>(err: E) -> DatabaseError {
    DatabaseError::Backend(err.to_string())
}

#[async_trait]
impl KvStore for RedbKvStore {
    async fn get(&self, key: &str) -> Result<Option<Bytes>, DatabaseError> {
        let key = key.to_owned();
        self.blocking(move |db| {
            let txn = db.begin_read().map_err(backend)?;
            let table = txn.open_table(KV_TABLE).map_err(backend)?;
            let value = table.get(key.as_str()).map_err(backend)?;
            Ok(value.map(|guard| Bytes::copy_from_slice(guard.value())))
        })
        .await
    }

    async fn put(&self, key: &str, value: Bytes) -> Result<(), DatabaseError> {
        let key = key.to_owned();
        self.blocking(move |db| {
            let txn = db.begin_write().map_err(backend)?;
            {
                let mut table = txn.open_table(KV_TABLE).map_err(backend)?;
                table.insert(key.as_str(), value.as_ref()).map_err(backend)?;
            }
            txn.commit().map_err(backend)
        })
        .await
    }

    async fn delete(&self, key: &str) -> Result<(), DatabaseError> {
        let key = key.to_owned();
        self.blocking(move |db| {
            let txn = db.begin_write().map_err(backend)?;
            {
                let mut table = txn.open_table(KV_TABLE).map_err(backend)?;
                table.remove(key.as_str()).map_err(backend)?;
            }
            txn.commit().map_err(backend)
        })
        .await
    }

    async fn list(&self, prefix: &str) -> Result<Vec<ListEntry>, DatabaseError> {
        let prefix = prefix.to_owned();
        self.blocking(move |db| {
            let txn = db.begin_read().map_err(backend)?;
            let table = txn.open_table(KV_TABLE).map_err(backend)?;

            let mut entries = Vec::new();
            for item in table.range(prefix.as_str()..).map_err(backend)? {
                let (key, value) = item.map_err(backend)?;
                let key = key.value();
                if !key.starts_with(prefix.as_str()) {
                    break;
                }
                entries.push(ListEntry {
                    key: key.to_owned(),
                    size: value.value().len() as u64,
                });
            }
            Ok(entries)
        })
        .await
    }

    async fn compare_and_swap(
        &self,
        key: &str,
        expected: Option<&[u8]>,
        new: Option<Bytes>,
    ) -> Result<bool, DatabaseError> {
        let key = key.to_owned();
        let expected = expected.map(<[u8]>::to_vec);
        self.blocking(move |db| {
            let txn = db.begin_write().map_err(backend)?;
            {
                let mut table = txn.open_table(KV_TABLE).map_err(backend)?;
                let matches = {
                    let current = table.get(key.as_str()).map_err(backend)?;
                    current.as_ref().map(|guard| guard.value()) == expected.as_deref()
                };
                if !matches {
                    return Ok(false);
                }
                match new {
                    Some(value) => {
                        table.insert(key.as_str(), value.as_ref()).map_err(backend)?;
                    }
                    None => {
                        table.remove(key.as_str()).map_err(backend)?;
                    }
                }
            }
            txn.commit().map_err(backend)?;
            Ok(true)
        })
        .await
    }
}
