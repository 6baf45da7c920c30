//! In-process lock stripes.

use std::{
    collections::hash_map::DefaultHasher,
    hash::{Hash, Hasher},
};

use tokio::sync::{Mutex, MutexGuard};

/// Fixed set of async mutexes selected by key hash.
///
/// Two keys may share a stripe. A holder must never take a second stripe of the same set.
pub(crate) struct LockStripes {
    stripes: Box<[Mutex<()>]>,
}

impl LockStripes {
    pub(crate) fn new(count: usize) -> Self {
        Self { stripes: (0..count.max(1)).map(|_| Mutex::new(())).collect() }
    }

    pub(crate) async fn lock(&self, key: &str) -> MutexGuard<'_, ()> {
        let mut hasher = DefaultHasher::new();
        key.hash(&mut hasher);
        let idx = (hasher.finish() % self.stripes.len() as u64) as usize;
        #[allow(clippy::indexing_slicing)] // idx < len
        let stripe = &self.stripes[idx];
        stripe.lock().await
    }

    pub(crate) fn len(&self) -> usize {
        self.stripes.len()
    }
}

impl std::fmt::Debug for LockStripes {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LockStripes").field("stripes", &self.stripes.len()).finish()
    }
}
