//! URI -> resource lock table
//!
//! One coarse mutex guards the map. It is held only for the lookup/insert;
//! callers take the returned `Arc<ResourceLock>` and block on it after the
//! table mutex has been released, so a slow request on one URI never stalls
//! lookups for another.
//!
//! Entries are never evicted. The table grows with the set of distinct URIs
//! the server has touched.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::constants::LOCK_TABLE_INITIAL_CAPACITY;
use crate::error::{CoreError, CoreResult};
use crate::rwlock::ResourceLock;

/// Map from URI to its resource lock
pub struct LockTable {
    locks: Mutex<HashMap<String, Arc<ResourceLock>>>,
    reader_batch: usize,
}

impl LockTable {
    /// Create an empty table whose locks use the given reader batch bound
    pub fn new(reader_batch: usize) -> CoreResult<Self> {
        if reader_batch == 0 {
            return Err(CoreError::InvalidReaderBatch);
        }
        Ok(Self {
            locks: Mutex::new(HashMap::with_capacity(LOCK_TABLE_INITIAL_CAPACITY)),
            reader_batch,
        })
    }

    /// Return the lock for `uri`, creating it on first use
    ///
    /// Concurrent first calls for the same URI all receive the same instance.
    pub fn get_or_create(&self, uri: &str) -> Arc<ResourceLock> {
        let mut locks = self.locks.lock();
        if let Some(lock) = locks.get(uri) {
            return Arc::clone(lock);
        }
        let lock = Arc::new(ResourceLock::new(self.reader_batch));
        locks.insert(uri.to_owned(), Arc::clone(&lock));
        lock
    }

    /// Lock for `uri` if one has been created
    pub fn get(&self, uri: &str) -> Option<Arc<ResourceLock>> {
        self.locks.lock().get(uri).cloned()
    }

    /// Number of distinct URIs seen
    pub fn len(&self) -> usize {
        self.locks.lock().len()
    }

    /// Whether no URI has been seen yet
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Reader batch bound handed to new locks
    pub fn reader_batch(&self) -> usize {
        self.reader_batch
    }
}

impl std::fmt::Debug for LockTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LockTable")
            .field("entries", &self.len())
            .field("reader_batch", &self.reader_batch)
            .finish()
    }
}
