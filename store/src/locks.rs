//! Per-key mutual exclusion owned by a store instance.
//!
//! Read-modify-write sequences on one logical record (an entity) must be
//! serialized across every caller sharing the store, so the registry lives
//! next to the data rather than in any one consumer.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

/// One mutex per key, created on first use and dropped once nobody holds or
/// waits on it.
#[derive(Debug, Default)]
pub struct KeyLocks {
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl KeyLocks {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `f` while holding the lock for `key`.
    pub fn with_lock<T>(&self, key: &str, f: impl FnOnce() -> T) -> T {
        let handle = {
            let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
            Arc::clone(locks.entry(key.to_string()).or_default())
        };

        let out = {
            let _guard = handle.lock().unwrap_or_else(PoisonError::into_inner);
            f()
        };

        self.release(key, handle);
        out
    }

    /// Handles are only cloned under the registry lock, so a count of two
    /// (registry + `handle`) means no other holder or waiter exists.
    fn release(&self, key: &str, handle: Arc<Mutex<()>>) {
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        if Arc::strong_count(&handle) == 2 {
            locks.remove(key);
        }
    }

    /// Number of keys currently tracked.
    #[must_use]
    pub fn len(&self) -> usize {
        self.locks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
