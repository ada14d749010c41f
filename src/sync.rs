//! Keyed mutex: per-key async locks with reference counting.
//!
//! Unlike a single-flight group, the lock for a key is exposed to every
//! caller, so unrelated critical sections (conversion, cache deletion) can be
//! serialized under the same key. Entries are dropped as soon as the last
//! holder releases, so the map never retains idle keys.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use parking_lot::Mutex;

struct Entry {
    lock: Arc<tokio::sync::Mutex<()>>,
    refs: usize,
}

/// Hands out per-key mutexes, created on demand and removed once unused.
#[derive(Default)]
pub struct KeyedMutex {
    entries: Mutex<HashMap<String, Entry>>,
}

impl KeyedMutex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the mutex for `key` with its reference count incremented,
    /// creating it if absent. Every `make` must be balanced by a
    /// [`KeyedMutex::release`].
    pub fn make(&self, key: &str) -> Arc<tokio::sync::Mutex<()>> {
        let mut entries = self.entries.lock();
        let entry = entries.entry(key.to_string()).or_insert_with(|| Entry {
            lock: Arc::new(tokio::sync::Mutex::new(())),
            refs: 0,
        });
        entry.refs += 1;
        entry.lock.clone()
    }

    /// Decrement the reference count for `key`, removing the entry entirely
    /// once it reaches zero.
    pub fn release(&self, key: &str) {
        let mut entries = self.entries.lock();
        if let Some(entry) = entries.get_mut(key) {
            entry.refs -= 1;
            if entry.refs == 0 {
                entries.remove(key);
            }
        }
    }

    /// Run `fut` while holding the lock for `key`.
    pub async fn locked<F, T>(&self, key: &str, fut: F) -> T
    where
        F: Future<Output = T>,
    {
        let lock = self.make(key);
        let result = {
            let _guard = lock.lock().await;
            fut.await
        };
        self.release(key);
        result
    }

    #[cfg(test)]
    fn contains(&self, key: &str) -> bool {
        self.entries.lock().contains_key(key)
    }
}
