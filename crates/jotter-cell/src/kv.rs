//! Flat string key-value backing stores for [`SharedCell`]
//!
//! [`SharedCell`]: crate::SharedCell

use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};

use jotter_storage::Database;

/// A flat string store. Operations are best-effort; implementations
/// log failures instead of surfacing them, since persistence must
/// never block editing.
pub trait KvStore: Send + Sync {
    fn get(&self, key: &str) -> Option<String>;
    fn set(&self, key: &str, value: &str);
    fn remove(&self, key: &str);
}

impl KvStore for Database {
    fn get(&self, key: &str) -> Option<String> {
        match self.kv_get(key) {
            Ok(value) => value,
            Err(e) => {
                tracing::error!(key = %key, error = %e, "Key-value read failed");
                None
            }
        }
    }

    fn set(&self, key: &str, value: &str) {
        if let Err(e) = self.kv_set(key, value) {
            tracing::error!(key = %key, error = %e, "Key-value write failed");
        }
    }

    fn remove(&self, key: &str) {
        if let Err(e) = self.kv_delete(key) {
            tracing::error!(key = %key, error = %e, "Key-value delete failed");
        }
    }
}

/// Purely in-memory store, used when nothing needs to survive the
/// process and by tests.
#[derive(Default)]
pub struct MemoryKv {
    entries: RwLock<HashMap<String, String>>,
    writes: AtomicUsize,
}

impl MemoryKv {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of `set` calls observed.
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::Relaxed)
    }
}

impl KvStore for MemoryKv {
    fn get(&self, key: &str) -> Option<String> {
        self.entries.read().get(key).cloned()
    }

    fn set(&self, key: &str, value: &str) {
        self.writes.fetch_add(1, Ordering::Relaxed);
        self.entries
            .write()
            .insert(key.to_string(), value.to_string());
    }

    fn remove(&self, key: &str) {
        self.entries.write().remove(key);
    }
}
