//! Process-local memory store
//!
//! Each run gets a concurrent map for ephemeral values (retry counters,
//! flags) that intentionally do not survive a controller restart. The
//! per-run maps live in a process-wide registry keyed by run name and
//! namespace, purged explicitly on run deletion or restart.

use once_cell::sync::Lazy;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use crate::util::join_paths;

static WORKFLOW_MEMORY_CACHE: Lazy<RwLock<HashMap<String, Arc<MemoryStore>>>> =
    Lazy::new(|| RwLock::new(HashMap::new()));

fn cache_key(name: &str, namespace: &str) -> String {
    format!("{name}-{namespace}")
}

/// Get or create the memory store for a run
pub fn memory_store_for(name: &str, namespace: &str) -> Arc<MemoryStore> {
    let key = cache_key(name, namespace);
    if let Some(store) = WORKFLOW_MEMORY_CACHE.read().unwrap().get(&key) {
        return store.clone();
    }
    let mut cache = WORKFLOW_MEMORY_CACHE.write().unwrap();
    cache
        .entry(key)
        .or_insert_with(|| Arc::new(MemoryStore::default()))
        .clone()
}

/// Drop a run's memory store from the registry
pub fn cleanup_memory_store(name: &str, namespace: &str) {
    WORKFLOW_MEMORY_CACHE
        .write()
        .unwrap()
        .remove(&cache_key(name, namespace));
}

/// Ephemeral per-run key/value map
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: RwLock<HashMap<String, Value>>,
}

impl MemoryStore {
    /// Get a value by dotted path
    pub fn get(&self, paths: &[&str]) -> Option<Value> {
        self.entries.read().unwrap().get(&join_paths(paths)).cloned()
    }

    /// Set a value at a dotted path
    pub fn set(&self, value: Value, paths: &[&str]) {
        self.entries
            .write()
            .unwrap()
            .insert(join_paths(paths), value);
    }

    /// Delete a value at a dotted path
    pub fn delete(&self, paths: &[&str]) {
        self.entries.write().unwrap().remove(&join_paths(paths));
    }

    /// Increment the counter at a dotted path.
    ///
    /// The counter initializes to 0: the first call returns 0, the Nth
    /// call returns N-1. A non-integer value at the key resets to 0.
    pub fn increase_count(&self, paths: &[&str]) -> i64 {
        let key = join_paths(paths);
        let mut entries = self.entries.write().unwrap();
        let count = match entries.get(&key).and_then(Value::as_i64) {
            Some(current) => current + 1,
            None => 0,
        };
        entries.insert(key, Value::from(count));
        count
    }
}
