//! Volatile (in-memory) backend
//!
//! Same external behavior as the file-backed store, without any file I/O.
//! State lives only as long as the process: this is the trade-off for higher
//! throughput in long-lived single-process deployments.
//!
//! ## Concurrency Model
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                       MemoryStore                           │
//! │  ┌─────────┐ ┌─────────┐ ┌─────────┐ ┌─────────┐           │
//! │  │ Shard 0 │ │ Shard 1 │ │ Shard 2 │ │ Shard N │           │
//! │  │ Mutex   │ │ Mutex   │ │ Mutex   │ │ Mutex   │           │
//! │  │ HashMap │ │ HashMap │ │ HashMap │ │ HashMap │           │
//! │  └─────────┘ └─────────┘ └─────────┘ └─────────┘           │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! Keys are distributed across shards using a hash function. A `get` takes
//! a plain mutex rather than a read lock because, with sliding TTL, every hit
//! is also a write.

use crate::error::{Result, StorageError};
use crate::storage::record::Record;
use crate::storage::stats::{Counters, StorageStats};
use crate::storage::TtlPolicy;
use chrono::Utc;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::hash::{DefaultHasher, Hash, Hasher};
use std::time::Duration;
use tracing::{debug, info};

/// Number of shards for the in-memory store.
const NUM_SHARDS: usize = 64;

/// Process-local store.
#[derive(Debug)]
pub struct MemoryStore {
    shards: Vec<Mutex<HashMap<String, Record>>>,
    policy: TtlPolicy,
    counters: Counters,
}

impl MemoryStore {
    /// Creates an empty store.
    pub fn new(policy: TtlPolicy) -> Self {
        let shards = (0..NUM_SHARDS).map(|_| Mutex::new(HashMap::new())).collect();

        info!(
            ttl_secs = policy.ttl.as_secs(),
            sliding_ttl = policy.sliding,
            "In-memory storage initialized"
        );

        Self {
            shards,
            policy,
            counters: Counters::default(),
        }
    }

    /// Gets the shard for a given key.
    #[inline]
    fn shard(&self, key: &str) -> &Mutex<HashMap<String, Record>> {
        let mut hasher = DefaultHasher::new();
        key.hash(&mut hasher);
        &self.shards[(hasher.finish() as usize) % NUM_SHARDS]
    }

    /// Gets the value for a key, renewing its TTL if sliding TTL is enabled.
    ///
    /// The expiry check, the renewal and the lazy removal of an expired entry
    /// all happen under one shard lock.
    pub fn get(&self, key: &str) -> Option<String> {
        Counters::incr(&self.counters.gets);
        let value = self.load(key, self.policy.sliding);
        if value.is_some() {
            Counters::incr(&self.counters.hits);
        }
        value
    }

    /// Checks whether a live entry exists, without renewing it.
    pub fn exists(&self, key: &str) -> bool {
        self.load(key, false).is_some()
    }

    fn load(&self, key: &str, renew: bool) -> Option<String> {
        let mut data = self.shard(key).lock();
        let now = Utc::now();

        let record = data.get_mut(key)?;
        if record.is_expired_at(now) {
            data.remove(key);
            Counters::incr(&self.counters.expired);
            debug!(key = %key, "Key expired and removed");
            return None;
        }

        if renew {
            record.renew(now, self.policy.ttl);
            Counters::incr(&self.counters.renewals);
            debug!(key = %key, "Retrieved key and extended TTL");
        }

        Some(record.value.clone())
    }

    /// Creates or replaces the entry for `key`.
    pub fn set(&self, key: &str, value: String, ttl: Duration) -> Result<()> {
        if ttl.is_zero() {
            return Err(StorageError::InvalidTtl);
        }
        Counters::incr(&self.counters.sets);

        let record = Record::new(value, Utc::now(), ttl);
        self.shard(key).lock().insert(key.to_string(), record);

        debug!(key = %key, ttl_secs = ttl.as_secs(), "Stored key");
        Ok(())
    }

    /// Removes the entry for `key`. Returns whether a physical entry existed.
    pub fn delete(&self, key: &str) -> bool {
        Counters::incr(&self.counters.deletes);
        self.shard(key).lock().remove(key).is_some()
    }

    /// Number of stored entries, including expired ones not yet swept.
    pub fn len(&self) -> usize {
        self.shards.iter().map(|shard| shard.lock().len()).sum()
    }

    /// Returns true if the store holds no entries.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Snapshot of this instance's operation counters.
    pub fn stats(&self) -> StorageStats {
        self.counters.snapshot()
    }

    /// Cleans up expired entries from all shards.
    ///
    /// Each shard is swept under the same mutex `get` uses, so a renewal is
    /// never lost to a concurrent sweep.
    ///
    /// # Returns
    ///
    /// Returns the number of entries that were removed.
    pub fn sweep_expired(&self) -> u64 {
        let mut cleaned = 0u64;

        for shard in &self.shards {
            let mut data = shard.lock();
            let now = Utc::now();
            let before = data.len();

            data.retain(|_, record| !record.is_expired_at(now));

            cleaned += (before - data.len()) as u64;
        }

        if cleaned > 0 {
            self.counters
                .expired
                .fetch_add(cleaned, std::sync::atomic::Ordering::Relaxed);
            debug!(cleaned = cleaned, "Cleaned up expired conversation threads");
        }
        Counters::incr(&self.counters.sweeps);

        cleaned
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    fn store(ttl: Duration, sliding: bool) -> MemoryStore {
        MemoryStore::new(TtlPolicy { ttl, sliding })
    }

    #[test]
    fn test_set_and_get() {
        let store = store(Duration::from_secs(60), true);

        store.set("key", "value".into(), Duration::from_secs(60)).unwrap();
        assert_eq!(store.get("key"), Some("value".to_string()));
    }

    #[test]
    fn test_get_nonexistent() {
        let store = store(Duration::from_secs(60), true);
        assert_eq!(store.get("nonexistent"), None);
    }

    #[test]
    fn test_delete() {
        let store = store(Duration::from_secs(60), false);

        store.set("key", "value".into(), Duration::from_secs(60)).unwrap();
        assert!(store.delete("key"));
        assert_eq!(store.get("key"), None);
        assert!(!store.delete("key")); // Already deleted
    }

    #[test]
    fn test_expiry() {
        let store = store(Duration::from_millis(50), false);

        store.set("key", "value".into(), Duration::from_millis(50)).unwrap();
        assert!(store.exists("key"));

        thread::sleep(Duration::from_millis(100));

        assert_eq!(store.get("key"), None);
        assert_eq!(store.len(), 0);
    }

    #[test]
    fn test_sliding_renewal() {
        let store = store(Duration::from_millis(100), true);
        store.set("key", "value".into(), Duration::from_millis(100)).unwrap();

        // Each read lands well inside the window, so the entry outlives
        // several multiples of its TTL.
        for _ in 0..6 {
            thread::sleep(Duration::from_millis(40));
            assert_eq!(store.get("key"), Some("value".to_string()));
        }

        thread::sleep(Duration::from_millis(150));
        assert_eq!(store.get("key"), None);
    }

    #[test]
    fn test_exists_does_not_renew() {
        let store = store(Duration::from_millis(100), true);
        store.set("key", "value".into(), Duration::from_millis(100)).unwrap();

        thread::sleep(Duration::from_millis(60));
        assert!(store.exists("key"));
        thread::sleep(Duration::from_millis(60));
        assert!(!store.exists("key"));
    }

    #[test]
    fn test_zero_ttl_rejected() {
        let store = store(Duration::from_secs(60), false);
        assert!(matches!(
            store.set("key", "value".into(), Duration::ZERO),
            Err(StorageError::InvalidTtl)
        ));
    }

    #[test]
    fn test_sweep_expired() {
        let store = store(Duration::from_secs(60), false);

        for i in 0..10 {
            store
                .set(&format!("key{}", i), "value".into(), Duration::from_millis(10))
                .unwrap();
        }
        store.set("persistent", "value".into(), Duration::from_secs(60)).unwrap();

        thread::sleep(Duration::from_millis(50));

        assert_eq!(store.sweep_expired(), 10);
        assert_eq!(store.len(), 1);
        assert_eq!(store.stats().expired, 10);
    }

    #[test]
    fn test_concurrent_access() {
        let store = Arc::new(store(Duration::from_secs(60), true));
        let mut handles = vec![];

        for i in 0..10 {
            let store = Arc::clone(&store);
            handles.push(thread::spawn(move || {
                for j in 0..100 {
                    let key = format!("key_{}_{}", i, j);
                    store.set(&key, format!("value_{}", j), Duration::from_secs(60)).unwrap();
                    assert_eq!(store.get(&key), Some(format!("value_{}", j)));
                }
            }));
        }

        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(store.len(), 1000);
    }
}
