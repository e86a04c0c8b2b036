//! Thread-safe local storage for a cache group.

use super::lru::LruStore;
use crate::config::GroupConfig;
use crate::types::{ByteView, CacheStats};
use parking_lot::Mutex;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::trace;

/// Listener notified of every eviction, after the shard lock is released.
///
/// Because no lock is held, the listener may safely read from or insert into
/// the same storage.
pub type EvictionListener = Arc<dyn Fn(&str, &ByteView) + Send + Sync>;

/// Seed mixed into shard selection so shard choice is independent from the
/// ring's key hashing.
const SHARD_SEED: u64 = 0x9e37_79b9_7f4a_7c15;

/// Local cache storage backed by one or more mutex-guarded LRU shards.
///
/// Each key is routed to exactly one shard. The group's byte budget is split
/// evenly across shards.
pub struct CacheStorage {
    shards: Vec<Mutex<LruStore<ByteView>>>,

    /// Optional eviction listener.
    listener: Option<EvictionListener>,

    /// Hit counter for statistics.
    hits: AtomicU64,

    /// Miss counter for statistics.
    misses: AtomicU64,

    /// Eviction counter for statistics.
    evictions: AtomicU64,
}

impl CacheStorage {
    /// Create storage for the given group configuration.
    pub fn new(config: &GroupConfig) -> Self {
        let count = shard_count(config.capacity_bytes, config.shards);
        let shards = (0..count)
            .map(|i| Mutex::new(LruStore::new(shard_budget(config.capacity_bytes, count, i))))
            .collect();

        Self {
            shards,
            listener: None,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
        }
    }

    /// Attach a listener that observes evictions.
    pub fn with_eviction_listener(mut self, listener: EvictionListener) -> Self {
        self.listener = Some(listener);
        self
    }

    /// Get a value from the cache, promoting it to most recently used.
    pub fn get(&self, key: &str) -> Option<ByteView> {
        let result = self.shard(key).lock().get(key).cloned();

        if result.is_some() {
            self.hits.fetch_add(1, Ordering::Relaxed);
        } else {
            self.misses.fetch_add(1, Ordering::Relaxed);
        }

        result
    }

    /// Check if a key exists in the cache without promoting it.
    pub fn contains(&self, key: &str) -> bool {
        self.shard(key).lock().contains(key)
    }

    /// Insert a key-value pair, evicting older entries as needed.
    pub fn insert(&self, key: &str, value: ByteView) {
        let evicted = self.shard(key).lock().add(key, value);
        if evicted.is_empty() {
            return;
        }

        self.evictions
            .fetch_add(evicted.len() as u64, Ordering::Relaxed);
        for (evicted_key, evicted_value) in &evicted {
            trace!(key = %evicted_key, bytes = evicted_value.len(), "Evicted entry");
            if let Some(listener) = &self.listener {
                listener(evicted_key, evicted_value);
            }
        }
    }

    /// Remove a key from the local store only.
    pub fn remove(&self, key: &str) -> Option<ByteView> {
        self.shard(key).lock().remove(key)
    }

    /// Get the number of entries in the cache.
    pub fn entry_count(&self) -> u64 {
        self.shards.iter().map(|s| s.lock().len() as u64).sum()
    }

    /// Get the bytes accounted to resident entries.
    pub fn weighted_size(&self) -> u64 {
        self.shards
            .iter()
            .map(|s| s.lock().current_bytes() as u64)
            .sum()
    }

    /// Number of shards.
    pub fn shard_count(&self) -> usize {
        self.shards.len()
    }

    /// Get cache statistics.
    pub fn stats(&self) -> CacheStats {
        CacheStats {
            entry_count: self.entry_count(),
            weighted_size: self.weighted_size(),
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
        }
    }

    fn shard(&self, key: &str) -> &Mutex<LruStore<ByteView>> {
        if self.shards.len() == 1 {
            return &self.shards[0];
        }
        let mut hasher = DefaultHasher::new();
        SHARD_SEED.hash(&mut hasher);
        key.hash(&mut hasher);
        &self.shards[(hasher.finish() as usize) % self.shards.len()]
    }
}

/// Number of shards actually created.
///
/// A bounded budget gets at most one shard per byte, so every shard budget
/// is at least 1 and the budgets sum to `capacity_bytes`.
fn shard_count(capacity_bytes: usize, shards: usize) -> usize {
    match capacity_bytes {
        0 => shards.max(1),
        cap => shards.clamp(1, cap),
    }
}

/// Budget for shard `index` out of `shards`; the remainder goes to the
/// lowest shards.
fn shard_budget(capacity_bytes: usize, shards: usize, index: usize) -> usize {
    if capacity_bytes == 0 {
        return 0;
    }
    capacity_bytes / shards + usize::from(index < capacity_bytes % shards)
}

impl std::fmt::Debug for CacheStorage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheStorage")
            .field("shards", &self.shards.len())
            .field("entry_count", &self.entry_count())
            .field("weighted_size", &self.weighted_size())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex as PlMutex;

    fn test_config(capacity_bytes: usize) -> GroupConfig {
        GroupConfig {
            capacity_bytes,
            ..Default::default()
        }
    }

    #[test]
    fn test_insert_and_get() {
        let storage = CacheStorage::new(&test_config(1000));

        storage.insert("key1", ByteView::from("value1"));

        assert_eq!(storage.get("key1"), Some(ByteView::from("value1")));
        assert!(storage.get("key2").is_none());
    }

    #[test]
    fn test_contains() {
        let storage = CacheStorage::new(&test_config(1000));

        assert!(!storage.contains("key1"));
        storage.insert("key1", ByteView::from("value1"));
        assert!(storage.contains("key1"));
    }

    #[test]
    fn test_remove() {
        let storage = CacheStorage::new(&test_config(1000));

        storage.insert("key1", ByteView::from("value1"));
        assert_eq!(storage.remove("key1"), Some(ByteView::from("value1")));
        assert!(!storage.contains("key1"));
        assert_eq!(storage.weighted_size(), 0);
    }

    #[test]
    fn test_stats() {
        let storage = CacheStorage::new(&test_config(20));

        storage.insert("key1", ByteView::from("value1"));
        let _ = storage.get("key1");
        let _ = storage.get("nonexistent");
        storage.insert("key2", ByteView::from("value2"));
        storage.insert("key3", ByteView::from("value3"));

        let stats = storage.stats();
        assert_eq!(stats.entry_count, 2);
        assert_eq!(stats.weighted_size, 20);
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.evictions, 1);
    }

    #[test]
    fn test_listener_may_reenter_storage() {
        let storage = Arc::new(PlMutex::new(None::<Arc<CacheStorage>>));
        let seen = Arc::new(PlMutex::new(Vec::new()));

        let slot = storage.clone();
        let sink = seen.clone();
        let listener: EvictionListener = Arc::new(move |key: &str, _value: &ByteView| {
            sink.lock().push(key.to_string());
            if let Some(storage) = slot.lock().as_ref() {
                // Reading the store from inside the listener must not deadlock.
                let _ = storage.contains(key);
            }
        });

        let cache = Arc::new(CacheStorage::new(&test_config(10)).with_eviction_listener(listener));
        *storage.lock() = Some(cache.clone());

        cache.insert("k1", ByteView::from("v1"));
        cache.insert("k2", ByteView::from("v2"));
        cache.insert("k3", ByteView::from("v3"));

        assert_eq!(*seen.lock(), vec!["k1".to_string()]);
        *storage.lock() = None;
    }

    #[test]
    fn test_sharded_budget_is_split() {
        let config = GroupConfig::new(100).with_shards(4);
        let storage = CacheStorage::new(&config);
        assert_eq!(storage.shard_count(), 4);

        for i in 0..200 {
            storage.insert(&format!("key{i:03}"), ByteView::from("v"));
        }

        assert!(storage.weighted_size() <= 100);
        assert!(storage.entry_count() > 0);
    }

    #[test]
    fn test_shard_budget() {
        assert_eq!(shard_budget(0, 4, 0), 0);
        assert_eq!(shard_budget(10, 4, 0), 3);
        assert_eq!(shard_budget(10, 4, 1), 3);
        assert_eq!(shard_budget(10, 4, 2), 2);
        assert_eq!((0..4).map(|i| shard_budget(10, 4, i)).sum::<usize>(), 10);
    }

    #[test]
    fn test_shard_count_never_exceeds_budget() {
        assert_eq!(shard_count(0, 4), 4);
        assert_eq!(shard_count(2, 4), 2);
        assert_eq!(shard_count(100, 4), 4);
        assert_eq!(shard_count(100, 0), 1);
    }

    #[test]
    fn test_tiny_budget_with_many_shards_stays_bounded() {
        let storage = CacheStorage::new(&GroupConfig::new(2).with_shards(4));
        assert_eq!(storage.shard_count(), 2);

        for i in 0..20 {
            storage.insert(&format!("{}", i % 10), ByteView::from(""));
            assert!(storage.weighted_size() <= 2, "size {}", storage.weighted_size());
        }
    }
}
