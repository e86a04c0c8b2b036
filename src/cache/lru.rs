//! Byte-bounded LRU eviction store.
//!
//! Entries live in a slot arena threaded into a doubly linked recency list
//! (most recently used at the head) and are indexed by key through an
//! `FxHashMap`, so `get`, `add` and `remove_oldest` are O(1).
//!
//! The store is not synchronized. [`CacheStorage`](super::storage::CacheStorage)
//! serializes access to it.

use crate::types::Weighted;
use rustc_hash::FxHashMap;
use std::fmt;

/// Callback invoked synchronously with every evicted entry.
///
/// It runs while the caller holds whatever lock guards the store, so it must
/// not call back into the same store.
pub type OnEvicted<V> = Box<dyn FnMut(&str, &V) + Send>;

struct Node<V> {
    key: String,
    value: V,
    prev: Option<usize>,
    next: Option<usize>,
}

/// A bounded key/value store with least-recently-used eviction.
///
/// The size of an entry is `key.len() + value.weight()`. After every
/// mutation either `max_bytes == 0` (unbounded) or
/// `current_bytes <= max_bytes`.
pub struct LruStore<V> {
    max_bytes: usize,
    current_bytes: usize,
    index: FxHashMap<String, usize>,
    slots: Vec<Option<Node<V>>>,
    free: Vec<usize>,
    head: Option<usize>,
    tail: Option<usize>,
    on_evicted: Option<OnEvicted<V>>,
}

impl<V: Weighted> LruStore<V> {
    /// Create a store bounded to `max_bytes`. Zero disables eviction.
    pub fn new(max_bytes: usize) -> Self {
        Self {
            max_bytes,
            current_bytes: 0,
            index: FxHashMap::default(),
            slots: Vec::new(),
            free: Vec::new(),
            head: None,
            tail: None,
            on_evicted: None,
        }
    }

    /// Create a store that reports every eviction to `on_evicted`.
    pub fn with_on_evicted(max_bytes: usize, on_evicted: OnEvicted<V>) -> Self {
        let mut store = Self::new(max_bytes);
        store.on_evicted = Some(on_evicted);
        store
    }

    /// Number of resident entries.
    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    /// Sum of the sizes of all resident entries.
    pub fn current_bytes(&self) -> usize {
        self.current_bytes
    }

    pub fn max_bytes(&self) -> usize {
        self.max_bytes
    }

    /// Whether `key` is resident. Does not touch recency.
    pub fn contains(&self, key: &str) -> bool {
        self.index.contains_key(key)
    }

    /// Look up a value without promoting it.
    pub fn peek(&self, key: &str) -> Option<&V> {
        let idx = *self.index.get(key)?;
        self.node(idx).map(|node| &node.value)
    }

    /// Look up a value and promote it to most recently used.
    pub fn get(&mut self, key: &str) -> Option<&V> {
        let idx = *self.index.get(key)?;
        self.move_to_front(idx);
        self.node(idx).map(|node| &node.value)
    }

    /// Insert or replace `key`, then evict from the tail until the store is
    /// back within budget.
    ///
    /// Returns the evicted entries, oldest first. A single entry larger than
    /// the whole budget is evicted by the same call that inserted it.
    pub fn add(&mut self, key: impl Into<String>, value: V) -> Vec<(String, V)> {
        let key = key.into();

        if let Some(&idx) = self.index.get(key.as_str()) {
            self.move_to_front(idx);
            if let Some(node) = self.slots[idx].as_mut() {
                let old_weight = node.value.weight();
                let new_weight = value.weight();
                node.value = value;
                self.current_bytes = self.current_bytes + new_weight - old_weight;
            }
        } else {
            let size = key.len() + value.weight();
            let idx = self.alloc(Node {
                key: key.clone(),
                value,
                prev: None,
                next: None,
            });
            self.push_front(idx);
            self.index.insert(key, idx);
            self.current_bytes += size;
        }

        let mut evicted = Vec::new();
        while self.max_bytes != 0 && self.current_bytes > self.max_bytes {
            match self.remove_oldest() {
                Some(entry) => evicted.push(entry),
                None => break,
            }
        }
        evicted
    }

    /// Evict the least recently used entry.
    pub fn remove_oldest(&mut self) -> Option<(String, V)> {
        let idx = self.tail?;
        let (key, value) = self.take(idx)?;
        if let Some(callback) = self.on_evicted.as_mut() {
            callback(&key, &value);
        }
        Some((key, value))
    }

    /// Remove `key` explicitly. The eviction callback is not invoked.
    pub fn remove(&mut self, key: &str) -> Option<V> {
        let idx = *self.index.get(key)?;
        self.take(idx).map(|(_, value)| value)
    }

    /// Keys from most to least recently used.
    pub fn keys(&self) -> Vec<String> {
        let mut keys = Vec::with_capacity(self.len());
        let mut cursor = self.head;
        while let Some(idx) = cursor {
            match self.node(idx) {
                Some(node) => {
                    keys.push(node.key.clone());
                    cursor = node.next;
                }
                None => break,
            }
        }
        keys
    }

    fn node(&self, idx: usize) -> Option<&Node<V>> {
        self.slots.get(idx).and_then(Option::as_ref)
    }

    fn alloc(&mut self, node: Node<V>) -> usize {
        match self.free.pop() {
            Some(idx) => {
                self.slots[idx] = Some(node);
                idx
            }
            None => {
                self.slots.push(Some(node));
                self.slots.len() - 1
            }
        }
    }

    /// Unlink and free slot `idx`, keeping index and byte count in step.
    fn take(&mut self, idx: usize) -> Option<(String, V)> {
        self.unlink(idx);
        let node = self.slots.get_mut(idx)?.take()?;
        self.free.push(idx);
        self.index.remove(node.key.as_str());
        self.current_bytes -= node.key.len() + node.value.weight();
        Some((node.key, node.value))
    }

    fn move_to_front(&mut self, idx: usize) {
        if self.head == Some(idx) {
            return;
        }
        self.unlink(idx);
        self.push_front(idx);
    }

    fn push_front(&mut self, idx: usize) {
        let old_head = self.head;
        if let Some(node) = self.slots[idx].as_mut() {
            node.prev = None;
            node.next = old_head;
        }
        match old_head.and_then(|h| self.slots[h].as_mut()) {
            Some(head) => head.prev = Some(idx),
            None => self.tail = Some(idx),
        }
        self.head = Some(idx);
    }

    fn unlink(&mut self, idx: usize) {
        let (prev, next) = match self.slots.get(idx).and_then(Option::as_ref) {
            Some(node) => (node.prev, node.next),
            None => return,
        };

        match prev.and_then(|p| self.slots[p].as_mut()) {
            Some(p) => p.next = next,
            None => self.head = next,
        }
        match next.and_then(|n| self.slots[n].as_mut()) {
            Some(n) => n.prev = prev,
            None => self.tail = prev,
        }

        if let Some(node) = self.slots[idx].as_mut() {
            node.prev = None;
            node.next = None;
        }
    }
}

impl<V> fmt::Debug for LruStore<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LruStore")
            .field("len", &self.index.len())
            .field("current_bytes", &self.current_bytes)
            .field("max_bytes", &self.max_bytes)
            .finish()
    }
}
