//! Local storage for cache groups.
//!
//! ```text
//! ┌──────────────────────────────────────────────┐
//! │                 CacheStorage                 │
//! │   key ──hash──▶ shard 0 │ shard 1 │ ...      │
//! │                 ┌─────────────────────────┐  │
//! │                 │ Mutex<LruStore>         │  │
//! │                 │  head(MRU) ⇄ ... ⇄ tail │  │
//! │                 └─────────────────────────┘  │
//! └──────────────────────────────────────────────┘
//! ```
//!
//! [`LruStore`] is the unsynchronized byte-bounded eviction store;
//! [`CacheStorage`] serializes access to it and defers eviction
//! notifications until the shard lock is released.

pub mod lru;
pub mod storage;

pub use lru::{LruStore, OnEvicted};
pub use storage::{CacheStorage, EvictionListener};
