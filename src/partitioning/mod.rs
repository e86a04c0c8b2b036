//! Partitioning module for assigning keys to peer nodes.
//!
//! This module implements consistent hashing for key distribution, ensuring:
//! - Every node holds the same number of virtual positions on the ring
//! - Roughly `1 / nodes` of the keys move when a node joins
//! - Lookups are a binary search over the sorted positions
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                         HashRing                            │
//! │  ┌─────┐ ┌─────┐ ┌─────┐ ┌─────┐ ┌─────┐ ┌─────┐            │
//! │  │ 0:A │→│ 0:B │→│ 1:A │→│ 0:C │→│ 1:C │→│ 1:B │→ (wrap)    │
//! │  └─────┘ └─────┘ └─────┘ └─────┘ └─────┘ └─────┘            │
//! │        R virtual positions per physical node                │
//! │                                                             │
//! │  Key "user:123" → crc32 → first position ≥ hash → Node C    │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```rust
//! use ringcache::partitioning::HashRing;
//!
//! let mut ring = HashRing::new(50);
//! ring.set_nodes(["http://10.0.0.1:8001", "http://10.0.0.2:8001"]);
//!
//! let owner = ring.owner("user:123").unwrap();
//! assert!(owner.starts_with("http://10.0.0."));
//! ```

mod hashring;

pub use hashring::{crc32_ieee, HashFn, HashRing, DEFAULT_VNODES_PER_NODE};
