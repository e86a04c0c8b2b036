//! Read-through, peer-to-peer cache with consistent-hash routing.
//!
//! Every node keeps a bounded LRU store per cache [`Group`]. On a miss the
//! group asks a consistent hash ring which peer owns the key, fetches it from
//! that peer, and falls back to a user supplied [`Loader`] when the key is
//! local or the peer fails. Concurrent misses for one key are collapsed into a
//! single load.
//!
//! # Example
//!
//! ```rust,no_run
//! use bytes::Bytes;
//! use ringcache::{BoxError, GroupRegistry, HttpPool, LoaderFn, PoolConfig};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let registry = Arc::new(GroupRegistry::new());
//!     let scores = registry.new_group(
//!         "scores",
//!         2 << 10,
//!         LoaderFn(|key: String| async move {
//!             // Slow lookup in the source of truth.
//!             Ok::<_, BoxError>(Bytes::from(format!("score of {}", key)))
//!         }),
//!     )?;
//!
//!     let me = "http://127.0.0.1:8001";
//!     let pool = Arc::new(HttpPool::new(PoolConfig::new(me), registry.clone())?);
//!     pool.set_peers([me, "http://127.0.0.1:8002", "http://127.0.0.1:8003"])?;
//!     scores.register_peers(pool.clone())?;
//!
//!     let listener = tokio::net::TcpListener::bind("127.0.0.1:8001").await?;
//!     tokio::spawn(pool.serve(listener, async {
//!         let _ = tokio::signal::ctrl_c().await;
//!     }));
//!
//!     let value = scores.get("Tom").await?;
//!     println!("{}", value);
//!     Ok(())
//! }
//! ```
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │            Application Layer                │
//! └─────────────────────────────────────────────┘
//!                     │ get(key)
//!                     ▼
//! ┌─────────────────────────────────────────────┐
//! │                  Group                      │
//! │  CacheStorage ─ FlightGroup ─ Loader        │
//! └─────────────────────────────────────────────┘
//!                     │ pick_peer / fetch
//!                     ▼
//! ┌─────────────────────────────────────────────┐
//! │        HttpPool (HashRing + HttpGetter)     │
//! └─────────────────────────────────────────────┘
//!                     │ GET /_geecache/<group>/<key>
//!                     ▼
//!               remote peers
//! ```
//!
//! # Consistency Model
//!
//! - Each key is cached only on the node that owns it.
//! - There is no invalidation: a cached value stays until it is evicted.
//! - During a peer set change nodes may briefly disagree about owners, which
//!   can cause one extra load per key.

pub mod cache;
pub mod config;
pub mod error;
pub mod flight;
pub mod group;
pub mod metrics;
pub mod partitioning;
pub mod peers;
pub mod testing;
pub mod types;

// Re-exports for convenience
pub use cache::{CacheStorage, LruStore};
pub use config::{GroupConfig, PoolConfig};
pub use error::{BoxError, Error, PeerError, Result};
pub use flight::FlightGroup;
pub use group::{Group, GroupBuilder, GroupRegistry, Loader, LoaderFn};
pub use metrics::{GroupStats, StatsSnapshot};
pub use partitioning::HashRing;
pub use peers::{HttpGetter, HttpPool, PeerGetter, PeerPicker};
pub use types::{ByteView, CacheStats, NodeId, Weighted};
