//! Cache groups: the read-through orchestration layer.
//!
//! A [`Group`] is a named namespace of keys with its own local store, its own
//! loader for the backing data source and an optional [`PeerPicker`] that
//! routes keys to the peers owning them.
//!
//! # Read path
//!
//! ```text
//!              get(key)
//!                 │
//!          ┌──────▼──────┐  hit
//!          │ CacheStorage├──────────────▶ value
//!          └──────┬──────┘
//!                 │ miss
//!          ┌──────▼──────┐  waits on the in-flight load for `key`
//!          │ FlightGroup │
//!          └──────┬──────┘
//!                 │ one execution per key
//!       ┌─────────▼─────────┐  remote owner   ┌────────────┐
//!       │  PeerPicker::pick ├────────────────▶│ PeerGetter │──ok──▶ value
//!       └─────────┬─────────┘                 └─────┬──────┘
//!                 │ local owner / no peers          │ error (logged)
//!          ┌──────▼──────┐◀─────────────────────────┘
//!          │   Loader    │──▶ populate CacheStorage ──▶ value
//!          └─────────────┘
//! ```
//!
//! Values fetched from a peer are returned without being stored locally; only
//! the node that owns a key caches it.

mod registry;

pub use registry::GroupRegistry;

use crate::cache::{CacheStorage, EvictionListener};
use crate::config::GroupConfig;
use crate::error::{BoxError, Error, Result};
use crate::flight::FlightGroup;
use crate::metrics::{GroupStats, StatsSnapshot};
use crate::peers::{PeerGetter, PeerPicker};
use crate::types::{ByteView, CacheStats};
use async_trait::async_trait;
use bytes::Bytes;
use std::fmt;
use std::future::Future;
use std::sync::{Arc, OnceLock};
use tracing::{debug, info, warn};

/// Loads a value from the backing data source on a cache miss.
#[async_trait]
pub trait Loader: Send + Sync + 'static {
    /// Produce the bytes for `key`, or fail if the source cannot.
    async fn load(&self, key: &str) -> std::result::Result<Bytes, BoxError>;
}

/// Adapts an async closure into a [`Loader`].
///
/// ```rust
/// use bytes::Bytes;
/// use ringcache::group::LoaderFn;
///
/// let loader = LoaderFn(|key: String| async move {
///     Ok::<_, ringcache::BoxError>(Bytes::from(key.to_uppercase()))
/// });
/// # let _ = loader;
/// ```
pub struct LoaderFn<F>(pub F);

#[async_trait]
impl<F, Fut> Loader for LoaderFn<F>
where
    F: Fn(String) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = std::result::Result<Bytes, BoxError>> + Send + 'static,
{
    async fn load(&self, key: &str) -> std::result::Result<Bytes, BoxError> {
        (self.0)(key.to_owned()).await
    }
}

/// A named, read-through cache namespace.
pub struct Group {
    name: String,
    loader: Arc<dyn Loader>,
    main_cache: CacheStorage,

    /// Set at most once, after construction.
    peers: OnceLock<Arc<dyn PeerPicker>>,

    flight: FlightGroup<Result<ByteView>>,
    stats: GroupStats,
    config: GroupConfig,
}

impl Group {
    /// Start building a group called `name`.
    pub fn builder(name: impl Into<String>) -> GroupBuilder {
        GroupBuilder::new(name)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn config(&self) -> &GroupConfig {
        &self.config
    }

    /// Get the value for `key`, loading it on a miss.
    ///
    /// Concurrent misses for the same key share one load. When the group has
    /// a load timeout, a caller gives up with [`Error::Timeout`] once it
    /// passes; the shared load keeps running for anyone else waiting on it.
    pub async fn get(self: &Arc<Self>, key: &str) -> Result<ByteView> {
        if key.is_empty() {
            return Err(Error::EmptyKey);
        }

        self.stats.gets.inc();
        if let Some(value) = self.main_cache.get(key) {
            self.stats.cache_hits.inc();
            debug!(group = %self.name, key, "Cache hit");
            return Ok(value);
        }
        debug!(group = %self.name, key, "Cache miss");

        let group = Arc::clone(self);
        let owned_key = key.to_owned();
        let call = self.flight.join(key, move || group.load(owned_key));

        match self.config.load_timeout {
            Some(timeout) => tokio::time::timeout(timeout, call).await.map_err(|elapsed| {
                warn!(group = %self.name, key, ?timeout, "Load timed out");
                Error::from(elapsed)
            })?,
            None => call.await,
        }
    }

    /// Attach the picker used to route keys to their owning peers.
    ///
    /// Fails with [`Error::PeersAlreadyRegistered`] on a second call.
    pub fn register_peers(&self, peers: Arc<dyn PeerPicker>) -> Result<()> {
        self.peers
            .set(peers)
            .map_err(|_| Error::PeersAlreadyRegistered)?;
        info!(group = %self.name, "Registered peer picker");
        Ok(())
    }

    /// Whether a peer picker has been attached.
    pub fn has_peers(&self) -> bool {
        self.peers.get().is_some()
    }

    pub fn stats(&self) -> &GroupStats {
        &self.stats
    }

    pub fn stats_snapshot(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    /// Statistics of the local store.
    pub fn cache_stats(&self) -> CacheStats {
        self.main_cache.stats()
    }

    /// Drop `key` from this node's local store only.
    pub fn remove_local(&self, key: &str) -> Option<ByteView> {
        self.main_cache.remove(key)
    }

    /// The miss path, run once per key by the flight group.
    async fn load(self: Arc<Self>, key: String) -> Result<ByteView> {
        self.stats.loads.inc();

        if let Some(peer) = self.peers.get().and_then(|p| p.pick_peer(&key)) {
            match self.get_from_peer(peer.as_ref(), &key).await {
                Ok(value) => {
                    self.stats.peer_loads.inc();
                    return Ok(value);
                }
                Err(e) => {
                    self.stats.peer_errors.inc();
                    warn!(
                        group = %self.name,
                        key = %key,
                        peer = peer.addr(),
                        error = %e,
                        "Peer fetch failed, loading locally"
                    );
                }
            }
        }

        self.get_locally(&key).await
    }

    async fn get_from_peer(&self, peer: &dyn PeerGetter, key: &str) -> Result<ByteView> {
        let bytes = peer.fetch(&self.name, key).await?;
        Ok(ByteView::from(bytes))
    }

    async fn get_locally(&self, key: &str) -> Result<ByteView> {
        let bytes = match self.loader.load(key).await {
            Ok(bytes) => bytes,
            Err(e) => {
                self.stats.local_load_errs.inc();
                return Err(Error::source(e));
            }
        };
        self.stats.local_loads.inc();

        let value = ByteView::from(bytes);
        self.main_cache.insert(key, value.clone());
        Ok(value)
    }
}

impl fmt::Debug for Group {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Group")
            .field("name", &self.name)
            .field("config", &self.config)
            .field("main_cache", &self.main_cache)
            .field("peers", &self.peers.get())
            .finish()
    }
}

/// Builder for [`Group`].
pub struct GroupBuilder {
    name: String,
    config: GroupConfig,
    loader: Option<Arc<dyn Loader>>,
    eviction_listener: Option<EvictionListener>,
}

impl GroupBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            config: GroupConfig::default(),
            loader: None,
            eviction_listener: None,
        }
    }

    pub fn config(mut self, config: GroupConfig) -> Self {
        self.config = config;
        self
    }

    /// Set the local byte budget. Zero means unbounded.
    pub fn capacity_bytes(mut self, capacity_bytes: usize) -> Self {
        self.config.capacity_bytes = capacity_bytes;
        self
    }

    pub fn loader(mut self, loader: impl Loader) -> Self {
        self.loader = Some(Arc::new(loader));
        self
    }

    pub fn eviction_listener(mut self, listener: EvictionListener) -> Self {
        self.eviction_listener = Some(listener);
        self
    }

    /// Build a standalone group.
    ///
    /// Use [`GroupRegistry::register`] to make it reachable by name.
    pub fn build(self) -> Result<Arc<Group>> {
        let loader = self
            .loader
            .ok_or_else(|| Error::Config(format!("group {}: loader is not set", self.name)))?;
        self.config.validate()?;

        let mut main_cache = CacheStorage::new(&self.config);
        if let Some(listener) = self.eviction_listener {
            main_cache = main_cache.with_eviction_listener(listener);
        }

        Ok(Arc::new(Group {
            name: self.name,
            loader,
            main_cache,
            peers: OnceLock::new(),
            flight: FlightGroup::new(),
            stats: GroupStats::new(),
            config: self.config,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FailingPeer, MapPeer, StaticLoader, StaticPeers};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn scores_group(loader: StaticLoader, capacity_bytes: usize) -> Arc<Group> {
        Group::builder("scores")
            .capacity_bytes(capacity_bytes)
            .loader(loader)
            .build()
            .unwrap()
    }

    #[tokio::test]
    async fn test_get_loads_once_then_hits() {
        let loader = StaticLoader::new([("K", "VALUE")]);
        let group = scores_group(loader.clone(), 1 + 5);

        assert_eq!(group.get("K").await.unwrap().to_string(), "VALUE");
        assert_eq!(group.get("K").await.unwrap().to_string(), "VALUE");

        assert_eq!(loader.calls("K"), 1);
        let stats = group.stats_snapshot();
        assert_eq!(stats.gets, 2);
        assert_eq!(stats.cache_hits, 1);
        assert_eq!(stats.local_loads, 1);
    }

    #[tokio::test]
    async fn test_empty_key_never_reaches_loader() {
        let loader = StaticLoader::new([("", "nope")]);
        let group = scores_group(loader.clone(), 0);

        assert_eq!(group.get("").await, Err(Error::EmptyKey));
        assert_eq!(loader.total_calls(), 0);
        assert_eq!(group.stats_snapshot().gets, 0);
    }

    #[tokio::test]
    async fn test_loader_error_surfaces_and_is_not_cached() {
        let loader = StaticLoader::new([("Tom", "630")]);
        let group = scores_group(loader.clone(), 0);

        let err = group.get("unknown").await.unwrap_err();
        assert!(matches!(err, Error::Source(ref msg) if msg.contains("unknown")));

        let _ = group.get("unknown").await;
        assert_eq!(loader.calls("unknown"), 2);
        assert_eq!(group.stats_snapshot().local_load_errs, 2);
    }

    #[tokio::test]
    async fn test_loader_fn_adapter() {
        let group = Group::builder("upper")
            .loader(LoaderFn(|key: String| async move {
                Ok::<_, BoxError>(Bytes::from(key.to_uppercase()))
            }))
            .build()
            .unwrap();

        assert_eq!(group.get("abc").await.unwrap().to_string(), "ABC");
    }

    #[test]
    fn test_build_without_loader_fails() {
        let result = Group::builder("nothing").build();
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[tokio::test]
    async fn test_peer_failure_falls_back_to_loader() {
        let loader = StaticLoader::new([("K", "VALUE")]);
        let group = scores_group(loader.clone(), 0);
        group
            .register_peers(Arc::new(StaticPeers::new(Arc::new(FailingPeer::new(
                "http://peer:1",
            )))))
            .unwrap();

        assert_eq!(group.get("K").await.unwrap().to_string(), "VALUE");
        assert_eq!(loader.calls("K"), 1);

        let stats = group.stats_snapshot();
        assert_eq!(stats.peer_errors, 1);
        assert_eq!(stats.peer_loads, 0);
        assert_eq!(stats.local_loads, 1);
    }

    #[tokio::test]
    async fn test_peer_value_is_returned_but_not_cached() {
        let loader = StaticLoader::new([("K", "local")]);
        let group = scores_group(loader.clone(), 0);
        let peer = Arc::new(MapPeer::new("http://peer:1", [("K", "remote")]));
        group
            .register_peers(Arc::new(StaticPeers::new(peer.clone())))
            .unwrap();

        assert_eq!(group.get("K").await.unwrap().to_string(), "remote");
        assert_eq!(group.get("K").await.unwrap().to_string(), "remote");

        assert_eq!(loader.total_calls(), 0);
        assert_eq!(peer.fetches(), 2);
        assert_eq!(group.cache_stats().entry_count, 0);
    }

    #[tokio::test]
    async fn test_register_peers_only_once() {
        let group = scores_group(StaticLoader::new([("K", "V")]), 0);
        let peers: Arc<dyn PeerPicker> = Arc::new(StaticPeers::none());

        assert!(group.register_peers(peers.clone()).is_ok());
        assert_eq!(
            group.register_peers(peers),
            Err(Error::PeersAlreadyRegistered)
        );
        assert!(group.has_peers());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_misses_share_one_load() {
        let loader = StaticLoader::new([("K", "VALUE")]).with_delay(Duration::from_millis(100));
        let group = scores_group(loader.clone(), 0);

        let mut handles = Vec::new();
        for _ in 0..8 {
            let group = group.clone();
            handles.push(tokio::spawn(async move { group.get("K").await }));
        }
        for handle in handles {
            assert_eq!(handle.await.unwrap().unwrap().to_string(), "VALUE");
        }

        assert_eq!(loader.calls("K"), 1);
        assert_eq!(group.stats_snapshot().loads, 1);
    }

    #[tokio::test]
    async fn test_load_timeout() {
        let loader = StaticLoader::new([("K", "VALUE")]).with_delay(Duration::from_millis(300));
        let group = Group::builder("slow")
            .config(GroupConfig::new(0).with_load_timeout(Duration::from_millis(50)))
            .loader(loader.clone())
            .build()
            .unwrap();

        assert_eq!(group.get("K").await, Err(Error::Timeout));

        // The abandoned load still completes and fills the store.
        tokio::time::sleep(Duration::from_millis(400)).await;
        assert_eq!(group.cache_stats().entry_count, 1);
        assert_eq!(group.get("K").await.unwrap().to_string(), "VALUE");
        assert_eq!(loader.calls("K"), 1);
    }

    #[tokio::test]
    async fn test_aborted_get_still_completes_load() {
        let loader = StaticLoader::new([("K", "VALUE")]).with_delay(Duration::from_millis(100));
        let group = scores_group(loader.clone(), 0);

        let caller = {
            let group = group.clone();
            tokio::spawn(async move { group.get("K").await })
        };
        tokio::time::sleep(Duration::from_millis(30)).await;
        caller.abort();

        tokio::time::sleep(Duration::from_millis(500)).await;
        assert_eq!(group.flight.in_flight(), 0);
        assert_eq!(group.cache_stats().entry_count, 1);
        assert_eq!(loader.calls("K"), 1);

        assert_eq!(group.get("K").await.unwrap().to_string(), "VALUE");
        assert_eq!(loader.calls("K"), 1);
    }

    #[tokio::test]
    async fn test_remove_local_forces_reload() {
        let loader = StaticLoader::new([("K", "VALUE")]);
        let group = scores_group(loader.clone(), 0);

        group.get("K").await.unwrap();
        assert_eq!(group.remove_local("K").map(|v| v.to_string()), Some("VALUE".to_string()));
        assert!(group.remove_local("K").is_none());
        assert_eq!(group.cache_stats().entry_count, 0);

        group.get("K").await.unwrap();
        assert_eq!(loader.calls("K"), 2);
    }

    #[tokio::test]
    async fn test_eviction_listener_sees_evicted_keys() {
        let evicted = Arc::new(AtomicUsize::new(0));
        let counter = evicted.clone();
        let group = Group::builder("tiny")
            .capacity_bytes(4)
            .loader(StaticLoader::new([("a", "1"), ("b", "2"), ("c", "3")]))
            .eviction_listener(Arc::new(move |_key: &str, _value: &ByteView| {
                counter.fetch_add(1, Ordering::SeqCst);
            }))
            .build()
            .unwrap();

        for key in ["a", "b", "c"] {
            group.get(key).await.unwrap();
        }

        assert_eq!(evicted.load(Ordering::SeqCst), 1);
        assert_eq!(group.cache_stats().entry_count, 2);
    }
}
