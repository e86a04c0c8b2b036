//! Testing utilities for the peer cache.
//!
//! This module provides in-memory doubles for the two capabilities a
//! [`Group`](crate::group::Group) depends on, so the read path can be tested
//! without a network:
//!
//! - [`StaticLoader`]: a [`Loader`] backed by a fixed map that counts calls
//! - [`StaticPeers`]: a [`PeerPicker`] that always routes to one getter
//! - [`MapPeer`] / [`FailingPeer`]: [`PeerGetter`]s that answer from a map or
//!   always fail
//!
//! # Example
//!
//! ```rust
//! use ringcache::group::Group;
//! use ringcache::testing::{FailingPeer, StaticLoader, StaticPeers};
//! use std::sync::Arc;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let loader = StaticLoader::new([("Tom", "630")]);
//! let group = Group::builder("scores").loader(loader.clone()).build().unwrap();
//! group
//!     .register_peers(Arc::new(StaticPeers::new(Arc::new(FailingPeer::new("http://peer:1")))))
//!     .unwrap();
//!
//! // The peer fails, so the value comes from the loader.
//! assert_eq!(group.get("Tom").await.unwrap().to_string(), "630");
//! assert_eq!(loader.calls("Tom"), 1);
//! # }
//! ```

mod utils;


pub use utils::{wait_for_result, TestCluster, TestNode};

use crate::error::{BoxError, PeerError, Result};
use crate::group::Loader;
use crate::peers::{PeerGetter, PeerPicker};
use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// A loader answering from a fixed map.
///
/// Clones share their call counts, so a test can keep one clone and hand
/// another to the group.
#[derive(Debug, Clone)]
pub struct StaticLoader {
    values: Arc<HashMap<String, Bytes>>,
    calls: Arc<Mutex<HashMap<String, usize>>>,
    delay: Option<Duration>,
}

impl StaticLoader {
    pub fn new<I, K, V>(values: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<Bytes>,
    {
        Self {
            values: Arc::new(
                values
                    .into_iter()
                    .map(|(k, v)| (k.into(), v.into()))
                    .collect(),
            ),
            calls: Arc::new(Mutex::new(HashMap::new())),
            delay: None,
        }
    }

    /// Sleep for `delay` inside every load.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Number of loads requested for `key`.
    pub fn calls(&self, key: &str) -> usize {
        self.calls.lock().get(key).copied().unwrap_or(0)
    }

    /// Number of loads requested for any key.
    pub fn total_calls(&self) -> usize {
        self.calls.lock().values().sum()
    }
}

#[async_trait]
impl Loader for StaticLoader {
    async fn load(&self, key: &str) -> std::result::Result<Bytes, BoxError> {
        *self.calls.lock().entry(key.to_string()).or_insert(0) += 1;

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        self.values
            .get(key)
            .cloned()
            .ok_or_else(|| format!("{} not exist", key).into())
    }
}

/// A picker that routes every key to the same getter, or to none.
#[derive(Debug, Clone)]
pub struct StaticPeers {
    getter: Option<Arc<dyn PeerGetter>>,
}

impl StaticPeers {
    pub fn new(getter: Arc<dyn PeerGetter>) -> Self {
        Self {
            getter: Some(getter),
        }
    }

    /// A picker that keeps every key local.
    pub fn none() -> Self {
        Self { getter: None }
    }
}

impl PeerPicker for StaticPeers {
    fn pick_peer(&self, _key: &str) -> Option<Arc<dyn PeerGetter>> {
        self.getter.clone()
    }
}

/// A peer answering from a fixed map, counting fetches.
#[derive(Debug)]
pub struct MapPeer {
    addr: String,
    values: HashMap<String, Bytes>,
    fetches: AtomicUsize,
}

impl MapPeer {
    pub fn new<I, K, V>(addr: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<Bytes>,
    {
        Self {
            addr: addr.into(),
            values: values
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
            fetches: AtomicUsize::new(0),
        }
    }

    pub fn fetches(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PeerGetter for MapPeer {
    async fn fetch(&self, _group: &str, key: &str) -> Result<Bytes> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        self.values.get(key).cloned().ok_or_else(|| {
            PeerError::Status {
                addr: self.addr.clone(),
                status: 500,
            }
            .into()
        })
    }

    fn addr(&self) -> &str {
        &self.addr
    }
}

/// A peer whose every fetch fails as if the connection was refused.
#[derive(Debug)]
pub struct FailingPeer {
    addr: String,
    fetches: AtomicUsize,
}

impl FailingPeer {
    pub fn new(addr: impl Into<String>) -> Self {
        Self {
            addr: addr.into(),
            fetches: AtomicUsize::new(0),
        }
    }

    pub fn fetches(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PeerGetter for FailingPeer {
    async fn fetch(&self, _group: &str, _key: &str) -> Result<Bytes> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        Err(PeerError::Request {
            addr: self.addr.clone(),
            reason: "connection refused".to_string(),
        }
        .into())
    }

    fn addr(&self) -> &str {
        &self.addr
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_static_loader_counts_calls() {
        let loader = StaticLoader::new([("a", "1")]);

        assert_eq!(loader.load("a").await.unwrap(), Bytes::from("1"));
        assert!(loader.load("b").await.is_err());
        assert_eq!(loader.calls("a"), 1);
        assert_eq!(loader.calls("b"), 1);
        assert_eq!(loader.clone().total_calls(), 2);
    }

    #[tokio::test]
    async fn test_failing_peer_reports_request_error() {
        let peer = FailingPeer::new("http://peer:1");
        let err = peer.fetch("scores", "Tom").await.unwrap_err();

        assert!(err.is_peer());
        assert_eq!(peer.fetches(), 1);
    }
}
