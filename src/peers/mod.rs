//! Peer transport abstraction.
//!
//! A [`Group`](crate::group::Group) only knows how to ask a [`PeerPicker`]
//! which peer owns a key and how to ask a [`PeerGetter`] for a value. The
//! HTTP implementation lives in [`http`]; tests plug in in-memory doubles
//! from [`testing`](crate::testing).

pub mod http;

use crate::error::Result;
use async_trait::async_trait;
use bytes::Bytes;
use std::fmt::Debug;
use std::sync::Arc;

pub use http::{HttpGetter, HttpPool};

/// Locates the peer that owns a key.
pub trait PeerPicker: Send + Sync + Debug + 'static {
    /// Return the owning peer, or None when the key belongs to this node or
    /// no peers are known.
    fn pick_peer(&self, key: &str) -> Option<Arc<dyn PeerGetter>>;
}

/// Fetches a value from one remote peer.
#[async_trait]
pub trait PeerGetter: Send + Sync + Debug + 'static {
    /// Fetch `key` from the peer's copy of `group`.
    async fn fetch(&self, group: &str, key: &str) -> Result<Bytes>;

    /// Identifier of the peer, used for logging.
    fn addr(&self) -> &str;
}
