//! HTTP peer pool.
//!
//! Every node runs one [`HttpPool`]. It is both halves of the transport:
//!
//! - the client half picks the owning peer for a key on the hash ring and
//!   fetches from it with an [`HttpGetter`];
//! - the server half answers `GET <base_path><group>/<key>` from the local
//!   [`GroupRegistry`].
//!
//! Response codes: `200` with the raw value bytes, `400` for a malformed path
//! or unknown group, `500` with the error text when the group's `get` fails.

use super::{PeerGetter, PeerPicker};
use crate::config::PoolConfig;
use crate::error::{Error, PeerError, Result};
use crate::group::GroupRegistry;
use crate::partitioning::HashRing;
use crate::types::NodeId;
use async_trait::async_trait;
use axum::extract::{Path, State};
use axum::http::{header, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use bytes::Bytes;
use parking_lot::RwLock;
use reqwest::Url;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{debug, info};

/// Ring and clients for the current peer set, replaced as a whole.
struct PoolState {
    ring: HashRing,
    getters: HashMap<NodeId, Arc<HttpGetter>>,
}

/// Peer picker and server for one node of the cache.
pub struct HttpPool {
    config: PoolConfig,
    registry: Arc<GroupRegistry>,
    client: reqwest::Client,
    state: RwLock<PoolState>,
}

impl HttpPool {
    /// Create a pool for the node at `config.self_addr`, serving the groups
    /// in `registry`.
    pub fn new(mut config: PoolConfig, registry: Arc<GroupRegistry>) -> Result<Self> {
        config.self_addr = normalize_addr(&config.self_addr);
        config.validate()?;

        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| Error::Config(format!("failed to build HTTP client: {}", e)))?;

        let state = PoolState {
            ring: HashRing::new(config.replicas),
            getters: HashMap::new(),
        };

        Ok(Self {
            config,
            registry,
            client,
            state: RwLock::new(state),
        })
    }

    pub fn self_addr(&self) -> &str {
        &self.config.self_addr
    }

    pub fn config(&self) -> &PoolConfig {
        &self.config
    }

    pub fn registry(&self) -> &Arc<GroupRegistry> {
        &self.registry
    }

    /// Replace the peer set.
    ///
    /// `peers` are base URLs and should include this node's own address.
    /// Lookups running concurrently see either the old or the new set.
    pub fn set_peers<I, S>(&self, peers: I) -> Result<()>
    where
        I: IntoIterator<Item = S>,
        S: Into<NodeId>,
    {
        let peers: Vec<NodeId> = peers
            .into_iter()
            .map(|peer| {
                let peer: NodeId = peer.into();
                normalize_addr(&peer)
            })
            .collect();

        let mut getters = HashMap::with_capacity(peers.len());
        for peer in &peers {
            let getter = HttpGetter::new(peer, &self.config.base_path, self.client.clone())?;
            getters.insert(peer.clone(), Arc::new(getter));
        }

        let mut ring = HashRing::new(self.config.replicas);
        ring.set_nodes(peers.iter().cloned());

        *self.state.write() = PoolState { ring, getters };
        info!(self_addr = %self.config.self_addr, peers = ?peers, "Peer set updated");
        Ok(())
    }

    /// Current peers, in the order they were set.
    pub fn peers(&self) -> Vec<NodeId> {
        self.state.read().ring.nodes().to_vec()
    }

    /// Build the HTTP routes served by this node.
    ///
    /// Besides the cache path under the base path, `/metrics` renders the
    /// counters of every registered group.
    pub fn router(self: &Arc<Self>) -> Router {
        Router::new()
            .route(&format!("{}*path", self.config.base_path), get(handle_get))
            .route("/metrics", get(handle_metrics))
            .fallback(handle_fallback)
            .with_state(Arc::clone(self))
    }

    /// Serve the router on `listener` until `shutdown` resolves.
    pub async fn serve<F>(self: Arc<Self>, listener: TcpListener, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let local_addr = listener
            .local_addr()
            .map_err(|e| Error::Internal(e.to_string()))?;
        info!(self_addr = %self.config.self_addr, %local_addr, "Peer server listening");

        axum::serve(listener, self.router())
            .with_graceful_shutdown(shutdown)
            .await
            .map_err(|e| Error::Internal(format!("peer server failed: {}", e)))?;

        info!(self_addr = %self.config.self_addr, "Peer server stopped");
        Ok(())
    }
}

impl PeerPicker for HttpPool {
    fn pick_peer(&self, key: &str) -> Option<Arc<dyn PeerGetter>> {
        let state = self.state.read();
        let owner = state.ring.owner(key)?;
        if owner == self.config.self_addr {
            return None;
        }

        debug!(self_addr = %self.config.self_addr, key, peer = owner, "Picked peer");
        let getter = state.getters.get(owner)?;
        Some(Arc::clone(getter) as Arc<dyn PeerGetter>)
    }
}

impl std::fmt::Debug for HttpPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpPool")
            .field("self_addr", &self.config.self_addr)
            .field("base_path", &self.config.base_path)
            .field("peers", &self.state.read().ring.nodes())
            .finish()
    }
}

/// Peer addresses name the same node with or without a trailing `/`.
fn normalize_addr(addr: &str) -> NodeId {
    addr.trim_end_matches('/').to_string()
}

/// Split the part of a request path after the base path into group and key.
fn parse_request_path(path: &str) -> Result<(&str, &str)> {
    path.split_once('/')
        .ok_or_else(|| Error::BadRequestPath(path.to_string()))
}

async fn handle_get(State(pool): State<Arc<HttpPool>>, Path(path): Path<String>) -> Response {
    let (group_name, key) = match parse_request_path(&path) {
        Ok(parts) => parts,
        Err(e) => {
            debug!(error = %e, "Rejected peer request");
            return (StatusCode::BAD_REQUEST, "bad request").into_response();
        }
    };
    debug!(self_addr = %pool.config.self_addr, group = group_name, key, "Serving peer request");

    let Some(group) = pool.registry.get_group(group_name) else {
        let err = Error::UnknownGroup(group_name.to_string());
        return (StatusCode::BAD_REQUEST, err.to_string()).into_response();
    };
    group.stats().server_requests.inc();

    match group.get(key).await {
        Ok(value) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "application/octet-stream")],
            value.bytes(),
        )
            .into_response(),
        Err(e) => (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response(),
    }
}

async fn handle_metrics(State(pool): State<Arc<HttpPool>>) -> String {
    let mut out = String::new();
    for name in pool.registry.names() {
        if let Some(group) = pool.registry.get_group(&name) {
            out.push_str(&group.stats().render(&name));
        }
    }
    out
}

async fn handle_fallback(State(pool): State<Arc<HttpPool>>, uri: Uri) -> Response {
    if uri.path().starts_with(&pool.config.base_path) {
        (StatusCode::BAD_REQUEST, "bad request").into_response()
    } else {
        StatusCode::NOT_FOUND.into_response()
    }
}

/// Fetches values from one remote peer over HTTP.
#[derive(Debug)]
pub struct HttpGetter {
    addr: String,
    base_url: Url,
    client: reqwest::Client,
}

impl HttpGetter {
    /// Create a getter for the peer at `addr` serving under `base_path`.
    pub fn new(addr: &str, base_path: &str, client: reqwest::Client) -> Result<Self> {
        let raw = format!("{}{}", addr.trim_end_matches('/'), base_path);
        let base_url = Url::parse(&raw)
            .map_err(|e| PeerError::InvalidAddress(format!("{}: {}", addr, e)))?;
        if base_url.cannot_be_a_base() {
            return Err(PeerError::InvalidAddress(addr.to_string()).into());
        }

        Ok(Self {
            addr: addr.to_string(),
            base_url,
            client,
        })
    }

    /// Request URL for `key` in `group`. Both segments are percent-encoded.
    pub fn url(&self, group: &str, key: &str) -> Result<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| PeerError::InvalidAddress(self.addr.clone()))?
            .pop_if_empty()
            .push(group)
            .push(key);
        Ok(url)
    }
}

#[async_trait]
impl PeerGetter for HttpGetter {
    async fn fetch(&self, group: &str, key: &str) -> Result<Bytes> {
        let url = self.url(group, key)?;

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| PeerError::Request {
                addr: self.addr.clone(),
                reason: e.to_string(),
            })?;

        let status = response.status();
        if status != reqwest::StatusCode::OK {
            return Err(PeerError::Status {
                addr: self.addr.clone(),
                status: status.as_u16(),
            }
            .into());
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| PeerError::Body(e.to_string()))?;
        Ok(body)
    }

    fn addr(&self) -> &str {
        &self.addr
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pool(self_addr: &str) -> HttpPool {
        HttpPool::new(PoolConfig::new(self_addr), Arc::new(GroupRegistry::new())).unwrap()
    }

    #[test]
    fn test_getter_url_escapes_segments() {
        let getter = HttpGetter::new(
            "http://10.0.0.2:8001",
            "/_geecache/",
            reqwest::Client::new(),
        )
        .unwrap();

        let url = getter.url("scores", "Tom").unwrap();
        assert_eq!(url.as_str(), "http://10.0.0.2:8001/_geecache/scores/Tom");

        let url = getter.url("my group", "a/b?c").unwrap();
        assert_eq!(
            url.as_str(),
            "http://10.0.0.2:8001/_geecache/my%20group/a%2Fb%3Fc"
        );
    }

    #[test]
    fn test_parse_request_path() {
        assert_eq!(parse_request_path("scores/Tom"), Ok(("scores", "Tom")));
        assert_eq!(parse_request_path("scores/a/b"), Ok(("scores", "a/b")));
        assert_eq!(parse_request_path("scores/"), Ok(("scores", "")));
        assert_eq!(
            parse_request_path("scores"),
            Err(Error::BadRequestPath("scores".to_string()))
        );
    }

    #[test]
    fn test_getter_rejects_bad_address() {
        let result = HttpGetter::new("not a url", "/_geecache/", reqwest::Client::new());
        assert!(matches!(
            result,
            Err(Error::Peer(PeerError::InvalidAddress(_)))
        ));
    }

    #[test]
    fn test_pick_peer_skips_self() {
        let me = "http://127.0.0.1:9001";
        let pool = pool(me);
        assert!(pool.pick_peer("anything").is_none());

        pool.set_peers([me]).unwrap();
        for i in 0..100 {
            assert!(pool.pick_peer(&format!("key{}", i)).is_none());
        }
    }

    #[test]
    fn test_pick_peer_follows_ring() {
        let me = "http://127.0.0.1:9001";
        let peers = [me, "http://127.0.0.1:9002", "http://127.0.0.1:9003"];
        let pool = pool(me);
        pool.set_peers(peers).unwrap();

        let mut ring = HashRing::new(pool.config().replicas);
        ring.set_nodes(peers);

        let mut remote = 0;
        for i in 0..300 {
            let key = format!("key{}", i);
            let owner = ring.owner(&key).unwrap();
            match pool.pick_peer(&key) {
                Some(getter) => {
                    assert_eq!(getter.addr(), owner);
                    remote += 1;
                }
                None => assert_eq!(owner, me),
            }
        }
        assert!(remote > 0);
    }

    #[test]
    fn test_trailing_slash_does_not_hide_self() {
        let slashed_self = pool("http://127.0.0.1:9001/");
        slashed_self.set_peers(["http://127.0.0.1:9001"]).unwrap();
        assert_eq!(slashed_self.self_addr(), "http://127.0.0.1:9001");
        for i in 0..100 {
            assert!(slashed_self.pick_peer(&format!("key{}", i)).is_none());
        }

        let slashed_peer = pool("http://127.0.0.1:9001");
        slashed_peer.set_peers(["http://127.0.0.1:9001/"]).unwrap();
        assert_eq!(slashed_peer.peers(), vec!["http://127.0.0.1:9001".to_string()]);
        for i in 0..100 {
            assert!(slashed_peer.pick_peer(&format!("key{}", i)).is_none());
        }
    }

    #[test]
    fn test_set_peers_replaces_previous_set() {
        let pool = pool("http://127.0.0.1:9001");
        pool.set_peers(["http://127.0.0.1:9002", "http://127.0.0.1:9003"])
            .unwrap();
        pool.set_peers(["http://127.0.0.1:9004"]).unwrap();

        assert_eq!(pool.peers(), vec!["http://127.0.0.1:9004".to_string()]);
        let getter = pool.pick_peer("key").unwrap();
        assert_eq!(getter.addr(), "http://127.0.0.1:9004");
    }

    #[test]
    fn test_set_peers_keeps_old_set_on_error() {
        let pool = pool("http://127.0.0.1:9001");
        pool.set_peers(["http://127.0.0.1:9002"]).unwrap();

        assert!(pool.set_peers(["http://127.0.0.1:9003", "::bad::"]).is_err());
        assert_eq!(pool.peers(), vec!["http://127.0.0.1:9002".to_string()]);
    }

    #[test]
    fn test_new_validates_config() {
        let result = HttpPool::new(
            PoolConfig::new("http://127.0.0.1:9001").with_replicas(0),
            Arc::new(GroupRegistry::new()),
        );
        assert!(matches!(result, Err(Error::Config(_))));
    }
}
