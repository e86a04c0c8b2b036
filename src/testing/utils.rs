use crate::config::PoolConfig;
use crate::error::{Error, Result};
use crate::group::{Group, GroupRegistry};
use crate::partitioning::HashRing;
use crate::peers::HttpPool;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

/// Poll `action` until `predicate` accepts its result or `timeout` passes.
pub async fn wait_for_result<F, Fut, T, P>(
    mut action: F,
    predicate: P,
    timeout: Duration,
) -> Option<T>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = T>,
    P: Fn(&T) -> bool,
{
    let start = Instant::now();
    let interval = Duration::from_millis(20);

    while start.elapsed() < timeout {
        let result = action().await;
        if predicate(&result) {
            return Some(result);
        }
        tokio::time::sleep(interval).await;
    }
    None
}

/// One node of a [`TestCluster`], serving on loopback.
///
/// Dropping the node stops its server.
#[derive(Debug)]
pub struct TestNode {
    pub addr: String,
    pub registry: Arc<GroupRegistry>,
    pub pool: Arc<HttpPool>,
    shutdown: Option<oneshot::Sender<()>>,
    server: Option<JoinHandle<Result<()>>>,
}

impl TestNode {
    /// Look up a group on this node.
    pub fn group(&self, name: &str) -> Option<Arc<Group>> {
        self.registry.get_group(name)
    }

    /// Stop the server and wait for it to exit.
    pub async fn stop(&mut self) -> Result<()> {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        match self.server.take() {
            Some(server) => server
                .await
                .map_err(|e| Error::Internal(format!("server task failed: {}", e)))?,
            None => Ok(()),
        }
    }
}

/// A set of nodes on loopback that are each other's peers.
#[derive(Debug)]
pub struct TestCluster {
    pub nodes: Vec<TestNode>,
}

impl TestCluster {
    /// Start `node_count` nodes.
    ///
    /// `setup` registers groups on each node's registry before the peers are
    /// wired, and is given the node's index.
    pub async fn start<F>(node_count: usize, setup: F) -> Result<Self>
    where
        F: Fn(usize, &GroupRegistry) -> Result<()>,
    {
        let mut listeners = Vec::with_capacity(node_count);
        for _ in 0..node_count {
            let listener = TcpListener::bind("127.0.0.1:0")
                .await
                .map_err(|e| Error::Internal(e.to_string()))?;
            let local_addr = listener
                .local_addr()
                .map_err(|e| Error::Internal(e.to_string()))?;
            listeners.push((format!("http://{}", local_addr), listener));
        }
        let addrs: Vec<String> = listeners.iter().map(|(addr, _)| addr.clone()).collect();

        let mut nodes = Vec::with_capacity(node_count);
        for (index, (addr, listener)) in listeners.into_iter().enumerate() {
            let registry = Arc::new(GroupRegistry::new());
            setup(index, &registry)?;

            let config = PoolConfig::new(addr.clone()).with_request_timeout(Duration::from_secs(2));
            let pool = Arc::new(HttpPool::new(config, registry.clone())?);
            pool.set_peers(addrs.iter().cloned())?;
            for name in registry.names() {
                if let Some(group) = registry.get_group(&name) {
                    group.register_peers(pool.clone())?;
                }
            }

            let (tx, rx) = oneshot::channel::<()>();
            let server = tokio::spawn(pool.clone().serve(listener, async move {
                let _ = rx.await;
            }));

            nodes.push(TestNode {
                addr,
                registry,
                pool,
                shutdown: Some(tx),
                server: Some(server),
            });
        }

        Ok(Self { nodes })
    }

    pub fn node(&self, index: usize) -> &TestNode {
        &self.nodes[index]
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Index of the node owning `key`.
    pub fn owner_of(&self, key: &str) -> Option<usize> {
        let first = self.nodes.first()?;
        let mut ring = HashRing::new(first.pool.config().replicas);
        ring.set_nodes(self.nodes.iter().map(|n| n.addr.clone()));
        let owner = ring.owner(key)?;
        self.nodes.iter().position(|n| n.addr == owner)
    }

    /// Find a key, built by `make_key`, owned by node `index`.
    pub fn key_owned_by<F>(&self, index: usize, make_key: F) -> Option<String>
    where
        F: Fn(usize) -> String,
    {
        (0..10_000)
            .map(make_key)
            .find(|key| self.owner_of(key) == Some(index))
    }

    /// Stop every node.
    pub async fn shutdown(mut self) -> Result<()> {
        for node in &mut self.nodes {
            node.stop().await?;
        }
        Ok(())
    }
}
