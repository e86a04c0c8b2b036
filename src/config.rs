//! Configuration types for cache groups and the HTTP peer pool.

use crate::error::{Error, Result};
use std::time::Duration;

/// URL prefix under which peers serve cache requests.
pub const DEFAULT_BASE_PATH: &str = "/_geecache/";

/// Virtual ring positions per peer.
pub const DEFAULT_REPLICAS: usize = 50;

/// Upper bound on a single peer request.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

/// Configuration for a single cache group.
#[derive(Debug, Clone)]
pub struct GroupConfig {
    /// Byte budget for the group's local store. Zero means unbounded.
    pub capacity_bytes: usize,

    /// Number of independently locked store shards.
    ///
    /// One shard gives exact LRU order across the whole group; more shards
    /// trade that for less lock contention.
    pub shards: usize,

    /// Deadline for a caller's miss path (peer fetch plus local load).
    /// None waits indefinitely.
    pub load_timeout: Option<Duration>,
}

impl Default for GroupConfig {
    fn default() -> Self {
        Self {
            capacity_bytes: 64 << 20, // 64MB
            shards: 1,
            load_timeout: None,
        }
    }
}

impl GroupConfig {
    /// Create a configuration with the given byte budget.
    pub fn new(capacity_bytes: usize) -> Self {
        Self {
            capacity_bytes,
            ..Default::default()
        }
    }

    /// Set the byte budget.
    pub fn with_capacity_bytes(mut self, capacity_bytes: usize) -> Self {
        self.capacity_bytes = capacity_bytes;
        self
    }

    /// Set the number of store shards.
    pub fn with_shards(mut self, shards: usize) -> Self {
        self.shards = shards;
        self
    }

    /// Set the miss-path deadline.
    pub fn with_load_timeout(mut self, timeout: Duration) -> Self {
        self.load_timeout = Some(timeout);
        self
    }

    /// Check the configuration for values the group cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.shards == 0 {
            return Err(Error::Config("shards must be at least 1".to_string()));
        }
        if self.capacity_bytes != 0 && self.shards > self.capacity_bytes {
            return Err(Error::Config(format!(
                "{} shards cannot split a budget of {} bytes",
                self.shards, self.capacity_bytes
            )));
        }
        if self.load_timeout == Some(Duration::ZERO) {
            return Err(Error::Config("load timeout must be non-zero".to_string()));
        }
        Ok(())
    }
}

/// Configuration for an HTTP peer pool.
#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// This node's base URL, e.g. `http://10.0.0.1:8001`.
    pub self_addr: String,

    /// Path prefix for cache requests. Must start and end with `/`.
    pub base_path: String,

    /// Virtual ring positions per peer.
    pub replicas: usize,

    /// Timeout applied to every outgoing peer request.
    pub request_timeout: Duration,
}

impl PoolConfig {
    /// Create a configuration for the node reachable at `self_addr`.
    pub fn new(self_addr: impl Into<String>) -> Self {
        Self {
            self_addr: self_addr.into(),
            base_path: DEFAULT_BASE_PATH.to_string(),
            replicas: DEFAULT_REPLICAS,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }

    /// Set the path prefix.
    pub fn with_base_path(mut self, base_path: impl Into<String>) -> Self {
        self.base_path = base_path.into();
        self
    }

    /// Set the number of virtual ring positions per peer.
    pub fn with_replicas(mut self, replicas: usize) -> Self {
        self.replicas = replicas;
        self
    }

    /// Set the per-request timeout.
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Check the configuration for values the pool cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.self_addr.is_empty() {
            return Err(Error::Config("self address must not be empty".to_string()));
        }
        if self.base_path.len() < 2
            || !self.base_path.starts_with('/')
            || !self.base_path.ends_with('/')
        {
            return Err(Error::Config(format!(
                "base path must start and end with '/': {:?}",
                self.base_path
            )));
        }
        if self.replicas == 0 {
            return Err(Error::Config("replicas must be at least 1".to_string()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_group_defaults() {
        let config = GroupConfig::default();
        assert_eq!(config.shards, 1);
        assert!(config.load_timeout.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_group_rejects_zero_shards() {
        let config = GroupConfig::new(1024).with_shards(0);
        assert!(matches!(config.validate(), Err(Error::Config(_))));
    }

    #[test]
    fn test_group_rejects_more_shards_than_bytes() {
        let config = GroupConfig::new(2).with_shards(4);
        assert!(matches!(config.validate(), Err(Error::Config(_))));

        assert!(GroupConfig::new(4).with_shards(4).validate().is_ok());
        assert!(GroupConfig::new(0).with_shards(4).validate().is_ok());
    }

    #[test]
    fn test_pool_defaults() {
        let config = PoolConfig::new("http://127.0.0.1:8001");
        assert_eq!(config.base_path, DEFAULT_BASE_PATH);
        assert_eq!(config.replicas, DEFAULT_REPLICAS);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_pool_rejects_bad_base_path() {
        for path in ["", "/", "_cache/", "/_cache"] {
            let config = PoolConfig::new("http://127.0.0.1:8001").with_base_path(path);
            assert!(config.validate().is_err(), "accepted {path:?}");
        }
    }
}
