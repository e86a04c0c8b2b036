//! Consistent hashing implementation with virtual nodes.
//!
//! Each node is placed on a 32-bit ring at `replicas` positions, computed as
//! `hash(replica_index ++ node_id)`. A key belongs to the node holding the
//! first position at or after `hash(key)`, wrapping around to the lowest
//! position past the end of the ring.

use crate::types::NodeId;
use crc::{Crc, CRC_32_ISO_HDLC};
use std::collections::HashMap;

/// Function hashing bytes to a ring position.
pub type HashFn = fn(&[u8]) -> u32;

/// Virtual ring positions per node when none is configured.
pub const DEFAULT_VNODES_PER_NODE: usize = 50;

const CRC32_IEEE: Crc<u32> = Crc::<u32>::new(&CRC_32_ISO_HDLC);

/// Default ring hash: CRC-32 (IEEE).
pub fn crc32_ieee(data: &[u8]) -> u32 {
    CRC32_IEEE.checksum(data)
}

/// A consistent hash ring mapping keys to owning nodes.
#[derive(Debug, Clone)]
pub struct HashRing {
    /// Hash used for both keys and virtual node positions.
    hash: HashFn,

    /// Number of virtual nodes per physical node.
    replicas: usize,

    /// Ring positions, sorted ascending.
    positions: Vec<u32>,

    /// Owning node of each ring position.
    owners: HashMap<u32, NodeId>,

    /// Physical nodes in registration order.
    nodes: Vec<NodeId>,
}

impl HashRing {
    /// Create an empty ring using CRC-32 (IEEE).
    pub fn new(replicas: usize) -> Self {
        Self::with_hash(replicas, crc32_ieee)
    }

    /// Create an empty ring with a custom hash function.
    pub fn with_hash(replicas: usize, hash: HashFn) -> Self {
        Self {
            hash,
            replicas,
            positions: Vec::new(),
            owners: HashMap::new(),
            nodes: Vec::new(),
        }
    }

    /// Number of virtual nodes per physical node.
    pub fn replicas(&self) -> usize {
        self.replicas
    }

    /// Get the number of physical nodes in the ring.
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Get all physical nodes in the ring.
    pub fn nodes(&self) -> &[NodeId] {
        &self.nodes
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    /// Replace the whole ring with exactly `nodes`.
    pub fn set_nodes<I, S>(&mut self, nodes: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<NodeId>,
    {
        self.positions.clear();
        self.owners.clear();
        self.nodes.clear();
        self.add_nodes(nodes);
    }

    /// Add `replicas` positions per node to the existing ring.
    ///
    /// Nodes are never removed; rebuild with [`set_nodes`](Self::set_nodes)
    /// instead.
    pub fn add_nodes<I, S>(&mut self, nodes: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<NodeId>,
    {
        for node in nodes {
            let node = node.into();
            for i in 0..self.replicas {
                let position = (self.hash)(format!("{}{}", i, node).as_bytes());
                self.positions.push(position);
                self.owners.insert(position, node.clone());
            }
            self.nodes.push(node);
        }
        self.positions.sort_unstable();
    }

    /// Get the owner of a key.
    ///
    /// Returns None if the ring is empty.
    pub fn owner(&self, key: &str) -> Option<&str> {
        if self.positions.is_empty() {
            return None;
        }

        let hash = (self.hash)(key.as_bytes());
        let idx = self.positions.partition_point(|&p| p < hash);
        let position = self.positions[idx % self.positions.len()];
        self.owners.get(&position).map(String::as_str)
    }

    /// Get the distribution of keys across nodes for a sample.
    ///
    /// This is useful for testing/monitoring key distribution.
    pub fn get_distribution(&self, sample_size: usize) -> HashMap<NodeId, usize> {
        let mut distribution = HashMap::new();

        for i in 0..sample_size {
            let key = format!("sample_key_{}", i);
            if let Some(owner) = self.owner(&key) {
                *distribution.entry(owner.to_string()).or_insert(0) += 1;
            }
        }

        distribution
    }
}

impl Default for HashRing {
    fn default() -> Self {
        Self::new(DEFAULT_VNODES_PER_NODE)
    }
}
