//! Per-group statistics.
//!
//! Every [`Group`](crate::group::Group) owns a [`GroupStats`] and bumps its
//! counters along the `Get` path:
//!
//! ```text
//!  get ──▶ cache hit? ──yes──▶ cache_hits
//!   │          │no
//!   ▼          ▼
//! gets       loads (one per collapsed execution)
//!              ├─▶ peer_loads  / peer_errors
//!              └─▶ local_loads / local_load_errs
//! ```
//!
//! `server_requests` counts `Get` calls that arrived from a peer.

mod counters;

pub use counters::Counter;

/// Counters for one cache group.
#[derive(Debug)]
pub struct GroupStats {
    /// Any `Get` request, including from peers.
    pub gets: Counter,
    /// Requests answered from the local store.
    pub cache_hits: Counter,
    /// Executions of the miss path after request collapsing.
    pub loads: Counter,
    /// Values served by a remote peer.
    pub peer_loads: Counter,
    /// Remote fetches that failed and fell back to the loader.
    pub peer_errors: Counter,
    /// Successful loads through the local loader.
    pub local_loads: Counter,
    /// Failed loads through the local loader.
    pub local_load_errs: Counter,
    /// `Get` requests that came in over the peer transport.
    pub server_requests: Counter,
}

impl GroupStats {
    pub fn new() -> Self {
        Self {
            gets: Counter::new("ringcache_gets_total", "Get requests, including from peers"),
            cache_hits: Counter::new("ringcache_cache_hits_total", "Requests served from the local store"),
            loads: Counter::new("ringcache_loads_total", "Miss-path executions after collapsing"),
            peer_loads: Counter::new("ringcache_peer_loads_total", "Values served by a remote peer"),
            peer_errors: Counter::new("ringcache_peer_errors_total", "Failed remote fetches"),
            local_loads: Counter::new("ringcache_local_loads_total", "Successful loader calls"),
            local_load_errs: Counter::new("ringcache_local_load_errors_total", "Failed loader calls"),
            server_requests: Counter::new("ringcache_server_requests_total", "Requests received from peers"),
        }
    }

    fn counters(&self) -> [&Counter; 8] {
        [
            &self.gets,
            &self.cache_hits,
            &self.loads,
            &self.peer_loads,
            &self.peer_errors,
            &self.local_loads,
            &self.local_load_errs,
            &self.server_requests,
        ]
    }

    /// Point-in-time copy of all counters.
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            gets: self.gets.get(),
            cache_hits: self.cache_hits.get(),
            loads: self.loads.get(),
            peer_loads: self.peer_loads.get(),
            peer_errors: self.peer_errors.get(),
            local_loads: self.local_loads.get(),
            local_load_errs: self.local_load_errs.get(),
            server_requests: self.server_requests.get(),
        }
    }

    /// Render all counters in Prometheus text format.
    pub fn render(&self, group: &str) -> String {
        let mut out = String::new();
        for counter in self.counters() {
            counter.render(group, &mut out);
        }
        out
    }
}

impl Default for GroupStats {
    fn default() -> Self {
        Self::new()
    }
}

/// Plain copy of [`GroupStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    pub gets: u64,
    pub cache_hits: u64,
    pub loads: u64,
    pub peer_loads: u64,
    pub peer_errors: u64,
    pub local_loads: u64,
    pub local_load_errs: u64,
    pub server_requests: u64,
}

impl StatsSnapshot {
    /// Fraction of gets served from the local store.
    pub fn hit_rate(&self) -> f64 {
        if self.gets == 0 {
            0.0
        } else {
            self.cache_hits as f64 / self.gets as f64
        }
    }
}
