//! Example of a 3-node cache cluster on loopback.
//!
//! All three nodes run in this process on ports 8001-8003, each with its own
//! registry and peer pool. Every key is then requested through every node so
//! the logs show where it was loaded and where it was fetched from a peer.
//!
//! Run with:
//!   RUST_LOG=info,ringcache=debug cargo run --example cluster
//!
//! While it waits for Ctrl+C the nodes can be queried directly:
//!   curl http://127.0.0.1:8001/_geecache/scores/Tom
//!   curl http://127.0.0.1:8001/metrics

use bytes::Bytes;
use ringcache::{BoxError, GroupRegistry, HttpPool, LoaderFn, PoolConfig};
use std::collections::HashMap;
use std::env;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

fn slow_db() -> Arc<HashMap<&'static str, &'static str>> {
    Arc::new(HashMap::from([("Tom", "630"), ("Jack", "589"), ("Sam", "567")]))
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string()))
        .init();

    let addrs: Vec<String> = (8001..=8003)
        .map(|port| format!("http://127.0.0.1:{}", port))
        .collect();
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let mut groups = Vec::new();
    let mut servers = Vec::new();
    for (i, addr) in addrs.iter().enumerate() {
        let db = slow_db();
        let registry = Arc::new(GroupRegistry::new());
        let group = registry.new_group(
            "scores",
            2 << 10,
            LoaderFn(move |key: String| {
                let db = db.clone();
                async move {
                    tracing::info!(key = %key, "[SlowDB] search key");
                    tokio::time::sleep(Duration::from_millis(50)).await;
                    db.get(key.as_str())
                        .map(|&v| Bytes::from_static(v.as_bytes()))
                        .ok_or_else(|| BoxError::from(format!("{} not exist", key)))
                }
            }),
        )?;

        let pool = Arc::new(HttpPool::new(PoolConfig::new(addr.clone()), registry)?);
        pool.set_peers(addrs.iter().cloned())?;
        group.register_peers(pool.clone())?;

        let listener = tokio::net::TcpListener::bind(("127.0.0.1", 8001 + i as u16)).await?;
        let mut rx = shutdown_rx.clone();
        servers.push(tokio::spawn(pool.serve(listener, async move {
            let _ = rx.changed().await;
        })));
        groups.push(group);
    }

    for key in ["Tom", "Jack", "Sam", "Tom", "unknown"] {
        for (addr, group) in addrs.iter().zip(&groups) {
            match group.get(key).await {
                Ok(value) => println!("{} via {} = {}", key, addr, value),
                Err(e) => println!("{} via {} failed: {}", key, addr, e),
            }
        }
    }

    println!("\nPer-node statistics:");
    for (addr, group) in addrs.iter().zip(&groups) {
        let stats = group.stats_snapshot();
        println!(
            "  {}: gets={} hits={} peer_loads={} local_loads={} server_requests={} hit_rate={:.2}",
            addr,
            stats.gets,
            stats.cache_hits,
            stats.peer_loads,
            stats.local_loads,
            stats.server_requests,
            stats.hit_rate()
        );
    }

    println!("\nPress Ctrl+C to stop...");
    tokio::signal::ctrl_c().await?;

    println!("Shutting down...");
    shutdown_tx.send(true)?;
    for server in servers {
        server.await??;
    }

    Ok(())
}
