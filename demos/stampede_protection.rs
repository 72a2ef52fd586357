//! Cache Stampede Protection Example
//!
//! Ten workers miss on the same ticker key at once; only one of them reaches
//! the upstream, the rest wait for its answer.
//!
//! Run with: cargo run --example stampede_protection

use signal_refresh::{CacheConfig, CacheManager};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Slow upstream quote lookup
async fn fetch_ticker(worker: u32) -> anyhow::Result<serde_json::Value> {
    println!("  [Worker {worker}] Calling exchange API...");
    tokio::time::sleep(Duration::from_millis(500)).await;
    println!("  [Worker {worker}] Exchange API answered");
    Ok(serde_json::json!({
        "symbol": "BTCUSDT",
        "price": 64250.5,
        "fetched_by": worker,
    }))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    signal_refresh::telemetry::init_tracing("signal_refresh=debug");
    println!("=== Signal Refresh: Stampede Protection Demo ===\n");

    let cache = Arc::new(CacheManager::new(CacheConfig::from_env()));

    println!("Scenario: 10 concurrent workers requesting the same ticker\n");

    let start = Instant::now();
    let mut handles = vec![];

    for i in 1..=10 {
        let cache = Arc::clone(&cache);
        let handle = tokio::spawn(async move {
            let worker_start = Instant::now();
            let result = cache
                .get_or_fetch("ticker:binance:BTCUSDT", None, || fetch_ticker(i))
                .await;
            println!("  [Worker {i}] Completed in {:?}", worker_start.elapsed());
            result
        });
        handles.push(handle);
    }

    for handle in handles {
        let value = handle.await??;
        assert_eq!(value["symbol"], "BTCUSDT");
    }

    let total_elapsed = start.elapsed();
    let stats = cache.stats();

    println!("\n=== Results ===");
    println!("Total time: {total_elapsed:?}");
    println!("Upstream fetches: {}", stats.upstream_fetches);
    println!("Coalesced waiters: {}", stats.coalesced_waits);

    if stats.upstream_fetches == 1 {
        println!("Stampede protection working: one upstream call served all workers.");
    } else {
        println!("Warning: expected one upstream call, saw {}", stats.upstream_fetches);
    }

    println!("\n=== Cache Statistics ===");
    println!("Entries: {}", stats.size);
    println!("Hits: {} / misses: {} ({:.1}% hit rate)", stats.hits, stats.misses, stats.hit_rate);

    Ok(())
}
