//! Memoizes a slow lookup, then invalidates and force-refreshes it.
//!
//! Run with `RUST_LOG=callcache=debug cargo run --example basic` to see the
//! keys the wrapper reads and writes.

use callcache::{memoize, Error, MemoryBackend};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing_subscriber::EnvFilter;

async fn exchange_rate(args: (String, String)) -> Result<f64, Error> {
    tokio::time::sleep(Duration::from_millis(200)).await;
    let (from, to) = args;
    Ok(if from == to { 1.0 } else { 0.92 })
}

#[tokio::main]
async fn main() -> Result<(), Error> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let backend = Arc::new(MemoryBackend::new());
    let rates = memoize(300)
        .group("rates")
        .backend(backend.clone())
        .wrap(exchange_rate)?;

    let args = ("USD".to_string(), "EUR".to_string());
    println!("key: {}", rates.cache_key(&args)?);

    for attempt in 1..=3 {
        let start = Instant::now();
        let rate = rates.call(args.clone()).await?;
        println!("attempt {}: {} in {:?}", attempt, rate, start.elapsed());
    }

    rates.invalidate(&args).await?;
    let start = Instant::now();
    rates.call(args.clone()).await?;
    println!("after invalidate: {:?}", start.elapsed());

    let rate = rates.force_recalculate(args).await?;
    println!("forced: {}", rate);

    rates.invalidate_group().await?;

    let metrics = rates.metrics();
    println!(
        "hits: {}, misses: {}, hit rate: {:.2}",
        metrics.hits(),
        metrics.misses(),
        metrics.hit_rate()
    );
    Ok(())
}
