use std::sync::Arc;

use tracing::{info, warn};

use boxoffice::compactor;
use boxoffice::{Config, Store, StoreOptions, TopEventsAggregator, QueryCache};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    boxoffice::observability::init_logging();

    let config = Config::from_env();
    boxoffice::observability::init(config.metrics_port)?;

    // Ensure data directory exists
    std::fs::create_dir_all(&config.data_dir)?;

    let wal_path = config.wal_path();
    let store = Arc::new(Store::open(
        wal_path.clone(),
        StoreOptions {
            lock_timeout: config.lock_timeout,
        },
    )?);

    let compactor_store = store.clone();
    let threshold = config.compact_threshold;
    let every = config.compact_interval;
    let compactor_task = tokio::spawn(async move {
        compactor::run_compactor(compactor_store, threshold, every).await;
    });

    let cache = Arc::new(QueryCache::new(config.cache_ttl));
    let top = TopEventsAggregator::new(store.clone(), cache).top_events_by_bookings(3).await;

    info!("boxoffice ready");
    info!("  wal: {}", wal_path.display());
    info!("  events: {}", store.event_count());
    info!("  bookings: {}", store.booking_count());
    for entry in &top {
        info!("  #{} {} ({} seats booked)", entry.rank, entry.title, entry.total_booked_seats);
    }
    info!("  compaction: every {} appends, checked every {:?}", threshold, every);
    info!("  metrics: {}", config.metrics_port.map_or("disabled".to_string(), |p| format!("http://0.0.0.0:{p}/metrics")));

    shutdown_signal().await?;
    info!("shutdown signal received");

    compactor_task.abort();
    if let Err(e) = store.compact_wal().await {
        warn!("final compaction failed: {e}");
    }
    info!("boxoffice stopped");
    Ok(())
}

async fn shutdown_signal() -> std::io::Result<()> {
    let ctrl_c = tokio::signal::ctrl_c();
    #[cfg(unix)]
    {
        let mut sigterm =
            tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())?;
        tokio::select! {
            r = ctrl_c => r?,
            _ = sigterm.recv() => {}
        }
    }
    #[cfg(not(unix))]
    {
        ctrl_c.await?;
    }
    Ok(())
}
