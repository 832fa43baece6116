use std::net::SocketAddr;

use tracing_subscriber::EnvFilter;

// ── Booking lifecycle ────────────────────────────────────────────

/// Counter: bookings created.
pub const BOOKINGS_CREATED_TOTAL: &str = "boxoffice_bookings_created_total";

/// Counter: bookings cancelled.
pub const BOOKINGS_CANCELLED_TOTAL: &str = "boxoffice_bookings_cancelled_total";

/// Counter: create/cancel calls that failed. Labels: op, kind.
pub const BOOKINGS_REJECTED_TOTAL: &str = "boxoffice_bookings_rejected_total";

/// Histogram: seats requested per successful booking.
pub const BOOKING_SEATS: &str = "boxoffice_booking_seats";

// ── Store ────────────────────────────────────────────────────────

/// Counter: transactions dropped with staged changes.
pub const TX_ROLLBACKS_TOTAL: &str = "boxoffice_tx_rollbacks_total";

/// Histogram: time spent waiting for an event's row lock, in seconds.
pub const LOCK_WAIT_SECONDS: &str = "boxoffice_lock_wait_seconds";

/// Histogram: WAL group-commit flush duration in seconds.
pub const WAL_FLUSH_DURATION_SECONDS: &str = "boxoffice_wal_flush_duration_seconds";

/// Histogram: WAL group-commit batch size (commits per flush).
pub const WAL_FLUSH_BATCH_SIZE: &str = "boxoffice_wal_flush_batch_size";

/// Counter: WAL compactions. Labels: status.
pub const WAL_COMPACTIONS_TOTAL: &str = "boxoffice_wal_compactions_total";

/// Gauge: events currently held by the store.
pub const EVENTS_ACTIVE: &str = "boxoffice_events_active";

// ── Read cache ───────────────────────────────────────────────────

/// Counter: cache hits. Labels: cache.
pub const CACHE_HITS_TOTAL: &str = "boxoffice_cache_hits_total";

/// Counter: cache misses. Labels: cache.
pub const CACHE_MISSES_TOTAL: &str = "boxoffice_cache_misses_total";

/// Counter: whole-cache invalidations.
pub const CACHE_INVALIDATIONS_TOTAL: &str = "boxoffice_cache_invalidations_total";

/// Install the global tracing subscriber, filtered by `RUST_LOG` (default `info`).
pub fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    // A subscriber may already be installed (tests, embedding); keep it.
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}

/// Install Prometheus metrics exporter on the given port. No-op if port is None.
pub fn init(port: Option<u16>) -> Result<(), metrics_exporter_prometheus::BuildError> {
    let Some(port) = port else { return Ok(()) };
    let addr: SocketAddr = ([0, 0, 0, 0], port).into();
    metrics_exporter_prometheus::PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()?;
    tracing::info!("metrics endpoint: http://0.0.0.0:{port}/metrics");
    Ok(())
}
