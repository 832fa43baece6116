use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use crate::store::{Store, StoreError};

/// Compact once at least `threshold` commits were appended since the last
/// compaction. Returns whether a compaction ran.
pub async fn maybe_compact(store: &Store, threshold: u64) -> Result<bool, StoreError> {
    let appends = store.wal_appends_since_compact().await;
    if appends < threshold.max(1) {
        return Ok(false);
    }
    debug!(appends, threshold, "compacting WAL");
    match store.compact_wal().await {
        Ok(()) => {
            metrics::counter!(crate::observability::WAL_COMPACTIONS_TOTAL, "status" => "ok")
                .increment(1);
            Ok(true)
        }
        Err(e) => {
            metrics::counter!(crate::observability::WAL_COMPACTIONS_TOTAL, "status" => "error")
                .increment(1);
            Err(e)
        }
    }
}

/// Background task that keeps the WAL short.
pub async fn run_compactor(store: Arc<Store>, threshold: u64, every: Duration) {
    let mut interval = tokio::time::interval(every);
    loop {
        interval.tick().await;
        if let Err(e) = maybe_compact(&store, threshold).await {
            // Next tick retries.
            warn!("WAL compaction failed: {e}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::*;
    use crate::store::StoreOptions;
    use std::path::PathBuf;

    fn test_wal_path(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join("boxoffice_test_compactor");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join(name);
        let _ = std::fs::remove_file(&path);
        path
    }

    #[tokio::test]
    async fn compacts_only_past_threshold() {
        let store = Store::open(test_wal_path("threshold.wal"), StoreOptions::default()).unwrap();
        store.add_genre("Blues").await.unwrap();
        store.add_genre("Folk").await.unwrap();

        assert!(!maybe_compact(&store, 3).await.unwrap());
        store.add_genre("Soul").await.unwrap();
        assert!(maybe_compact(&store, 3).await.unwrap());
        assert_eq!(store.wal_appends_since_compact().await, 0);
        assert!(!maybe_compact(&store, 3).await.unwrap());
        assert!(store.genre_by_name("Soul").is_some());
    }

    #[tokio::test]
    async fn background_task_compacts() {
        let path = test_wal_path("background.wal");
        let store = Arc::new(Store::open(path.clone(), StoreOptions::default()).unwrap());
        let venue = store.add_venue("Hall", "5 Road", 100).await.unwrap();
        let event = store
            .create_event(NewEvent {
                title: "Matinee".into(),
                description: "Afternoon screening".into(),
                starts_at: now_ms() + 86_400_000,
                venue_id: venue.id,
                category: EventCategory::Cinema,
                genre_id: None,
                performer_ids: vec![],
                image_url: None,
                available_seats: 100,
            })
            .await
            .unwrap();

        let task = tokio::spawn(run_compactor(store.clone(), 1, Duration::from_millis(10)));
        let mut compacted = false;
        for _ in 0..100 {
            tokio::time::sleep(Duration::from_millis(10)).await;
            if store.wal_appends_since_compact().await == 0 {
                compacted = true;
                break;
            }
        }
        task.abort();
        assert!(compacted);

        drop(store);
        let reopened = Store::open(path, StoreOptions::default()).unwrap();
        assert_eq!(reopened.find_event_by_id(event.id).await.unwrap(), event);
    }
}
