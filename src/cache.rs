//! Generation-stamped read caches for the query side.
//!
//! Every entry records the cache generation that was current when its value
//! started being computed. [`QueryCache::invalidate_all`] bumps the shared
//! generation, so a value computed concurrently with a write is stored with
//! an old stamp and never served.

use std::hash::Hash;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use tracing::debug;

use crate::model::{EventDetails, EventSummary, TopEvent};
use crate::query::{EventFilter, Page, PageRequest};

struct CachedValue<V> {
    value: V,
    generation: u64,
    inserted_at: Instant,
}

pub struct ReadCache<K, V> {
    name: &'static str,
    entries: DashMap<K, CachedValue<V>>,
    generation: Arc<AtomicU64>,
    ttl: Option<Duration>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl<K: Eq + Hash, V: Clone> ReadCache<K, V> {
    pub fn new(name: &'static str, generation: Arc<AtomicU64>, ttl: Option<Duration>) -> Self {
        Self {
            name,
            entries: DashMap::new(),
            generation,
            ttl,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    /// Stamp to pass to [`ReadCache::insert`]; read it before computing the value.
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }

    pub fn get(&self, key: &K) -> Option<V> {
        let current = self.generation();
        let fresh = self.entries.get(key).and_then(|entry| {
            let expired = self
                .ttl
                .is_some_and(|ttl| entry.inserted_at.elapsed() >= ttl);
            (entry.generation == current && !expired).then(|| entry.value.clone())
        });
        match fresh {
            Some(value) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                metrics::counter!(crate::observability::CACHE_HITS_TOTAL, "cache" => self.name)
                    .increment(1);
                Some(value)
            }
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                metrics::counter!(crate::observability::CACHE_MISSES_TOTAL, "cache" => self.name)
                    .increment(1);
                None
            }
        }
    }

    pub fn insert(&self, key: K, value: V, generation: u64) {
        if generation != self.generation() {
            return;
        }
        self.entries.insert(
            key,
            CachedValue {
                value,
                generation,
                inserted_at: Instant::now(),
            },
        );
    }

    fn clear(&self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn hits(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }

    pub fn misses(&self) -> u64 {
        self.misses.load(Ordering::Relaxed)
    }
}

/// The caches in front of the query engine and the ranking.
pub struct QueryCache {
    generation: Arc<AtomicU64>,
    pub listings: ReadCache<(EventFilter, Option<PageRequest>), Page<EventSummary>>,
    pub details: ReadCache<String, EventDetails>,
    pub top_events: ReadCache<usize, Vec<TopEvent>>,
}

impl QueryCache {
    pub fn new(ttl: Option<Duration>) -> Self {
        let generation = Arc::new(AtomicU64::new(0));
        Self {
            listings: ReadCache::new("listings", generation.clone(), ttl),
            details: ReadCache::new("details", generation.clone(), ttl),
            top_events: ReadCache::new("top_events", generation.clone(), ttl),
            generation,
        }
    }

    /// Called after every committed write.
    pub fn invalidate_all(&self) {
        let generation = self.generation.fetch_add(1, Ordering::AcqRel) + 1;
        self.listings.clear();
        self.details.clear();
        self.top_events.clear();
        metrics::counter!(crate::observability::CACHE_INVALIDATIONS_TOTAL).increment(1);
        debug!(generation, "query cache invalidated");
    }
}

impl Default for QueryCache {
    fn default() -> Self {
        Self::new(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cache(ttl: Option<Duration>) -> ReadCache<u32, String> {
        ReadCache::new("test", Arc::new(AtomicU64::new(0)), ttl)
    }

    #[test]
    fn hit_after_insert() {
        let c = cache(None);
        assert_eq!(c.get(&1), None);
        c.insert(1, "one".into(), c.generation());
        assert_eq!(c.get(&1).as_deref(), Some("one"));
        assert_eq!(c.hits(), 1);
        assert_eq!(c.misses(), 1);
    }

    #[test]
    fn stale_generation_is_never_served() {
        let c = cache(None);
        let stamp = c.generation();
        // A write lands while the value is being computed.
        c.generation.fetch_add(1, Ordering::AcqRel);
        c.insert(1, "stale".into(), stamp);
        assert_eq!(c.get(&1), None);
        assert!(c.is_empty());
    }

    #[test]
    fn entries_expire_after_ttl() {
        let c = cache(Some(Duration::from_millis(20)));
        c.insert(1, "one".into(), c.generation());
        assert!(c.get(&1).is_some());
        std::thread::sleep(Duration::from_millis(40));
        assert!(c.get(&1).is_none());
    }

    #[test]
    fn invalidate_all_clears_every_cache() {
        let qc = QueryCache::default();
        let stamp = qc.top_events.generation();
        qc.top_events.insert(5, vec![], stamp);
        assert_eq!(qc.top_events.len(), 1);

        qc.invalidate_all();
        assert!(qc.top_events.is_empty());
        assert!(qc.top_events.get(&5).is_none());
        assert_eq!(qc.top_events.generation(), stamp + 1);
    }
}
