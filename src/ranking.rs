use std::collections::HashMap;
use std::sync::Arc;

use ulid::Ulid;

use crate::cache::QueryCache;
use crate::limits::MAX_TOP_EVENTS;
use crate::model::TopEvent;
use crate::store::Store;

/// Per-event input to the ranking.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventTotal {
    pub event_id: Ulid,
    pub title: String,
    pub image_url: Option<String>,
    pub total_booked_seats: u64,
}

/// Order by total descending, then title ascending; keep `limit`; rank from 1.
pub fn rank(mut totals: Vec<EventTotal>, limit: usize) -> Vec<TopEvent> {
    totals.sort_by(|a, b| {
        b.total_booked_seats
            .cmp(&a.total_booked_seats)
            .then_with(|| a.title.cmp(&b.title))
    });
    totals
        .into_iter()
        .take(limit)
        .enumerate()
        .map(|(i, t)| TopEvent {
            event_id: t.event_id,
            title: t.title,
            image_url: t.image_url,
            total_booked_seats: t.total_booked_seats,
            rank: i + 1,
        })
        .collect()
}

pub struct TopEventsAggregator {
    store: Arc<Store>,
    cache: Arc<QueryCache>,
}

impl TopEventsAggregator {
    pub fn new(store: Arc<Store>, cache: Arc<QueryCache>) -> Self {
        Self { store, cache }
    }

    /// Events ranked by booked seats. Events without bookings count as 0.
    /// `limit` is capped at [`MAX_TOP_EVENTS`].
    pub async fn top_events_by_bookings(&self, limit: usize) -> Vec<TopEvent> {
        let limit = limit.min(MAX_TOP_EVENTS);
        if limit == 0 {
            return Vec::new();
        }
        if let Some(hit) = self.cache.top_events.get(&limit) {
            return hit;
        }

        let generation = self.cache.top_events.generation();
        let booked: HashMap<Ulid, u64> = self
            .store
            .sum_seats_grouped_by_event()
            .await
            .into_iter()
            .collect();
        let totals = self
            .store
            .event_rows()
            .await
            .into_iter()
            .map(|row| EventTotal {
                total_booked_seats: booked.get(&row.event.id).copied().unwrap_or(0),
                event_id: row.event.id,
                title: row.event.title,
                image_url: row.event.image_url,
            })
            .collect();
        let ranked = rank(totals, limit);
        self.cache.top_events.insert(limit, ranked.clone(), generation);
        ranked
    }
}
