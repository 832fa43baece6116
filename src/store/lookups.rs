use ulid::Ulid;

use crate::model::*;

use super::{SharedEventState, Store};

impl Store {
    pub fn get_event_state(&self, id: &Ulid) -> Option<SharedEventState> {
        self.events.get(id).map(|e| e.value().clone())
    }

    pub fn event_id_by_title(&self, title: &str) -> Option<Ulid> {
        self.titles.get(title).map(|e| *e.value())
    }

    pub fn get_event_for_booking(&self, booking_id: &Ulid) -> Option<Ulid> {
        self.booking_index.get(booking_id).map(|e| *e.value())
    }

    pub fn event_count(&self) -> usize {
        self.events.len()
    }

    pub fn booking_count(&self) -> usize {
        self.booking_index.len()
    }

    pub fn venue(&self, id: &Ulid) -> Option<Venue> {
        self.venues.get(id).map(|e| e.value().clone())
    }

    pub fn genre(&self, id: &Ulid) -> Option<Genre> {
        self.genres.get(id).map(|e| e.value().clone())
    }

    pub fn genre_by_name(&self, name: &str) -> Option<Genre> {
        let id = self.genre_names.get(name).map(|e| *e.value())?;
        self.genre(&id)
    }

    pub fn performer(&self, id: &Ulid) -> Option<Performer> {
        self.performers.get(id).map(|e| e.value().clone())
    }

    /// Clone out every event handle so no map shard lock is held across an await.
    pub(super) fn event_handles(&self) -> Vec<SharedEventState> {
        self.events.iter().map(|e| e.value().clone()).collect()
    }

    pub async fn find_event_by_id(&self, id: Ulid) -> Option<Event> {
        let state = self.get_event_state(&id)?;
        let guard = state.read().await;
        Some(guard.event.clone())
    }

    pub async fn find_event_by_title(&self, title: &str) -> Option<Event> {
        let id = self.event_id_by_title(title)?;
        self.find_event_by_id(id).await
    }

    pub async fn find_booking_by_id(&self, id: Ulid) -> Option<Booking> {
        let event_id = self.get_event_for_booking(&id)?;
        let state = self.get_event_state(&event_id)?;
        let guard = state.read().await;
        guard.booking(&id).cloned()
    }

    /// A user's bookings in the order they were made.
    pub async fn find_bookings_by_user(&self, user_id: Ulid) -> Vec<Booking> {
        let ids = self
            .user_bookings
            .get(&user_id)
            .map(|e| e.value().clone())
            .unwrap_or_default();
        let mut bookings = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(booking) = self.find_booking_by_id(id).await {
                bookings.push(booking);
            }
        }
        bookings
    }

    /// Total booked seats for every event that has at least one booking.
    pub async fn sum_seats_grouped_by_event(&self) -> Vec<(Ulid, u64)> {
        let mut totals = Vec::new();
        for state in self.event_handles() {
            let guard = state.read().await;
            if !guard.bookings.is_empty() {
                totals.push((guard.event.id, guard.booked_seats()));
            }
        }
        totals
    }

    pub async fn seat_ledger(&self, event_id: Ulid) -> Option<SeatLedger> {
        let state = self.get_event_state(&event_id)?;
        let guard = state.read().await;
        Some(SeatLedger {
            capacity: guard.capacity,
            available: guard.event.available_seats,
            booked: guard.booked_seats(),
        })
    }

    /// Snapshot every event with its venue and genre names, in insertion order.
    pub async fn event_rows(&self) -> Vec<EventRow> {
        let mut rows = Vec::with_capacity(self.events.len());
        for state in self.event_handles() {
            let (event, seq) = {
                let guard = state.read().await;
                (guard.event.clone(), guard.seq)
            };
            rows.push(self.event_row(event, seq));
        }
        rows.sort_by_key(|r| r.seq);
        rows
    }

    pub async fn event_row_by_title(&self, title: &str) -> Option<EventRow> {
        let state = self.get_event_state(&self.event_id_by_title(title)?)?;
        let (event, seq) = {
            let guard = state.read().await;
            (guard.event.clone(), guard.seq)
        };
        Some(self.event_row(event, seq))
    }

    fn event_row(&self, event: Event, seq: u64) -> EventRow {
        let venue_name = self
            .venue(&event.venue_id)
            .map(|v| v.name)
            .unwrap_or_default();
        let genre_name = event.genre_id.and_then(|g| self.genre(&g)).map(|g| g.name);
        EventRow {
            event,
            seq,
            venue_name,
            genre_name,
        }
    }
}
