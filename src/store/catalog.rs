use std::sync::atomic::Ordering;

use dashmap::mapref::entry::Entry;
use tokio::sync::oneshot;
use tracing::info;
use ulid::Ulid;

use crate::limits::*;
use crate::model::*;
use crate::validate;

use super::{Store, StoreError, WalCommand};

impl Store {
    pub async fn add_venue(
        &self,
        name: &str,
        address: &str,
        capacity: u32,
    ) -> Result<Venue, StoreError> {
        let venue = Venue {
            id: Ulid::new(),
            name: validate::name(name)?,
            address: validate::name(address)?,
            capacity,
        };
        let _gate = self.commit_gate.read().await;
        let change = Change::VenueAdded {
            venue: venue.clone(),
        };
        self.wal_append(vec![change.clone()]).await?;
        self.apply_catalog(&change);
        Ok(venue)
    }

    /// Genre names are unique.
    pub async fn add_genre(&self, name: &str) -> Result<Genre, StoreError> {
        let genre = Genre {
            id: Ulid::new(),
            name: validate::name(name)?,
        };
        let _gate = self.commit_gate.read().await;
        match self.genre_names.entry(genre.name.clone()) {
            Entry::Occupied(_) => return Err(StoreError::DuplicateGenre(genre.name)),
            Entry::Vacant(slot) => {
                slot.insert(genre.id);
            }
        }
        let change = Change::GenreAdded {
            genre: genre.clone(),
        };
        if let Err(e) = self.wal_append(vec![change.clone()]).await {
            self.genre_names.remove(&genre.name);
            return Err(e);
        }
        self.apply_catalog(&change);
        Ok(genre)
    }

    pub async fn add_performer(&self, name: &str) -> Result<Performer, StoreError> {
        let performer = Performer {
            id: Ulid::new(),
            name: validate::name(name)?,
        };
        let _gate = self.commit_gate.read().await;
        let change = Change::PerformerAdded {
            performer: performer.clone(),
        };
        self.wal_append(vec![change.clone()]).await?;
        self.apply_catalog(&change);
        Ok(performer)
    }

    /// Create an event. Its initial seat count becomes its fixed capacity.
    pub async fn create_event(&self, new: NewEvent) -> Result<Event, StoreError> {
        let new = validate::new_event(new, now_ms())?;
        if self.events.len() >= MAX_EVENTS {
            return Err(StoreError::LimitExceeded("too many events"));
        }
        let venue = self
            .venue(&new.venue_id)
            .ok_or(StoreError::NotFound(new.venue_id))?;
        if new.available_seats > venue.capacity {
            return Err(StoreError::Invalid("event seats exceed venue capacity"));
        }
        if let Some(genre_id) = new.genre_id
            && self.genre(&genre_id).is_none()
        {
            return Err(StoreError::NotFound(genre_id));
        }
        if let Some(missing) = new
            .performer_ids
            .iter()
            .find(|p| self.performer(p).is_none())
        {
            return Err(StoreError::NotFound(*missing));
        }

        let event = Event {
            id: Ulid::new(),
            title: new.title,
            description: new.description,
            starts_at: new.starts_at,
            venue_id: new.venue_id,
            category: new.category,
            genre_id: new.genre_id,
            performer_ids: new.performer_ids,
            image_url: new.image_url,
            available_seats: new.available_seats,
        };

        let _gate = self.commit_gate.read().await;
        // Reserve the title before the WAL write so two creators can't both pass.
        match self.titles.entry(event.title.clone()) {
            Entry::Occupied(_) => return Err(StoreError::DuplicateTitle(event.title)),
            Entry::Vacant(slot) => {
                slot.insert(event.id);
            }
        }

        let change = Change::EventCreated {
            capacity: event.available_seats,
            seq: self.next_seq.fetch_add(1, Ordering::SeqCst),
            event: event.clone(),
        };
        if let Err(e) = self.wal_append(vec![change.clone()]).await {
            self.titles.remove(&event.title);
            return Err(e);
        }
        self.apply_catalog(&change);
        metrics::gauge!(crate::observability::EVENTS_ACTIVE).set(self.events.len() as f64);
        info!(event_id = %event.id, title = %event.title, seats = event.available_seats, "event created");
        Ok(event)
    }

    /// Delete an event by title. Refused while the event has bookings.
    pub async fn delete_event(&self, title: &str) -> Result<(), StoreError> {
        let _gate = self.commit_gate.read().await;
        let id = self
            .event_id_by_title(title)
            .ok_or_else(|| StoreError::TitleNotFound(title.to_string()))?;
        let state = self.get_event_state(&id).ok_or(StoreError::NotFound(id))?;
        let guard = tokio::time::timeout(self.options.lock_timeout, state.write())
            .await
            .map_err(|_| StoreError::LockTimeout(id))?;
        if !self.events.contains_key(&id) {
            return Err(StoreError::NotFound(id));
        }
        if !guard.bookings.is_empty() {
            return Err(StoreError::EventHasBookings(title.to_string()));
        }

        let change = Change::EventDeleted {
            id,
            title: guard.event.title.clone(),
        };
        self.wal_append(vec![change.clone()]).await?;
        self.apply_catalog(&change);
        drop(guard);
        metrics::gauge!(crate::observability::EVENTS_ACTIVE).set(self.events.len() as f64);
        info!(event_id = %id, title, "event deleted");
        Ok(())
    }

    /// Rewrite the WAL as the minimal change list that recreates the current
    /// state. Waits for in-flight transactions and blocks new ones meanwhile.
    pub async fn compact_wal(&self) -> Result<(), StoreError> {
        let _gate = self.commit_gate.write().await;

        let mut changes: Vec<Change> = Vec::new();
        changes.extend(self.venues.iter().map(|e| Change::VenueAdded {
            venue: e.value().clone(),
        }));
        changes.extend(self.genres.iter().map(|e| Change::GenreAdded {
            genre: e.value().clone(),
        }));
        changes.extend(self.performers.iter().map(|e| Change::PerformerAdded {
            performer: e.value().clone(),
        }));

        let mut states = Vec::with_capacity(self.events.len());
        for state in self.event_handles() {
            let guard = state.read().await;
            states.push((*guard).clone());
        }
        states.sort_by_key(|s| s.seq);

        let mut bookings = 0usize;
        for state in states {
            changes.push(Change::EventCreated {
                event: state.event,
                capacity: state.capacity,
                seq: state.seq,
            });
            bookings += state.bookings.len();
            changes.extend(
                state
                    .bookings
                    .into_iter()
                    .map(|booking| Change::BookingInserted { booking }),
            );
        }

        let total = changes.len();
        let (tx, rx) = oneshot::channel();
        self.wal_tx
            .send(WalCommand::Compact {
                changes,
                response: tx,
            })
            .await
            .map_err(|_| StoreError::Wal("WAL writer shut down".into()))?;
        rx.await
            .map_err(|_| StoreError::Wal("WAL writer dropped response".into()))?
            .map_err(|e| StoreError::Wal(e.to_string()))?;
        info!(changes = total, bookings, "WAL compacted");
        Ok(())
    }

    pub async fn wal_appends_since_compact(&self) -> u64 {
        let (tx, rx) = oneshot::channel();
        if self
            .wal_tx
            .send(WalCommand::AppendsSinceCompact { response: tx })
            .await
            .is_err()
        {
            return 0;
        }
        rx.await.unwrap_or(0)
    }
}
