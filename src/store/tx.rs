use tokio::sync::{OwnedRwLockReadGuard, OwnedRwLockWriteGuard};
use tracing::debug;
use ulid::Ulid;

use crate::limits::MAX_BOOKINGS_PER_EVENT;
use crate::model::*;

use super::{Store, StoreError};

/// A unit of work on one event.
///
/// Holds the event's row lock until dropped. Mutations are staged and only
/// reach the WAL and the in-memory state on [`Transaction::commit`]; a
/// transaction dropped on any other path leaves no trace.
pub struct Transaction<'a> {
    store: &'a Store,
    guard: OwnedRwLockWriteGuard<EventState>,
    _gate: OwnedRwLockReadGuard<()>,
    /// Seat counter as seen through the staged changes.
    available_seats: u32,
    staged: Vec<Change>,
    committed: bool,
}

impl<'a> Transaction<'a> {
    pub(super) fn new(
        store: &'a Store,
        gate: OwnedRwLockReadGuard<()>,
        guard: OwnedRwLockWriteGuard<EventState>,
    ) -> Self {
        let available_seats = guard.event.available_seats;
        Self {
            store,
            guard,
            _gate: gate,
            available_seats,
            staged: Vec::new(),
            committed: false,
        }
    }

    pub fn event_id(&self) -> Ulid {
        self.guard.event.id
    }

    pub fn available_seats(&self) -> u32 {
        self.available_seats
    }

    /// Reduce the seat counter by `seats` iff at least that many are available.
    pub fn conditional_decrement_seats(&mut self, seats: u32) -> bool {
        if self.available_seats < seats {
            return false;
        }
        if seats > 0 {
            self.available_seats -= seats;
            self.staged.push(Change::SeatsDecremented {
                event_id: self.event_id(),
                seats,
            });
        }
        true
    }

    /// Return seats to the counter. The counter never exceeds the event's capacity.
    pub fn increment_seats(&mut self, seats: u32) -> Result<(), StoreError> {
        let restored = self
            .available_seats
            .checked_add(seats)
            .filter(|n| *n <= self.guard.capacity)
            .ok_or(StoreError::Invalid("seat counter would exceed event capacity"))?;
        if seats > 0 {
            self.available_seats = restored;
            self.staged.push(Change::SeatsIncremented {
                event_id: self.event_id(),
                seats,
            });
        }
        Ok(())
    }

    pub fn insert_booking(&mut self, booking: Booking) -> Result<Booking, StoreError> {
        if booking.event_id != self.event_id() {
            return Err(StoreError::Invalid("booking belongs to another event"));
        }
        if booking.seats_count == 0 {
            return Err(StoreError::Invalid("booking must reserve at least one seat"));
        }
        if self.find_booking(&booking.id).is_some()
            || self.store.booking_index.contains_key(&booking.id)
        {
            return Err(StoreError::AlreadyExists(booking.id));
        }
        let staged_inserts = self
            .staged
            .iter()
            .filter(|c| matches!(c, Change::BookingInserted { .. }))
            .count();
        if self.guard.bookings.len() + staged_inserts >= MAX_BOOKINGS_PER_EVENT {
            return Err(StoreError::LimitExceeded("too many bookings on event"));
        }

        self.staged.push(Change::BookingInserted {
            booking: booking.clone(),
        });
        Ok(booking)
    }

    /// Look a booking of this event up, seeing staged inserts and deletes.
    pub fn find_booking(&self, id: &Ulid) -> Option<Booking> {
        let mut found = self.guard.booking(id).cloned();
        for change in &self.staged {
            match change {
                Change::BookingInserted { booking } if booking.id == *id => {
                    found = Some(booking.clone());
                }
                Change::BookingDeleted { id: deleted, .. } if deleted == id => found = None,
                _ => {}
            }
        }
        found
    }

    pub fn delete_booking(&mut self, id: Ulid) -> Result<Booking, StoreError> {
        let booking = self.find_booking(&id).ok_or(StoreError::NotFound(id))?;
        self.staged.push(Change::BookingDeleted {
            id,
            event_id: self.event_id(),
        });
        Ok(booking)
    }

    /// Write the staged changes as one WAL frame, then apply them.
    pub async fn commit(mut self) -> Result<(), StoreError> {
        if !self.staged.is_empty() {
            self.store.wal_append(self.staged.clone()).await?;
            for change in &self.staged {
                self.store.apply_row(&mut self.guard, change);
            }
            debug!(
                event_id = %self.guard.event.id,
                changes = self.staged.len(),
                available_seats = self.guard.event.available_seats,
                "transaction committed"
            );
        }
        self.committed = true;
        Ok(())
    }
}

impl Drop for Transaction<'_> {
    fn drop(&mut self) {
        if !self.committed && !self.staged.is_empty() {
            metrics::counter!(crate::observability::TX_ROLLBACKS_TOTAL).increment(1);
            debug!(
                event_id = %self.guard.event.id,
                discarded = self.staged.len(),
                "transaction rolled back"
            );
        }
    }
}
