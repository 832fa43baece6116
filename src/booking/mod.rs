//! Booking lifecycle: create and cancel bookings together with the seat
//! counter change they cause, inside one store transaction.

mod error;

pub use error::BookingError;

use std::sync::{Arc, Mutex};

use tracing::{info, warn};
use ulid::{Generator, Ulid};

use crate::cache::QueryCache;
use crate::directory::DirectoryGateway;
use crate::model::*;
use crate::store::{Store, StoreError};
use crate::validate;

pub struct BookingManager {
    store: Arc<Store>,
    directory: Arc<dyn DirectoryGateway>,
    cache: Arc<QueryCache>,
    ids: Mutex<Generator>,
}

impl BookingManager {
    pub fn new(
        store: Arc<Store>,
        directory: Arc<dyn DirectoryGateway>,
        cache: Arc<QueryCache>,
    ) -> Self {
        Self {
            store,
            directory,
            cache,
            ids: Mutex::new(Generator::new()),
        }
    }

    /// Monotonic within this process, so booking ids sort by creation.
    fn next_id(&self) -> Ulid {
        self.ids
            .lock()
            .ok()
            .and_then(|mut g| g.generate().ok())
            .unwrap_or_else(Ulid::new)
    }

    async fn resolve_principal(&self, principal: &str) -> Result<User, BookingError> {
        self.directory
            .resolve_user(principal)
            .await
            .ok_or_else(|| BookingError::UserNotFound(principal.to_string()))
    }

    fn resolve_event(&self, key: &EventKey) -> Result<Ulid, BookingError> {
        let id = match key {
            EventKey::Id(id) => self.store.get_event_state(id).map(|_| *id),
            EventKey::Title(title) => self.store.event_id_by_title(title.trim()),
        };
        id.ok_or_else(|| BookingError::EventNotFound(key.to_string()))
    }

    /// Reserve `seats_count` seats of an event for the principal.
    pub async fn create_booking(
        &self,
        principal: &str,
        event: impl Into<EventKey>,
        seats_count: i64,
        comment: Option<&str>,
    ) -> Result<Booking, BookingError> {
        let result = self.try_create(principal, event.into(), seats_count, comment).await;
        match &result {
            Ok(booking) => {
                metrics::counter!(crate::observability::BOOKINGS_CREATED_TOTAL).increment(1);
                metrics::histogram!(crate::observability::BOOKING_SEATS)
                    .record(booking.seats_count as f64);
                info!(
                    booking_id = %booking.id,
                    event_id = %booking.event_id,
                    user_id = %booking.user_id,
                    seats = booking.seats_count,
                    "booking created"
                );
            }
            Err(e) => rejected("create", principal, e),
        }
        result
    }

    async fn try_create(
        &self,
        principal: &str,
        key: EventKey,
        seats_count: i64,
        comment: Option<&str>,
    ) -> Result<Booking, BookingError> {
        let seats = validate::seats_count(seats_count)?;
        let comment = validate::comment(comment)?;
        let user = self.resolve_principal(principal).await?;
        let event_id = self.resolve_event(&key)?;

        let id = self.next_id();
        let booking = Booking {
            id,
            user_id: user.id,
            event_id,
            seats_count: seats,
            comment,
            created_at: now_ms(),
        };

        // The transaction and the cache invalidation run on their own task: a
        // caller dropping this future must not interrupt a commit between the
        // WAL write and the apply, nor skip the invalidation that follows it.
        let store = self.store.clone();
        let cache = self.cache.clone();
        let booking = tokio::spawn(async move {
            let mut tx = store.begin(event_id).await.map_err(|e| match e {
                StoreError::NotFound(_) => BookingError::EventNotFound(key.to_string()),
                other => other.into(),
            })?;
            if !tx.conditional_decrement_seats(seats) {
                return Err(BookingError::InsufficientSeats {
                    requested: seats,
                    available: tx.available_seats(),
                });
            }
            let booking = tx.insert_booking(booking)?;
            tx.commit().await?;
            cache.invalidate_all();
            Ok::<_, BookingError>(booking)
        })
        .await
        .map_err(|e| BookingError::Store(StoreError::CommitTask(e.to_string())))??;

        Ok(booking)
    }

    /// Cancel one of the principal's bookings, returning its seats to the event.
    pub async fn cancel_booking(&self, principal: &str, booking_id: Ulid) -> Result<(), BookingError> {
        match self.try_cancel(principal, booking_id).await {
            Ok(booking) => {
                metrics::counter!(crate::observability::BOOKINGS_CANCELLED_TOTAL).increment(1);
                info!(
                    booking_id = %booking.id,
                    event_id = %booking.event_id,
                    user_id = %booking.user_id,
                    seats = booking.seats_count,
                    "booking cancelled"
                );
                Ok(())
            }
            Err(e) => {
                rejected("cancel", principal, &e);
                Err(e)
            }
        }
    }

    async fn try_cancel(&self, principal: &str, booking_id: Ulid) -> Result<Booking, BookingError> {
        let user = self.resolve_principal(principal).await?;
        let event_id = self
            .store
            .get_event_for_booking(&booking_id)
            .ok_or(BookingError::BookingNotFound(booking_id))?;

        let store = self.store.clone();
        let cache = self.cache.clone();
        let booking = tokio::spawn(async move {
            let mut tx = store.begin(event_id).await.map_err(|e| match e {
                StoreError::NotFound(_) => BookingError::BookingNotFound(booking_id),
                other => other.into(),
            })?;
            // Re-read under the row lock: a concurrent cancel may have won.
            let booking = tx
                .find_booking(&booking_id)
                .ok_or(BookingError::BookingNotFound(booking_id))?;
            if booking.user_id != user.id {
                return Err(BookingError::Unauthorized(booking_id));
            }
            tx.increment_seats(booking.seats_count)?;
            tx.delete_booking(booking_id)?;
            tx.commit().await?;
            cache.invalidate_all();
            Ok::<_, BookingError>(booking)
        })
        .await
        .map_err(|e| BookingError::Store(StoreError::CommitTask(e.to_string())))??;

        Ok(booking)
    }

    /// The principal's bookings, newest first.
    pub async fn get_user_bookings(&self, principal: &str) -> Result<Vec<BookingView>, BookingError> {
        let user = self.resolve_principal(principal).await?;
        let mut bookings = self.store.find_bookings_by_user(user.id).await;
        bookings.sort_by(|a, b| (b.created_at, b.id).cmp(&(a.created_at, a.id)));

        let mut views = Vec::with_capacity(bookings.len());
        for booking in bookings {
            if let Some(view) = self.view(booking, &user).await {
                views.push(view);
            }
        }
        Ok(views)
    }

    pub async fn get_booking_by_id(
        &self,
        booking_id: Ulid,
        principal: &str,
    ) -> Result<BookingView, BookingError> {
        let user = self.resolve_principal(principal).await?;
        let booking = self
            .store
            .find_booking_by_id(booking_id)
            .await
            .ok_or(BookingError::BookingNotFound(booking_id))?;
        if booking.user_id != user.id {
            return Err(BookingError::Unauthorized(booking_id));
        }
        self.view(booking, &user)
            .await
            .ok_or(BookingError::BookingNotFound(booking_id))
    }

    async fn view(&self, booking: Booking, owner: &User) -> Option<BookingView> {
        let event = self.store.find_event_by_id(booking.event_id).await?;
        let venue_name = self
            .store
            .venue(&event.venue_id)
            .map(|v| v.name)
            .unwrap_or_default();
        Some(BookingView {
            booking,
            event_title: event.title,
            event_starts_at: event.starts_at,
            venue_name,
            user_display_name: owner.display_name.clone(),
            user_email: owner.email.clone(),
        })
    }
}

fn rejected(op: &'static str, principal: &str, e: &BookingError) {
    metrics::counter!(
        crate::observability::BOOKINGS_REJECTED_TOTAL,
        "op" => op,
        "kind" => e.kind()
    )
    .increment(1);
    warn!(op, principal, kind = e.kind(), "booking {op} rejected: {e}");
}
