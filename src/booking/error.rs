use thiserror::Error;
use ulid::Ulid;

use crate::store::StoreError;

#[derive(Debug, Error)]
pub enum BookingError {
    #[error("event not found: {0}")]
    EventNotFound(String),
    #[error("user not found: {0}")]
    UserNotFound(String),
    #[error("booking not found: {0}")]
    BookingNotFound(Ulid),
    #[error("seats count {0} is outside 1..=10")]
    SeatsCountOutOfRange(i64),
    #[error("not enough seats: requested {requested}, available {available}")]
    InsufficientSeats { requested: u32, available: u32 },
    #[error("booking {0} belongs to another user")]
    Unauthorized(Ulid),
    #[error("concurrent update on event {0}, try again")]
    ConcurrentUpdateConflict(Ulid),
    #[error("invalid input: {0}")]
    Invalid(&'static str),
    #[error(transparent)]
    Store(StoreError),
}

impl From<StoreError> for BookingError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::LockTimeout(event_id) => BookingError::ConcurrentUpdateConflict(event_id),
            other => BookingError::Store(other),
        }
    }
}

impl BookingError {
    /// Short label for metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            BookingError::EventNotFound(_) => "event_not_found",
            BookingError::UserNotFound(_) => "user_not_found",
            BookingError::BookingNotFound(_) => "booking_not_found",
            BookingError::SeatsCountOutOfRange(_) => "seats_count_out_of_range",
            BookingError::InsufficientSeats { .. } => "insufficient_seats",
            BookingError::Unauthorized(_) => "unauthorized",
            BookingError::ConcurrentUpdateConflict(_) => "concurrent_update_conflict",
            BookingError::Invalid(_) => "invalid",
            BookingError::Store(_) => "store",
        }
    }
}
