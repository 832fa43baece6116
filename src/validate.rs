//! Input checks run at the start of each operation, before any lock is taken.

use crate::booking::BookingError;
use crate::limits::*;
use crate::model::{Ms, NewEvent};
use crate::store::StoreError;

pub fn seats_count(requested: i64) -> Result<u32, BookingError> {
    if !(MIN_SEATS_PER_BOOKING..=MAX_SEATS_PER_BOOKING).contains(&requested) {
        return Err(BookingError::SeatsCountOutOfRange(requested));
    }
    Ok(requested as u32)
}

/// Trim a booking comment; blank becomes the placeholder.
pub fn comment(raw: Option<&str>) -> Result<String, BookingError> {
    let trimmed = raw.map(str::trim).unwrap_or_default();
    if trimmed.is_empty() {
        return Ok(NO_COMMENT.to_string());
    }
    if trimmed.chars().count() > MAX_COMMENT_LEN {
        return Err(BookingError::Invalid("comment too long"));
    }
    Ok(trimmed.to_string())
}

/// Registry names (venues, genres, performers).
pub fn name(raw: &str) -> Result<String, StoreError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(StoreError::Invalid("name must not be blank"));
    }
    if trimmed.chars().count() > MAX_NAME_LEN {
        return Err(StoreError::LimitExceeded("name too long"));
    }
    Ok(trimmed.to_string())
}

/// Field checks for a new event. Returns the event with its title and
/// description trimmed. References (venue, genre, performers) are checked by
/// the store.
pub fn new_event(mut new: NewEvent, now: Ms) -> Result<NewEvent, StoreError> {
    new.title = new.title.trim().to_string();
    new.description = new.description.trim().to_string();

    let title_len = new.title.chars().count();
    if title_len == 0 {
        return Err(StoreError::Invalid("title must not be blank"));
    }
    if !(MIN_TITLE_LEN..=MAX_TITLE_LEN).contains(&title_len) {
        return Err(StoreError::Invalid("title must be 2 to 50 characters"));
    }
    let description_len = new.description.chars().count();
    if !(MIN_DESCRIPTION_LEN..=MAX_DESCRIPTION_LEN).contains(&description_len) {
        return Err(StoreError::Invalid("description must be 10 to 500 characters"));
    }
    if new.starts_at <= now {
        return Err(StoreError::Invalid("event must start in the future"));
    }
    if new.available_seats == 0 {
        return Err(StoreError::Invalid("event must offer at least one seat"));
    }
    if let Some(url) = &new.image_url
        && url.len() > MAX_IMAGE_URL_LEN
    {
        return Err(StoreError::LimitExceeded("image url too long"));
    }
    if new.performer_ids.len() > MAX_PERFORMERS_PER_EVENT {
        return Err(StoreError::LimitExceeded("too many performers"));
    }
    Ok(new)
}
