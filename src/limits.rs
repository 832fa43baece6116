/// Seats a single booking may reserve.
pub const MIN_SEATS_PER_BOOKING: i64 = 1;
pub const MAX_SEATS_PER_BOOKING: i64 = 10;

/// Stored in place of a blank booking comment.
pub const NO_COMMENT: &str = "No comment";
pub const MAX_COMMENT_LEN: usize = 500;

pub const MIN_TITLE_LEN: usize = 2;
pub const MAX_TITLE_LEN: usize = 50;
pub const MIN_DESCRIPTION_LEN: usize = 10;
pub const MAX_DESCRIPTION_LEN: usize = 500;
pub const MAX_IMAGE_URL_LEN: usize = 1000;
pub const MAX_NAME_LEN: usize = 255;
pub const MAX_PERFORMERS_PER_EVENT: usize = 64;

pub const MAX_EVENTS: usize = 100_000;
pub const MAX_BOOKINGS_PER_EVENT: usize = 100_000;

pub const MAX_PAGE_SIZE: usize = 100;
pub const MAX_TOP_EVENTS: usize = 100;
