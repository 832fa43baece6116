use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use ulid::Ulid;

/// Unix milliseconds, the only time type.
pub type Ms = i64;

pub fn now_ms() -> Ms {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as Ms)
        .unwrap_or(0)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EventCategory {
    Concert,
    Festival,
    Theater,
    Cinema,
    Masterclass,
    Sport,
}

impl EventCategory {
    pub const ALL: [EventCategory; 6] = [
        EventCategory::Concert,
        EventCategory::Festival,
        EventCategory::Theater,
        EventCategory::Cinema,
        EventCategory::Masterclass,
        EventCategory::Sport,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EventCategory::Concert => "CONCERT",
            EventCategory::Festival => "FESTIVAL",
            EventCategory::Theater => "THEATER",
            EventCategory::Cinema => "CINEMA",
            EventCategory::Masterclass => "MASTERCLASS",
            EventCategory::Sport => "SPORT",
        }
    }
}

impl fmt::Display for EventCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownCategory(pub String);

impl fmt::Display for UnknownCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown event category: {}", self.0)
    }
}

impl std::error::Error for UnknownCategory {}

impl FromStr for EventCategory {
    type Err = UnknownCategory;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let upper = s.trim().to_ascii_uppercase();
        EventCategory::ALL
            .into_iter()
            .find(|c| c.as_str() == upper)
            .ok_or_else(|| UnknownCategory(s.to_string()))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Venue {
    pub id: Ulid,
    pub name: String,
    pub address: String,
    pub capacity: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Genre {
    pub id: Ulid,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Performer {
    pub id: Ulid,
    pub name: String,
}

/// A scheduled occurrence at a venue. `available_seats` is only ever
/// changed by a committed store transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    pub id: Ulid,
    pub title: String,
    pub description: String,
    pub starts_at: Ms,
    pub venue_id: Ulid,
    pub category: EventCategory,
    pub genre_id: Option<Ulid>,
    pub performer_ids: Vec<Ulid>,
    pub image_url: Option<String>,
    pub available_seats: u32,
}

/// Input for creating an event. The initial `available_seats` becomes the
/// event's fixed capacity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewEvent {
    pub title: String,
    pub description: String,
    pub starts_at: Ms,
    pub venue_id: Ulid,
    pub category: EventCategory,
    pub genre_id: Option<Ulid>,
    pub performer_ids: Vec<Ulid>,
    pub image_url: Option<String>,
    pub available_seats: u32,
}

/// A user's reservation of seats for one event. Owner and event never change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Booking {
    pub id: Ulid,
    pub user_id: Ulid,
    pub event_id: Ulid,
    pub seats_count: u32,
    pub comment: String,
    pub created_at: Ms,
}

/// Consumed from the directory by reference only.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct User {
    pub id: Ulid,
    pub username: String,
    pub display_name: String,
    pub email: String,
}

/// How callers name an event: by id or by its unique title.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventKey {
    Id(Ulid),
    Title(String),
}

impl fmt::Display for EventKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EventKey::Id(id) => write!(f, "{id}"),
            EventKey::Title(title) => write!(f, "'{title}'"),
        }
    }
}

impl From<Ulid> for EventKey {
    fn from(id: Ulid) -> Self {
        EventKey::Id(id)
    }
}

impl From<&str> for EventKey {
    fn from(title: &str) -> Self {
        EventKey::Title(title.to_string())
    }
}

impl From<String> for EventKey {
    fn from(title: String) -> Self {
        EventKey::Title(title)
    }
}

/// Per-event state held by the store. Bookings live with their event so that
/// the event's row lock covers both the seat counter and the booking set.
#[derive(Debug, Clone)]
pub struct EventState {
    pub event: Event,
    /// Bookable seats established at creation.
    pub capacity: u32,
    /// Insertion order, the implicit secondary sort key.
    pub seq: u64,
    /// Active bookings in insertion order.
    pub bookings: Vec<Booking>,
}

impl EventState {
    pub fn new(event: Event, capacity: u32, seq: u64) -> Self {
        Self {
            event,
            capacity,
            seq,
            bookings: Vec::new(),
        }
    }

    pub fn booked_seats(&self) -> u64 {
        self.bookings.iter().map(|b| b.seats_count as u64).sum()
    }

    pub fn booking(&self, id: &Ulid) -> Option<&Booking> {
        self.bookings.iter().find(|b| b.id == *id)
    }

    pub fn remove_booking(&mut self, id: &Ulid) -> Option<Booking> {
        let pos = self.bookings.iter().position(|b| b.id == *id)?;
        Some(self.bookings.remove(pos))
    }
}

/// The change types, flat with no nesting. A committed transaction is written to
/// the WAL as one frame holding its ordered list of changes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Change {
    VenueAdded {
        venue: Venue,
    },
    GenreAdded {
        genre: Genre,
    },
    PerformerAdded {
        performer: Performer,
    },
    EventCreated {
        event: Event,
        capacity: u32,
        seq: u64,
    },
    EventDeleted {
        id: Ulid,
        title: String,
    },
    SeatsDecremented {
        event_id: Ulid,
        seats: u32,
    },
    SeatsIncremented {
        event_id: Ulid,
        seats: u32,
    },
    BookingInserted {
        booking: Booking,
    },
    BookingDeleted {
        id: Ulid,
        event_id: Ulid,
    },
}

impl Change {
    /// The event a row-level change applies to. Registry and event
    /// create/delete changes are handled at the map level.
    pub fn event_id(&self) -> Option<Ulid> {
        match self {
            Change::SeatsDecremented { event_id, .. }
            | Change::SeatsIncremented { event_id, .. }
            | Change::BookingDeleted { event_id, .. } => Some(*event_id),
            Change::BookingInserted { booking } => Some(booking.event_id),
            Change::VenueAdded { .. }
            | Change::GenreAdded { .. }
            | Change::PerformerAdded { .. }
            | Change::EventCreated { .. }
            | Change::EventDeleted { .. } => None,
        }
    }
}

// ── Query result types ───────────────────────────────────────────

/// Snapshot of one event with its joined names, the unit the query engine
/// filters and sorts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventRow {
    pub event: Event,
    pub seq: u64,
    pub venue_name: String,
    pub genre_name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventSummary {
    pub id: Ulid,
    pub title: String,
    pub starts_at: Ms,
    pub category: EventCategory,
    pub genre_name: Option<String>,
    pub venue_name: String,
    pub available_seats: u32,
    pub image_url: Option<String>,
}

impl From<&EventRow> for EventSummary {
    fn from(row: &EventRow) -> Self {
        Self {
            id: row.event.id,
            title: row.event.title.clone(),
            starts_at: row.event.starts_at,
            category: row.event.category,
            genre_name: row.genre_name.clone(),
            venue_name: row.venue_name.clone(),
            available_seats: row.event.available_seats,
            image_url: row.event.image_url.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventDetails {
    pub id: Ulid,
    pub title: String,
    pub description: String,
    pub starts_at: Ms,
    pub category: EventCategory,
    pub genre_name: Option<String>,
    pub performer_names: Vec<String>,
    pub venue_name: String,
    pub venue_address: String,
    pub venue_capacity: u32,
    pub available_seats: u32,
    pub image_url: Option<String>,
}

/// A booking joined with the names a caller displays next to it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BookingView {
    pub booking: Booking,
    pub event_title: String,
    pub event_starts_at: Ms,
    pub venue_name: String,
    pub user_display_name: String,
    pub user_email: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopEvent {
    pub event_id: Ulid,
    pub title: String,
    pub image_url: Option<String>,
    pub total_booked_seats: u64,
    /// 1-based position in the ranking.
    pub rank: usize,
}

/// Capacity accounting for one event: `available + booked == capacity`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SeatLedger {
    pub capacity: u32,
    pub available: u32,
    pub booked: u64,
}

impl SeatLedger {
    pub fn balanced(&self) -> bool {
        self.available as u64 + self.booked == self.capacity as u64
    }
}
