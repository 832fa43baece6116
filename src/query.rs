//! Event search and listing.
//!
//! Filters are plain values. Each optional field turns into a [`Predicate`]
//! that collapses to [`Predicate::Always`] when unset, and the predicates of a
//! filter are joined with [`Predicate::and`]. Listings sort by the requested
//! key with insertion order as the secondary key.

use std::cmp::Ordering;
use std::str::FromStr;
use std::sync::Arc;

use thiserror::Error;

use crate::cache::QueryCache;
use crate::limits::MAX_PAGE_SIZE;
use crate::model::*;
use crate::store::Store;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum QueryError {
    #[error("page size {0} is outside 1..=100")]
    InvalidPageSize(usize),
    #[error("event not found: '{0}'")]
    EventNotFound(String),
}

// ── Predicates ───────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Predicate {
    Always,
    /// Lowercased needle.
    TitleContains(String),
    Category(EventCategory),
    GenreName(String),
    /// Starts strictly after the instant.
    StartsAfter(Ms),
    HasAvailableSeats,
    All(Vec<Predicate>),
}

impl Predicate {
    pub fn and(self, other: Predicate) -> Predicate {
        match (self, other) {
            (Predicate::Always, p) | (p, Predicate::Always) => p,
            (Predicate::All(mut a), Predicate::All(b)) => {
                a.extend(b);
                Predicate::All(a)
            }
            (Predicate::All(mut a), p) => {
                a.push(p);
                Predicate::All(a)
            }
            (p, Predicate::All(mut b)) => {
                b.insert(0, p);
                Predicate::All(b)
            }
            (a, b) => Predicate::All(vec![a, b]),
        }
    }

    pub fn matches(&self, row: &EventRow) -> bool {
        match self {
            Predicate::Always => true,
            Predicate::TitleContains(needle) => row.event.title.to_lowercase().contains(needle),
            Predicate::Category(c) => row.event.category == *c,
            Predicate::GenreName(name) => row.genre_name.as_deref() == Some(name.as_str()),
            Predicate::StartsAfter(now) => row.event.starts_at > *now,
            Predicate::HasAvailableSeats => row.event.available_seats > 0,
            Predicate::All(ps) => ps.iter().all(|p| p.matches(row)),
        }
    }
}

/// Case-insensitive title substring; blank matches everything.
pub fn title_contains(title: Option<&str>) -> Predicate {
    match title.map(str::trim) {
        Some(t) if !t.is_empty() => Predicate::TitleContains(t.to_lowercase()),
        _ => Predicate::Always,
    }
}

pub fn has_category(category: Option<EventCategory>) -> Predicate {
    category.map_or(Predicate::Always, Predicate::Category)
}

/// Exact genre name; events without a genre never match a set name.
pub fn has_genre_name(name: Option<&str>) -> Predicate {
    match name.map(str::trim) {
        Some(n) if !n.is_empty() => Predicate::GenreName(n.to_string()),
        _ => Predicate::Always,
    }
}

pub fn is_future(now: Ms) -> Predicate {
    Predicate::StartsAfter(now)
}

pub fn has_available_seats() -> Predicate {
    Predicate::HasAvailableSeats
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct EventFilter {
    pub title: Option<String>,
    pub category: Option<EventCategory>,
    pub genre: Option<String>,
    pub future_only: bool,
    pub available_only: bool,
}

impl EventFilter {
    pub fn predicate(&self, now: Ms) -> Predicate {
        let mut p = title_contains(self.title.as_deref())
            .and(has_category(self.category))
            .and(has_genre_name(self.genre.as_deref()));
        if self.future_only {
            p = p.and(is_future(now));
        }
        if self.available_only {
            p = p.and(has_available_seats());
        }
        p
    }
}

// ── Sorting and pagination ───────────────────────────────────────

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum SortField {
    #[default]
    Title,
    StartsAt,
    AvailableSeats,
    Category,
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("unknown sort field: {0}")]
pub struct UnknownSortField(pub String);

impl FromStr for SortField {
    type Err = UnknownSortField;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "title" => Ok(SortField::Title),
            "dateTime" | "starts_at" => Ok(SortField::StartsAt),
            "availableSeats" | "available_seats" => Ok(SortField::AvailableSeats),
            "category" | "eventType" => Ok(SortField::Category),
            other => Err(UnknownSortField(other.to_string())),
        }
    }
}

impl SortField {
    fn compare(&self, a: &EventRow, b: &EventRow) -> Ordering {
        match self {
            SortField::Title => a
                .event
                .title
                .to_lowercase()
                .cmp(&b.event.title.to_lowercase()),
            SortField::StartsAt => a.event.starts_at.cmp(&b.event.starts_at),
            SortField::AvailableSeats => a.event.available_seats.cmp(&b.event.available_seats),
            SortField::Category => a.event.category.as_str().cmp(b.event.category.as_str()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PageRequest {
    /// Zero-based.
    pub page: usize,
    pub size: usize,
    pub sort: SortField,
    pub ascending: bool,
}

impl Default for PageRequest {
    fn default() -> Self {
        Self {
            page: 0,
            size: 10,
            sort: SortField::Title,
            ascending: true,
        }
    }
}

impl PageRequest {
    pub fn new(page: usize, size: usize) -> Self {
        Self {
            page,
            size,
            ..Self::default()
        }
    }

    pub fn sorted_by(mut self, sort: SortField, ascending: bool) -> Self {
        self.sort = sort;
        self.ascending = ascending;
        self
    }

    fn validate(&self) -> Result<(), QueryError> {
        if self.size == 0 || self.size > MAX_PAGE_SIZE {
            return Err(QueryError::InvalidPageSize(self.size));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Page<T> {
    pub content: Vec<T>,
    pub page: usize,
    pub size: usize,
    pub total_items: usize,
    pub total_pages: usize,
}

/// Sort and slice matching rows. `rows` must be in insertion order; without
/// a request every row is returned as one page in that order.
pub fn paginate(
    mut rows: Vec<EventRow>,
    request: Option<PageRequest>,
) -> Result<Page<EventSummary>, QueryError> {
    let total_items = rows.len();
    let Some(req) = request else {
        return Ok(Page {
            content: rows.iter().map(EventSummary::from).collect(),
            page: 0,
            size: total_items,
            total_items,
            total_pages: 1,
        });
    };
    req.validate()?;

    rows.sort_by(|a, b| {
        let key = req.sort.compare(a, b);
        let key = if req.ascending { key } else { key.reverse() };
        key.then(a.seq.cmp(&b.seq))
    });
    let content = rows
        .iter()
        .skip(req.page.saturating_mul(req.size))
        .take(req.size)
        .map(EventSummary::from)
        .collect();
    Ok(Page {
        content,
        page: req.page,
        size: req.size,
        total_items,
        total_pages: total_items.div_ceil(req.size),
    })
}

// ── Query engine ─────────────────────────────────────────────────

pub struct EventQueries {
    store: Arc<Store>,
    cache: Arc<QueryCache>,
}

impl EventQueries {
    pub fn new(store: Arc<Store>, cache: Arc<QueryCache>) -> Self {
        Self { store, cache }
    }

    pub async fn find(
        &self,
        filter: &EventFilter,
        page: Option<PageRequest>,
    ) -> Result<Page<EventSummary>, QueryError> {
        if let Some(req) = &page {
            req.validate()?;
        }
        // The future-only predicate depends on the clock, so it is never cached.
        let cacheable = !filter.future_only;
        let key = (filter.clone(), page);
        if cacheable && let Some(hit) = self.cache.listings.get(&key) {
            return Ok(hit);
        }

        let generation = self.cache.listings.generation();
        let predicate = filter.predicate(now_ms());
        let rows: Vec<EventRow> = self
            .store
            .event_rows()
            .await
            .into_iter()
            .filter(|row| predicate.matches(row))
            .collect();
        let result = paginate(rows, page)?;
        if cacheable {
            self.cache.listings.insert(key, result.clone(), generation);
        }
        Ok(result)
    }

    pub async fn all(&self, page: Option<PageRequest>) -> Result<Page<EventSummary>, QueryError> {
        self.find(&EventFilter::default(), page).await
    }

    pub async fn search(
        &self,
        title: &str,
        page: Option<PageRequest>,
    ) -> Result<Page<EventSummary>, QueryError> {
        let filter = EventFilter {
            title: Some(title.to_string()),
            ..EventFilter::default()
        };
        self.find(&filter, page).await
    }

    pub async fn by_category(
        &self,
        category: EventCategory,
        page: Option<PageRequest>,
    ) -> Result<Page<EventSummary>, QueryError> {
        let filter = EventFilter {
            category: Some(category),
            ..EventFilter::default()
        };
        self.find(&filter, page).await
    }

    pub async fn by_genre(
        &self,
        genre: &str,
        page: Option<PageRequest>,
    ) -> Result<Page<EventSummary>, QueryError> {
        let filter = EventFilter {
            genre: Some(genre.to_string()),
            ..EventFilter::default()
        };
        self.find(&filter, page).await
    }

    pub async fn with_filters(
        &self,
        title: Option<&str>,
        category: Option<EventCategory>,
        genre: Option<&str>,
        page: Option<PageRequest>,
    ) -> Result<Page<EventSummary>, QueryError> {
        let filter = EventFilter {
            title: title.map(str::to_string),
            category,
            genre: genre.map(str::to_string),
            ..EventFilter::default()
        };
        self.find(&filter, page).await
    }

    pub async fn event_details(&self, title: &str) -> Result<EventDetails, QueryError> {
        if let Some(hit) = self.cache.details.get(&title.to_string()) {
            return Ok(hit);
        }
        let generation = self.cache.details.generation();
        let row = self
            .store
            .event_row_by_title(title)
            .await
            .ok_or_else(|| QueryError::EventNotFound(title.to_string()))?;
        let venue = self.store.venue(&row.event.venue_id);
        let performer_names = row
            .event
            .performer_ids
            .iter()
            .filter_map(|id| self.store.performer(id))
            .map(|p| p.name)
            .collect();
        let details = EventDetails {
            id: row.event.id,
            title: row.event.title,
            description: row.event.description,
            starts_at: row.event.starts_at,
            category: row.event.category,
            genre_name: row.genre_name,
            performer_names,
            venue_name: row.venue_name,
            venue_address: venue.as_ref().map(|v| v.address.clone()).unwrap_or_default(),
            venue_capacity: venue.map_or(0, |v| v.capacity),
            available_seats: row.event.available_seats,
            image_url: row.event.image_url,
        };
        self.cache
            .details
            .insert(title.to_string(), details.clone(), generation);
        Ok(details)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ulid::Ulid;

    fn row(seq: u64, title: &str, category: EventCategory, genre: Option<&str>, seats: u32, starts_at: Ms) -> EventRow {
        EventRow {
            event: Event {
                id: Ulid::new(),
                title: title.into(),
                description: "Something to see".into(),
                starts_at,
                venue_id: Ulid::new(),
                category,
                genre_id: None,
                performer_ids: vec![],
                image_url: None,
                available_seats: seats,
            },
            seq,
            venue_name: "Hall".into(),
            genre_name: genre.map(str::to_string),
        }
    }

    fn sample() -> Vec<EventRow> {
        vec![
            row(0, "Jazz Night", EventCategory::Concert, Some("Jazz"), 10, 5_000),
            row(1, "Hamlet", EventCategory::Theater, None, 0, 1_000),
            row(2, "jazz brunch", EventCategory::Concert, Some("Jazz"), 3, 9_000),
            row(3, "Rock Fest", EventCategory::Festival, Some("Rock"), 50, 2_000),
        ]
    }

    fn titles(page: &Page<EventSummary>) -> Vec<&str> {
        page.content.iter().map(|e| e.title.as_str()).collect()
    }

    #[test]
    fn unset_fields_are_inert() {
        assert_eq!(title_contains(None), Predicate::Always);
        assert_eq!(title_contains(Some("   ")), Predicate::Always);
        assert_eq!(has_category(None), Predicate::Always);
        assert_eq!(has_genre_name(Some("")), Predicate::Always);
        assert_eq!(EventFilter::default().predicate(0), Predicate::Always);
        assert!(sample().iter().all(|r| Predicate::Always.matches(r)));
    }

    #[test]
    fn and_flattens() {
        let p = title_contains(Some("a"))
            .and(Predicate::Always)
            .and(has_available_seats())
            .and(is_future(0));
        assert_eq!(
            p,
            Predicate::All(vec![
                Predicate::TitleContains("a".into()),
                Predicate::HasAvailableSeats,
                Predicate::StartsAfter(0),
            ])
        );
    }

    #[test]
    fn title_is_case_insensitive() {
        let p = title_contains(Some("JAZZ"));
        let matched: Vec<u64> = sample().iter().filter(|r| p.matches(r)).map(|r| r.seq).collect();
        assert_eq!(matched, vec![0, 2]);
    }

    #[test]
    fn genre_requires_a_genre() {
        let p = has_genre_name(Some("Jazz"));
        let rows = sample();
        assert!(p.matches(&rows[0]));
        assert!(!p.matches(&rows[1]));
        assert!(!has_genre_name(Some("jazz")).matches(&rows[0]));
    }

    #[test]
    fn combined_filter() {
        let filter = EventFilter {
            title: Some("jazz".into()),
            category: Some(EventCategory::Concert),
            genre: Some("Jazz".into()),
            future_only: true,
            available_only: true,
        };
        let p = filter.predicate(6_000);
        let matched: Vec<u64> = sample().iter().filter(|r| p.matches(r)).map(|r| r.seq).collect();
        assert_eq!(matched, vec![2]);
    }

    #[test]
    fn future_is_strict() {
        let rows = sample();
        assert!(!is_future(5_000).matches(&rows[0]));
        assert!(is_future(4_999).matches(&rows[0]));
    }

    #[test]
    fn sort_field_parsing() {
        assert_eq!("title".parse::<SortField>().unwrap(), SortField::Title);
        assert_eq!("dateTime".parse::<SortField>().unwrap(), SortField::StartsAt);
        assert_eq!("availableSeats".parse::<SortField>().unwrap(), SortField::AvailableSeats);
        assert_eq!("eventType".parse::<SortField>().unwrap(), SortField::Category);
        assert!("price".parse::<SortField>().is_err());
    }

    #[test]
    fn unpaged_keeps_insertion_order() {
        let page = paginate(sample(), None).unwrap();
        assert_eq!(titles(&page), vec!["Jazz Night", "Hamlet", "jazz brunch", "Rock Fest"]);
        assert_eq!(page.total_items, 4);
        assert_eq!(page.total_pages, 1);
    }

    #[test]
    fn pages_sorted_by_title() {
        let first = paginate(sample(), Some(PageRequest::new(0, 3))).unwrap();
        assert_eq!(titles(&first), vec!["Hamlet", "jazz brunch", "Jazz Night"]);
        assert_eq!(first.total_items, 4);
        assert_eq!(first.total_pages, 2);

        let second = paginate(sample(), Some(PageRequest::new(1, 3))).unwrap();
        assert_eq!(titles(&second), vec!["Rock Fest"]);

        let past_end = paginate(sample(), Some(PageRequest::new(5, 3))).unwrap();
        assert!(past_end.content.is_empty());
        assert_eq!(past_end.total_pages, 2);
    }

    #[test]
    fn ties_break_by_insertion_order_in_both_directions() {
        let rows = vec![
            row(0, "B", EventCategory::Concert, None, 5, 0),
            row(1, "A", EventCategory::Concert, None, 5, 0),
            row(2, "C", EventCategory::Concert, None, 9, 0),
        ];
        let req = PageRequest::new(0, 10).sorted_by(SortField::AvailableSeats, true);
        assert_eq!(titles(&paginate(rows.clone(), Some(req)).unwrap()), vec!["B", "A", "C"]);

        let req = req.sorted_by(SortField::AvailableSeats, false);
        assert_eq!(titles(&paginate(rows, Some(req)).unwrap()), vec!["C", "B", "A"]);
    }

    #[test]
    fn page_size_bounds() {
        assert_eq!(
            paginate(sample(), Some(PageRequest::new(0, 0))),
            Err(QueryError::InvalidPageSize(0))
        );
        assert_eq!(
            paginate(sample(), Some(PageRequest::new(0, MAX_PAGE_SIZE + 1))),
            Err(QueryError::InvalidPageSize(MAX_PAGE_SIZE + 1))
        );
    }
}
