use std::path::PathBuf;
use std::sync::Arc;

use boxoffice::model::*;
use boxoffice::*;

const DAY: Ms = 86_400_000;

fn test_wal_path(name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join("boxoffice_test_queries");
    std::fs::create_dir_all(&dir).unwrap();
    let path = dir.join(name);
    let _ = std::fs::remove_file(&path);
    path
}

struct Setup {
    catalog: Catalog,
    queries: EventQueries,
    bookings: BookingManager,
    cache: Arc<QueryCache>,
}

async fn setup(name: &str) -> Setup {
    let store = Arc::new(Store::open(test_wal_path(name), StoreOptions::default()).unwrap());
    let cache = Arc::new(QueryCache::default());
    let directory = Arc::new(InMemoryDirectory::new());
    directory.register("alice", "Alice", "alice@example.com");
    let s = Setup {
        catalog: Catalog::new(store.clone(), cache.clone()),
        queries: EventQueries::new(store.clone(), cache.clone()),
        bookings: BookingManager::new(store, directory, cache.clone()),
        cache,
    };

    let hall = s.catalog.add_venue("Concert Hall", "1 Music Sq", 2000).await.unwrap();
    let jazz = s.catalog.add_genre("Jazz").await.unwrap();
    let rock = s.catalog.add_genre("Rock").await.unwrap();
    let trio = s.catalog.add_performer("Blue Trio").await.unwrap();
    let now = now_ms();
    let events = [
        ("Jazz at Midnight", EventCategory::Concert, Some(jazz.id), vec![trio.id], 3 * DAY, 100),
        ("Rock the Docks", EventCategory::Festival, Some(rock.id), vec![], DAY, 1000),
        ("Macbeth", EventCategory::Theater, None, vec![], 2 * DAY, 1),
        ("Smooth Jazz Brunch", EventCategory::Concert, Some(jazz.id), vec![], 4 * DAY, 40),
    ];
    for (title, category, genre_id, performer_ids, offset, seats) in events {
        s.catalog
            .create_event(NewEvent {
                title: title.into(),
                description: format!("{title}, one night only"),
                starts_at: now + offset,
                venue_id: hall.id,
                category,
                genre_id,
                performer_ids,
                image_url: None,
                available_seats: seats,
            })
            .await
            .unwrap();
    }
    s
}

fn titles(page: &Page<EventSummary>) -> Vec<&str> {
    page.content.iter().map(|e| e.title.as_str()).collect()
}

#[tokio::test]
async fn search_category_genre_and_combined() {
    let s = setup("filters.wal").await;

    let page = s.queries.search("jazz", None).await.unwrap();
    assert_eq!(titles(&page), vec!["Jazz at Midnight", "Smooth Jazz Brunch"]);

    let page = s.queries.by_category(EventCategory::Theater, None).await.unwrap();
    assert_eq!(titles(&page), vec!["Macbeth"]);

    let page = s.queries.by_genre("Rock", None).await.unwrap();
    assert_eq!(titles(&page), vec!["Rock the Docks"]);

    let page = s
        .queries
        .with_filters(Some("smooth"), Some(EventCategory::Concert), Some("Jazz"), None)
        .await
        .unwrap();
    assert_eq!(titles(&page), vec!["Smooth Jazz Brunch"]);

    let page = s.queries.with_filters(None, None, None, None).await.unwrap();
    assert_eq!(page.total_items, 4);
}

#[tokio::test]
async fn available_only_tracks_bookings() {
    let s = setup("available.wal").await;
    s.bookings.create_booking("alice", "Macbeth", 1, None).await.unwrap();

    let filter = EventFilter {
        available_only: true,
        future_only: true,
        ..EventFilter::default()
    };
    let page = s.queries.find(&filter, None).await.unwrap();
    assert_eq!(page.total_items, 3);
    assert!(!titles(&page).contains(&"Macbeth"));
}

#[tokio::test]
async fn paged_and_sorted_listing() {
    let s = setup("paging.wal").await;

    let req = PageRequest::new(0, 2).sorted_by(SortField::StartsAt, true);
    let first = s.queries.all(Some(req)).await.unwrap();
    assert_eq!(titles(&first), vec!["Rock the Docks", "Macbeth"]);
    assert_eq!(first.total_items, 4);
    assert_eq!(first.total_pages, 2);

    let req = PageRequest::new(0, 10).sorted_by("availableSeats".parse().unwrap(), false);
    let by_seats = s.queries.all(Some(req)).await.unwrap();
    assert_eq!(by_seats.content[0].title, "Rock the Docks");
    assert_eq!(by_seats.content[3].title, "Macbeth");

    assert_eq!(
        s.queries.all(Some(PageRequest::new(0, 101))).await,
        Err(QueryError::InvalidPageSize(101))
    );
}

#[tokio::test]
async fn details_join_registries() {
    let s = setup("details.wal").await;
    let details = s.queries.event_details("Jazz at Midnight").await.unwrap();
    assert_eq!(details.venue_name, "Concert Hall");
    assert_eq!(details.venue_address, "1 Music Sq");
    assert_eq!(details.venue_capacity, 2000);
    assert_eq!(details.genre_name.as_deref(), Some("Jazz"));
    assert_eq!(details.performer_names, vec!["Blue Trio".to_string()]);
    assert_eq!(details.available_seats, 100);

    assert_eq!(
        s.queries.event_details("Nope").await,
        Err(QueryError::EventNotFound("Nope".into()))
    );
}

#[tokio::test]
async fn cached_listing_refreshes_after_booking() {
    let s = setup("cache.wal").await;

    let before = s.queries.event_details("Macbeth").await.unwrap();
    assert_eq!(before.available_seats, 1);
    let hits = s.cache.details.hits();
    s.queries.event_details("Macbeth").await.unwrap();
    assert_eq!(s.cache.details.hits(), hits + 1);

    s.bookings.create_booking("alice", "Macbeth", 1, None).await.unwrap();
    let after = s.queries.event_details("Macbeth").await.unwrap();
    assert_eq!(after.available_seats, 0);

    let listing = s.queries.by_category(EventCategory::Theater, None).await.unwrap();
    assert_eq!(listing.content[0].available_seats, 0);
}
