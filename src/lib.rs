pub mod booking;
pub mod cache;
pub mod catalog;
pub mod compactor;
pub mod config;
pub mod directory;
pub mod limits;
pub mod model;
pub mod observability;
pub mod query;
pub mod ranking;
pub mod store;
pub mod validate;
pub mod wal;

pub use booking::{BookingError, BookingManager};
pub use cache::QueryCache;
pub use catalog::Catalog;
pub use config::Config;
pub use directory::{DirectoryGateway, InMemoryDirectory};
pub use query::{EventFilter, EventQueries, Page, PageRequest, QueryError, SortField};
pub use ranking::TopEventsAggregator;
pub use store::{Store, StoreError, StoreOptions};
