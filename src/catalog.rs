//! Event administration. Writes go to the store; every committed write
//! invalidates the read caches.

use std::sync::Arc;

use crate::cache::QueryCache;
use crate::model::*;
use crate::store::{Store, StoreError};

pub struct Catalog {
    store: Arc<Store>,
    cache: Arc<QueryCache>,
}

impl Catalog {
    pub fn new(store: Arc<Store>, cache: Arc<QueryCache>) -> Self {
        Self { store, cache }
    }

    fn invalidated<T>(&self, result: Result<T, StoreError>) -> Result<T, StoreError> {
        if result.is_ok() {
            self.cache.invalidate_all();
        }
        result
    }

    pub async fn add_venue(&self, name: &str, address: &str, capacity: u32) -> Result<Venue, StoreError> {
        let result = self.store.add_venue(name, address, capacity).await;
        self.invalidated(result)
    }

    pub async fn add_genre(&self, name: &str) -> Result<Genre, StoreError> {
        let result = self.store.add_genre(name).await;
        self.invalidated(result)
    }

    pub async fn add_performer(&self, name: &str) -> Result<Performer, StoreError> {
        let result = self.store.add_performer(name).await;
        self.invalidated(result)
    }

    pub async fn create_event(&self, new: NewEvent) -> Result<Event, StoreError> {
        let result = self.store.create_event(new).await;
        self.invalidated(result)
    }

    pub async fn delete_event(&self, title: &str) -> Result<(), StoreError> {
        let result = self.store.delete_event(title.trim()).await;
        self.invalidated(result)
    }
}
