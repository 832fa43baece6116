//! Principal → user resolution. Authentication lives outside this crate; the
//! booking manager only needs to turn an authenticated identifier into a user.

use async_trait::async_trait;
use dashmap::DashMap;
use ulid::Ulid;

use crate::model::User;

#[async_trait]
pub trait DirectoryGateway: Send + Sync {
    /// Look a principal up by username or by user id.
    async fn resolve_user(&self, identifier: &str) -> Option<User>;
}

/// Directory backed by an in-process map, keyed by username.
#[derive(Debug, Default)]
pub struct InMemoryDirectory {
    by_username: DashMap<String, User>,
    by_id: DashMap<Ulid, String>,
}

impl InMemoryDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, username: &str, display_name: &str, email: &str) -> User {
        let user = User {
            id: Ulid::new(),
            username: username.to_string(),
            display_name: display_name.to_string(),
            email: email.to_string(),
        };
        self.by_id.insert(user.id, user.username.clone());
        self.by_username.insert(user.username.clone(), user.clone());
        user
    }

    pub fn len(&self) -> usize {
        self.by_username.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_username.is_empty()
    }
}

#[async_trait]
impl DirectoryGateway for InMemoryDirectory {
    async fn resolve_user(&self, identifier: &str) -> Option<User> {
        if let Some(user) = self.by_username.get(identifier) {
            return Some(user.value().clone());
        }
        let id: Ulid = identifier.parse().ok()?;
        let username = self.by_id.get(&id)?.value().clone();
        self.by_username.get(&username).map(|u| u.value().clone())
    }
}
