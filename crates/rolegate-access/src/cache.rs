//! Session-scoped cache of the signed-in users.
//!
//! Entries are populated when a session starts, dropped when it ends, and
//! invalidated by the service whenever a user's record or effective
//! permissions change. A miss is never an error: the service reloads from
//! the store.

use std::collections::BTreeSet;
use std::time::Duration;

use moka::future::Cache;
use rolegate_core::models::user::User;
use serde::Serialize;
use uuid::Uuid;

use crate::config::AccessConfig;

/// A user as seen by their own session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionUser {
    pub user: User,
    /// Effective permission ids at the time the entry was loaded.
    pub permissions: BTreeSet<Uuid>,
}

#[derive(Clone)]
pub struct SessionUserCache {
    users: Cache<Uuid, SessionUser>,
}

impl SessionUserCache {
    pub fn new(config: &AccessConfig) -> Self {
        let users = Cache::builder()
            .max_capacity(config.user_cache_capacity)
            .time_to_live(Duration::from_secs(config.user_cache_ttl_secs))
            .build();
        Self { users }
    }

    pub async fn get(&self, user_id: Uuid) -> Option<SessionUser> {
        self.users.get(&user_id).await
    }

    pub async fn insert(&self, entry: SessionUser) {
        self.users.insert(entry.user.id, entry).await;
    }

    pub async fn invalidate(&self, user_id: Uuid) {
        self.users.invalidate(&user_id).await;
    }

    pub async fn invalidate_many(&self, user_ids: impl IntoIterator<Item = Uuid>) {
        for user_id in user_ids {
            self.users.invalidate(&user_id).await;
        }
    }

    pub fn contains(&self, user_id: Uuid) -> bool {
        self.users.contains_key(&user_id)
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use rolegate_core::models::user::Role;

    use super::*;

    fn entry() -> SessionUser {
        SessionUser {
            user: User {
                id: Uuid::new_v4(),
                email: "cached@example.com".into(),
                first_name: "Cached".into(),
                last_name: "User".into(),
                role: Role::User,
                avatar_url: None,
                created_at: Utc::now(),
                updated_at: Utc::now(),
            },
            permissions: BTreeSet::from([Uuid::new_v4()]),
        }
    }

    #[tokio::test]
    async fn insert_get_and_invalidate() {
        let cache = SessionUserCache::new(&AccessConfig::default());
        let entry = entry();
        let id = entry.user.id;

        assert!(cache.get(id).await.is_none());
        cache.insert(entry.clone()).await;
        assert_eq!(cache.get(id).await, Some(entry));

        cache.invalidate(id).await;
        assert!(cache.get(id).await.is_none());
    }

    #[tokio::test]
    async fn invalidate_many_skips_unknown_ids() {
        let cache = SessionUserCache::new(&AccessConfig::default());
        let kept = entry();
        let dropped = entry();
        cache.insert(kept.clone()).await;
        cache.insert(dropped.clone()).await;

        cache
            .invalidate_many([dropped.user.id, Uuid::new_v4()])
            .await;

        assert!(cache.contains(kept.user.id));
        assert!(!cache.contains(dropped.user.id));
    }
}
