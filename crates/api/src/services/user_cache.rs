//! In-memory cache of resolved users, keyed by email.
//!
//! Every authenticated request resolves the bearer token's subject to a user
//! row. Entries expire after a fixed TTL and are dropped explicitly whenever
//! the user row changes.

use std::{
    collections::HashMap,
    sync::{Arc, RwLock},
    time::{Duration, Instant},
};

use domain::models::User;

struct CachedUser {
    user: User,
    inserted_at: Instant,
}

pub struct UserCache {
    entries: RwLock<HashMap<String, CachedUser>>,
    ttl: Duration,
}

impl UserCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            ttl,
        }
    }

    /// Returns a cached user if present and not expired.
    pub fn get(&self, email: &str) -> Option<User> {
        {
            let entries = self.entries.read().ok()?;
            match entries.get(email) {
                Some(entry) if entry.inserted_at.elapsed() < self.ttl => {
                    return Some(entry.user.clone())
                }
                Some(_) => {}
                None => return None,
            }
        }

        // expired: drop it so the map does not grow with stale users
        self.invalidate(email);
        None
    }

    pub fn insert(&self, user: User) {
        if let Ok(mut entries) = self.entries.write() {
            entries.insert(
                user.email.clone(),
                CachedUser {
                    user,
                    inserted_at: Instant::now(),
                },
            );
        }
    }

    pub fn invalidate(&self, email: &str) {
        if let Ok(mut entries) = self.entries.write() {
            entries.remove(email);
        }
    }

    /// Removes every expired entry. Returns how many were dropped.
    pub fn purge_expired(&self) -> usize {
        let Ok(mut entries) = self.entries.write() else {
            return 0;
        };
        let before = entries.len();
        entries.retain(|_, entry| entry.inserted_at.elapsed() < self.ttl);
        before - entries.len()
    }

    pub fn len(&self) -> usize {
        self.entries.read().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Periodically drops expired entries of users that stopped sending requests.
pub fn spawn_purge_task(cache: Arc<UserCache>, period: Duration) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            interval.tick().await;
            let purged = cache.purge_expired();
            if purged > 0 {
                tracing::debug!(purged, remaining = cache.len(), "Purged expired cached users");
            }
        }
    })
}

impl std::fmt::Debug for UserCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UserCache")
            .field("ttl", &self.ttl)
            .field("entries", &self.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use uuid::Uuid;

    fn user(email: &str) -> User {
        User {
            id: Uuid::new_v4(),
            username: "cached".into(),
            email: email.into(),
            password_hash: "hash".into(),
            avatar: None,
            confirmed: true,
            refresh_token_hash: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_insert_and_get() {
        let cache = UserCache::new(Duration::from_secs(60));
        let u = user("a@example.com");
        cache.insert(u.clone());

        let cached = cache.get("a@example.com").unwrap();
        assert_eq!(cached.id, u.id);
        assert!(cache.get("b@example.com").is_none());
    }

    #[test]
    fn test_invalidate() {
        let cache = UserCache::new(Duration::from_secs(60));
        cache.insert(user("a@example.com"));
        cache.invalidate("a@example.com");

        assert!(cache.get("a@example.com").is_none());
        assert!(cache.is_empty());
    }

    #[test]
    fn test_expired_entry_is_dropped_on_read() {
        let cache = UserCache::new(Duration::from_millis(10));
        cache.insert(user("a@example.com"));
        std::thread::sleep(Duration::from_millis(30));

        assert!(cache.get("a@example.com").is_none());
        assert_eq!(cache.len(), 0);
    }

    #[test]
    fn test_purge_expired() {
        let cache = UserCache::new(Duration::from_millis(10));
        cache.insert(user("a@example.com"));
        cache.insert(user("b@example.com"));
        std::thread::sleep(Duration::from_millis(30));

        assert_eq!(cache.purge_expired(), 2);
        assert!(cache.is_empty());
    }

    #[test]
    fn test_reinsert_replaces_entry() {
        let cache = UserCache::new(Duration::from_secs(60));
        let mut u = user("a@example.com");
        cache.insert(u.clone());
        u.avatar = Some("https://cdn.example.com/new.png".into());
        cache.insert(u);

        assert_eq!(
            cache.get("a@example.com").unwrap().avatar.as_deref(),
            Some("https://cdn.example.com/new.png")
        );
        assert_eq!(cache.len(), 1);
    }
}
