//! Username directory.
//!
//! The Bot API cannot resolve `@username` to a user, so the bot remembers
//! the usernames of everyone it sees and resolves mentions from that cache.

use crate::config::{DIRECTORY_MAX_SIZE, DIRECTORY_TTL_SECS};
use ayumi_core::event::Actor;
use moka::future::Cache;
use std::time::Duration;
use teloxide::types::User;
use tracing::debug;

/// Recently seen users keyed by lowercase username.
pub struct UserDirectory {
    by_username: Cache<String, Actor>,
}

impl UserDirectory {
    /// Creates a new directory.
    ///
    /// # Arguments
    ///
    /// * `ttl_secs` - How long an entry is remembered after its last sighting
    /// * `max_size` - Maximum number of usernames in the cache
    #[must_use]
    pub fn new(ttl_secs: u64, max_size: u64) -> Self {
        let by_username = Cache::builder()
            .time_to_live(Duration::from_secs(ttl_secs))
            .max_capacity(max_size)
            .build();
        Self { by_username }
    }

    /// Remember `actor` under `username`.
    pub async fn remember(&self, username: &str, actor: Actor) {
        let key = normalize(username);
        if key.is_empty() {
            return;
        }
        debug!(username = %key, user_id = %actor.id, "Directory entry refreshed");
        self.by_username.insert(key, actor).await;
    }

    /// Remember a Telegram user if they have a username.
    pub async fn remember_user(&self, user: &User) {
        if let Some(username) = &user.username {
            self.remember(username, actor_of(user)).await;
        }
    }

    /// Resolve `@username` (the `@` is optional).
    pub async fn lookup(&self, username: &str) -> Option<Actor> {
        self.by_username.get(&normalize(username)).await
    }
}

impl Default for UserDirectory {
    fn default() -> Self {
        Self::new(DIRECTORY_TTL_SECS, DIRECTORY_MAX_SIZE)
    }
}

fn normalize(username: &str) -> String {
    username.trim().trim_start_matches('@').to_lowercase()
}

/// Core view of a Telegram user.
#[must_use]
pub fn actor_of(user: &User) -> Actor {
    Actor::new(user.id.0.cast_signed(), user.full_name())
}
