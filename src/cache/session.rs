//! Current refresh token and client IP per user.
//!
//! One record per user; a new login overwrites the previous one, so only the
//! most recent device holds a live session.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{Cache, CacheError};

pub const SESSION_KEY_PREFIX: &str = "refreshTokenWithIp";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionRecord {
    pub refresh_token: String,
    pub ip_address: String,
}

#[derive(Clone)]
pub struct SessionStore {
    cache: Cache,
    ttl: Duration,
}

impl SessionStore {
    /// `ttl` should equal the refresh token lifetime.
    pub fn new(cache: Cache, ttl: Duration) -> Self {
        Self { cache, ttl }
    }

    fn key(user_id: &str) -> String {
        format!("{}:{}", SESSION_KEY_PREFIX, user_id)
    }

    /// Create or replace the session for `user_id`.
    pub async fn put(
        &self,
        user_id: &str,
        refresh_token: &str,
        client_ip: &str,
    ) -> Result<(), CacheError> {
        let record = SessionRecord {
            refresh_token: refresh_token.to_string(),
            ip_address: client_ip.to_string(),
        };
        let value = serde_json::to_string(&record)?;
        self.cache
            .set(&Self::key(user_id), &value, Some(self.ttl))
            .await?;
        debug!(user_id, ip = client_ip, "Session stored");
        Ok(())
    }

    /// Look up the session. `None` means expired or never logged in.
    pub async fn get(&self, user_id: &str) -> Result<Option<SessionRecord>, CacheError> {
        match self.cache.get(&Self::key(user_id)).await? {
            Some(value) => Ok(Some(serde_json::from_str(&value)?)),
            None => Ok(None),
        }
    }

    /// Remove the session if present.
    pub async fn delete(&self, user_id: &str) -> Result<(), CacheError> {
        if self.cache.del(&Self::key(user_id)).await? {
            debug!(user_id, "Session deleted");
        }
        Ok(())
    }
}
