//! Cache-aside copies of user profiles.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{Cache, CacheError};

pub const PROFILE_KEY_PREFIX: &str = "userProfile";

/// Denormalized projection of a user record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    pub user_id: String,
    pub email: String,
    pub role: String,
    /// Refresh token recorded at the last login
    pub token: String,
    /// Client IP recorded at the last login
    pub ip: String,
}

#[derive(Clone)]
pub struct ProfileCache {
    cache: Cache,
    ttl: Duration,
}

impl ProfileCache {
    pub fn new(cache: Cache, ttl: Duration) -> Self {
        Self { cache, ttl }
    }

    fn key(user_id: &str) -> String {
        format!("{}:{}", PROFILE_KEY_PREFIX, user_id)
    }

    /// Cached profile, retrying once if the read times out.
    ///
    /// A second timeout is reported as a miss so the caller falls through to
    /// the durable store.
    pub async fn get(&self, user_id: &str) -> Result<Option<UserProfile>, CacheError> {
        let key = Self::key(user_id);
        let value = match self.cache.get(&key).await {
            Err(CacheError::Timeout) => match self.cache.get(&key).await {
                Err(CacheError::Timeout) => {
                    debug!(user_id, "Profile cache read timed out twice, treating as miss");
                    None
                }
                other => other?,
            },
            other => other?,
        };

        match value {
            Some(json) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }

    pub async fn put(&self, profile: &UserProfile) -> Result<(), CacheError> {
        let value = serde_json::to_string(profile)?;
        self.cache
            .set(&Self::key(&profile.user_id), &value, Some(self.ttl))
            .await
    }

    /// Drop the cached copy after a durable write.
    pub async fn invalidate(&self, user_id: &str) -> Result<(), CacheError> {
        if self.cache.del(&Self::key(user_id)).await? {
            debug!(user_id, "Profile cache invalidated");
        }
        Ok(())
    }
}
