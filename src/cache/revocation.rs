//! Access token blacklist.
//!
//! One entry per user holding the exact token string that was revoked. The
//! entry lives only as long as that token could still be presented, and a
//! second revocation for the same user never replaces the first.

use std::time::Duration;

use tracing::{debug, info};

use super::{Cache, CacheError};

pub const REVOCATION_KEY_PREFIX: &str = "blacklistAccessToken";

#[derive(Clone)]
pub struct RevocationStore {
    cache: Cache,
}

impl RevocationStore {
    pub fn new(cache: Cache) -> Self {
        Self { cache }
    }

    fn key(user_id: &str) -> String {
        format!("{}:{}", REVOCATION_KEY_PREFIX, user_id)
    }

    /// Blacklist `access_token` for `ttl` unless an entry already exists.
    pub async fn blacklist(
        &self,
        user_id: &str,
        access_token: &str,
        ttl: Duration,
    ) -> Result<(), CacheError> {
        let ttl = ttl.max(Duration::from_secs(1));
        if self
            .cache
            .set_nx(&Self::key(user_id), access_token, ttl)
            .await?
        {
            info!(user_id, ttl_secs = ttl.as_secs(), "Access token blacklisted");
        } else {
            debug!(user_id, "Access token blacklist entry already present");
        }
        Ok(())
    }

    /// True only if the stored entry is exactly `access_token`.
    pub async fn is_blacklisted(
        &self,
        user_id: &str,
        access_token: &str,
    ) -> Result<bool, CacheError> {
        Ok(self
            .cache
            .get(&Self::key(user_id))
            .await?
            .is_some_and(|stored| stored == access_token))
    }
}
