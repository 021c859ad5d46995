//! Shared cache access.
//!
//! `Cache` is a cloneable handle over either a Redis connection manager or an
//! in-process map. Stores for sessions, revocations, profiles and rate-limit
//! buckets are thin typed wrappers around the primitives defined here.

mod bucket;
mod memory;
mod profile;
mod revocation;
mod session;

use std::future::Future;
use std::sync::Arc;
#[cfg(test)]
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use redis::aio::ConnectionManager;
use tracing::{info, warn};

pub use bucket::{BucketConfig, BucketDecision, BucketState};
pub use memory::MemoryBackend;
pub use profile::{PROFILE_KEY_PREFIX, ProfileCache, UserProfile};
pub use revocation::{REVOCATION_KEY_PREFIX, RevocationStore};
pub use session::{SESSION_KEY_PREFIX, SessionRecord, SessionStore};

/// Default bound on a single cache round trip.
pub const DEFAULT_OP_TIMEOUT: Duration = Duration::from_secs(2);

#[derive(Clone)]
enum Backend {
    Redis(ConnectionManager),
    Memory(Arc<MemoryBackend>),
}

#[derive(Clone)]
pub struct Cache {
    backend: Backend,
    op_timeout: Duration,
    #[cfg(test)]
    stall: Option<Arc<Stall>>,
}

impl Cache {
    /// Connect to the cache at `url`.
    /// Use "memory" for an in-process cache.
    pub async fn open(url: &str, op_timeout: Duration) -> Result<Self, CacheError> {
        if url == "memory" || url == ":memory:" {
            return Ok(Self::memory().with_timeout(op_timeout));
        }

        let client = redis::Client::open(url)?;
        let manager = tokio::time::timeout(op_timeout, client.get_connection_manager())
            .await
            .map_err(|_| CacheError::Timeout)??;

        info!("Connected to redis cache");
        Ok(Self {
            backend: Backend::Redis(manager),
            op_timeout,
            #[cfg(test)]
            stall: None,
        })
    }

    /// In-process cache with the default operation timeout.
    pub fn memory() -> Self {
        Self {
            backend: Backend::Memory(Arc::new(MemoryBackend::new())),
            op_timeout: DEFAULT_OP_TIMEOUT,
            #[cfg(test)]
            stall: None,
        }
    }

    pub fn with_timeout(mut self, op_timeout: Duration) -> Self {
        self.op_timeout = op_timeout;
        self
    }

    pub fn is_memory(&self) -> bool {
        matches!(self.backend, Backend::Memory(_))
    }

    /// Bound `fut`, an operation on `key`, by the operation timeout.
    async fn bounded<T, F>(&self, op: &'static str, key: &str, fut: F) -> Result<T, CacheError>
    where
        F: Future<Output = Result<T, CacheError>>,
    {
        #[cfg(test)]
        let fut = {
            let stall = self
                .stall
                .as_ref()
                .filter(|stall| key.starts_with(&stall.prefix))
                .cloned();
            async move {
                if let Some(stall) = stall {
                    stall.calls.fetch_add(1, Ordering::SeqCst);
                    std::future::pending::<()>().await;
                }
                fut.await
            }
        };

        match tokio::time::timeout(self.op_timeout, fut).await {
            Ok(result) => result,
            Err(_) => {
                warn!(
                    op,
                    key,
                    timeout_ms = self.op_timeout.as_millis() as u64,
                    "Cache operation timed out"
                );
                Err(CacheError::Timeout)
            }
        }
    }

    pub(crate) async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        self.bounded("get", key, async {
            match &self.backend {
                Backend::Redis(manager) => {
                    let mut conn = manager.clone();
                    let value: Option<String> =
                        redis::cmd("GET").arg(key).query_async(&mut conn).await?;
                    Ok(value)
                }
                Backend::Memory(memory) => Ok(memory.get(key)),
            }
        })
        .await
    }

    /// Store `value`, expiring after `ttl` (`None` keeps it forever).
    pub(crate) async fn set(
        &self,
        key: &str,
        value: &str,
        ttl: Option<Duration>,
    ) -> Result<(), CacheError> {
        self.bounded("set", key, async {
            match &self.backend {
                Backend::Redis(manager) => {
                    let mut conn = manager.clone();
                    let mut cmd = redis::cmd("SET");
                    cmd.arg(key).arg(value);
                    if let Some(ttl) = ttl {
                        cmd.arg("PX").arg(ttl_millis(ttl));
                    }
                    let _: () = cmd.query_async(&mut conn).await?;
                    Ok(())
                }
                Backend::Memory(memory) => {
                    memory.set(key, value, ttl);
                    Ok(())
                }
            }
        })
        .await
    }

    /// Store `value` only if `key` is absent. Returns whether it was written.
    pub(crate) async fn set_nx(
        &self,
        key: &str,
        value: &str,
        ttl: Duration,
    ) -> Result<bool, CacheError> {
        self.bounded("set_nx", key, async {
            match &self.backend {
                Backend::Redis(manager) => {
                    let mut conn = manager.clone();
                    let reply: Option<String> = redis::cmd("SET")
                        .arg(key)
                        .arg(value)
                        .arg("NX")
                        .arg("PX")
                        .arg(ttl_millis(ttl))
                        .query_async(&mut conn)
                        .await?;
                    Ok(reply.is_some())
                }
                Backend::Memory(memory) => Ok(memory.set_nx(key, value, ttl)),
            }
        })
        .await
    }

    /// Remove `key`. Returns whether it existed.
    pub(crate) async fn del(&self, key: &str) -> Result<bool, CacheError> {
        self.bounded("del", key, async {
            match &self.backend {
                Backend::Redis(manager) => {
                    let mut conn = manager.clone();
                    let removed: i64 = redis::cmd("DEL").arg(key).query_async(&mut conn).await?;
                    Ok(removed > 0)
                }
                Backend::Memory(memory) => Ok(memory.del(key)),
            }
        })
        .await
    }

    /// Refill and consume one token from the bucket at `key` as a single
    /// atomic step.
    pub(crate) async fn take_token(
        &self,
        key: &str,
        config: &BucketConfig,
        now_ms: u64,
    ) -> Result<BucketDecision, CacheError> {
        self.bounded("take_token", key, async {
            match &self.backend {
                Backend::Redis(manager) => {
                    let mut conn = manager.clone();
                    bucket::take_token_redis(&mut conn, key, config, now_ms).await
                }
                Backend::Memory(memory) => memory.take_token(key, config, now_ms),
            }
        })
        .await
    }

    /// Drop expired entries held in process. Redis expires keys itself.
    pub fn purge_expired(&self) -> usize {
        match &self.backend {
            Backend::Redis(_) => 0,
            Backend::Memory(memory) => memory.purge_expired(),
        }
    }
}

/// Makes every operation on keys under `prefix` hang until it times out.
#[cfg(test)]
pub(crate) struct Stall {
    prefix: String,
    calls: AtomicUsize,
}

#[cfg(test)]
impl Stall {
    /// Operations that hit the stall so far.
    pub(crate) fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
impl Cache {
    pub(crate) fn stalling(mut self, prefix: &str) -> (Self, Arc<Stall>) {
        let stall = Arc::new(Stall {
            prefix: prefix.to_string(),
            calls: AtomicUsize::new(0),
        });
        self.stall = Some(stall.clone());
        (self, stall)
    }
}

fn ttl_millis(ttl: Duration) -> u64 {
    (ttl.as_millis() as u64).max(1)
}

/// Errors raised by cache operations.
#[derive(Debug)]
pub enum CacheError {
    Redis(redis::RedisError),
    Serialization(serde_json::Error),
    Timeout,
}

impl std::fmt::Display for CacheError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CacheError::Redis(e) => write!(f, "Redis error: {}", e),
            CacheError::Serialization(e) => write!(f, "Cache value serialization error: {}", e),
            CacheError::Timeout => write!(f, "Cache operation timed out"),
        }
    }
}

impl std::error::Error for CacheError {}

impl From<redis::RedisError> for CacheError {
    fn from(e: redis::RedisError) -> Self {
        CacheError::Redis(e)
    }
}

impl From<serde_json::Error> for CacheError {
    fn from(e: serde_json::Error) -> Self {
        CacheError::Serialization(e)
    }
}
