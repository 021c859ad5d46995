//! Per-client, per-route rate limiting.
//!
//! Token buckets live in the shared cache under `ratelimit:<client_ip>:<path>`
//! so every server instance sees the same budget. Refill is computed lazily
//! from the time since the last refill, and each check is one atomic cache
//! transition.

use std::collections::HashMap;
use std::sync::Arc;

use axum::{
    extract::{Request, State},
    middleware::Next,
    response::{IntoResponse, Response},
};
use chrono::Utc;
use tracing::{debug, error};

use crate::api::ApiError;
use crate::auth::{AuthError, ClientIpResolver};
use crate::cache::{BucketConfig, BucketDecision, Cache, CacheError};

pub const RATE_LIMIT_KEY_PREFIX: &str = "ratelimit";

/// Default bucket plus exact-path overrides.
#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    pub default: BucketConfig,
    pub routes: HashMap<String, BucketConfig>,
}

impl RateLimitConfig {
    pub fn new(default: BucketConfig) -> Self {
        Self {
            default,
            routes: HashMap::new(),
        }
    }

    /// Use `config` for requests whose path is exactly `path`.
    pub fn with_route(mut self, path: impl Into<String>, config: BucketConfig) -> Self {
        self.routes.insert(path.into(), config);
        self
    }

    pub fn for_path(&self, path: &str) -> &BucketConfig {
        self.routes.get(path).unwrap_or(&self.default)
    }
}

#[derive(Clone)]
pub struct RateLimiter {
    cache: Cache,
    config: Arc<RateLimitConfig>,
    ip_resolver: ClientIpResolver,
}

impl RateLimiter {
    pub fn new(cache: Cache, config: RateLimitConfig, ip_resolver: ClientIpResolver) -> Self {
        Self {
            cache,
            config: Arc::new(config),
            ip_resolver,
        }
    }

    pub fn config(&self) -> &RateLimitConfig {
        &self.config
    }

    fn key(client_ip: &str, path: &str) -> String {
        format!("{}:{}:{}", RATE_LIMIT_KEY_PREFIX, client_ip, path)
    }

    /// Take one token for `client_ip` on `path`.
    pub async fn check(&self, client_ip: &str, path: &str) -> Result<BucketDecision, CacheError> {
        self.check_at(client_ip, path, now_millis()).await
    }

    pub async fn check_at(
        &self,
        client_ip: &str,
        path: &str,
        now_ms: u64,
    ) -> Result<BucketDecision, CacheError> {
        let config = self.config.for_path(path);
        self.cache
            .take_token(&Self::key(client_ip, path), config, now_ms)
            .await
    }
}

fn now_millis() -> u64 {
    Utc::now().timestamp_millis().max(0) as u64
}

/// Middleware admitting or rejecting a request before routing.
pub async fn rate_limit(
    State(limiter): State<RateLimiter>,
    request: Request,
    next: Next,
) -> Response {
    let Some(client_ip) = limiter.ip_resolver.resolve(&request) else {
        debug!("Rate limiter could not determine client IP");
        return AuthError::Unauthorized.into_response();
    };
    let path = request.uri().path().to_string();

    match limiter.check(&client_ip, &path).await {
        Ok(decision) if decision.admitted => next.run(request).await,
        Ok(_) => {
            debug!(ip = %client_ip, path = %path, "Rate limit exceeded");
            ApiError::RateLimitExceeded.into_response()
        }
        Err(e) => {
            error!(error = %e, ip = %client_ip, path = %path, "Rate limit check failed");
            ApiError::internal("Internal server error").into_response()
        }
    }
}
