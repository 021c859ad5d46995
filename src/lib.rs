pub mod accounts;
pub mod api;
pub mod auth;
pub mod cache;
pub mod cleanup;
pub mod cli;
pub mod db;
pub mod deadline;
pub mod jwt;
pub mod password;
pub mod rate_limit;
pub mod shutdown;

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use accounts::AccountService;
use api::{ApiState, create_api_router};
use auth::ClientIpResolver;
use axum::{Router, middleware};
use cache::{Cache, ProfileCache, RevocationStore, SessionStore};
use db::Database;
use jwt::{JwtConfig, TokenLifetimes};
use rate_limit::{RateLimitConfig, RateLimiter, rate_limit};
use tokio::net::TcpListener;
use tracing::info;

/// Default mount point of the user API.
pub const DEFAULT_API_PREFIX: &str = "/api/user";

/// Default lifetime of cached user profiles.
pub const DEFAULT_PROFILE_CACHE_TTL: Duration = Duration::from_secs(600);

pub struct ServerConfig {
    /// Mount point of the user API (e.g., "/api/user")
    pub api_prefix: String,
    /// Database connection (cloneable, uses connection pool internally)
    pub db: Database,
    /// Shared cache for sessions, revocations, profiles and rate-limit buckets
    pub cache: Cache,
    /// HMAC secret for signing tokens
    pub jwt_secret: Vec<u8>,
    pub lifetimes: TokenLifetimes,
    pub profile_cache_ttl: Duration,
    /// Whether to set Secure flag on cookies (should be true in production with HTTPS)
    pub secure_cookies: bool,
    /// Resolve every client to the loopback address
    pub local_mode: bool,
    /// Route paths in overrides are full paths, prefix included
    pub rate_limits: RateLimitConfig,
    pub request_deadline: Duration,
}

/// Full request path of `route` under `prefix`.
pub fn route_path(prefix: &str, route: &str) -> String {
    format!("{}{}", prefix.trim_end_matches('/'), route)
}

/// Create the application router with the given configuration.
pub fn create_app(config: &ServerConfig) -> Router {
    let jwt = Arc::new(JwtConfig::with_lifetimes(
        &config.jwt_secret,
        config.lifetimes,
    ));
    let ip_resolver = ClientIpResolver::new(config.local_mode);

    let state = ApiState {
        accounts: AccountService::new(
            config.db.clone(),
            ProfileCache::new(config.cache.clone(), config.profile_cache_ttl),
        ),
        jwt,
        sessions: SessionStore::new(config.cache.clone(), config.lifetimes.refresh),
        revocations: RevocationStore::new(config.cache.clone()),
        ip_resolver,
        secure_cookies: config.secure_cookies,
    };

    let limiter = RateLimiter::new(
        config.cache.clone(),
        config.rate_limits.clone(),
        ip_resolver,
    );

    let api_router = create_api_router(state);
    let prefix = config.api_prefix.trim_end_matches('/');
    let router = if prefix.is_empty() {
        Router::new().merge(api_router)
    } else {
        Router::new().nest(prefix, api_router)
    };

    router
        .layer(middleware::from_fn_with_state(limiter, rate_limit))
        .layer(middleware::from_fn_with_state(
            config.request_deadline,
            deadline::request_deadline,
        ))
}

/// Run the server on the given listener until `shutdown` resolves, then
/// close the database pool.
pub async fn run_server<F>(
    config: ServerConfig,
    listener: TcpListener,
    shutdown: F,
) -> Result<(), std::io::Error>
where
    F: Future<Output = ()> + Send + 'static,
{
    let app = create_app(&config);
    let cleanup = cleanup::spawn_cleanup_scheduler(config.cache.clone());

    let make_service = app.into_make_service_with_connect_info::<SocketAddr>();
    let result = axum::serve(listener, make_service)
        .with_graceful_shutdown(shutdown)
        .await;

    if let Some(handle) = cleanup {
        handle.abort();
    }
    config.db.close().await;
    info!("Server stopped");
    result
}
