//! CLI argument parsing, validation, and startup helpers.

use std::time::Duration;

use crate::cache::{BucketConfig, Cache};
use crate::db::Database;
use crate::jwt::TokenLifetimes;
use crate::rate_limit::RateLimitConfig;
use crate::{DEFAULT_API_PREFIX, ServerConfig, route_path};
use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

const MIN_JWT_SECRET_LENGTH: usize = 32;

#[derive(clap::ValueEnum, Clone, Debug, Default)]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
    Compact,
}

#[derive(Parser, Debug, Clone)]
#[command(
    name = "turnstile",
    about = "User sessions and rate-limited admission for a protected API"
)]
pub struct Args {
    /// Port to listen on
    #[arg(short, long, env = "PORT", default_value = "8080")]
    pub port: u16,

    /// Path to SQLite database file
    #[arg(short, long, env = "DATABASE_PATH", default_value = "turnstile.db")]
    pub database: String,

    /// Redis URL, or "memory" for an in-process cache
    #[arg(long, env = "REDIS_URL", default_value = "redis://127.0.0.1:6379")]
    pub cache_url: String,

    /// Path to file containing JWT secret. Prefer using JWT_SECRET env var instead
    #[arg(long)]
    pub jwt_secret_file: Option<String>,

    /// Deployment environment; "local" and "dev" resolve every client to 127.0.0.1
    #[arg(long = "env", env = "ENV", default_value = "production")]
    pub environment: String,

    /// Access token lifetime in minutes, at most one year
    #[arg(long, default_value = "30", value_parser = clap::value_parser!(u64).range(1..=525_600))]
    pub access_token_minutes: u64,

    /// Refresh token lifetime in days, at most ten years
    #[arg(long, default_value = "3", value_parser = clap::value_parser!(u64).range(1..=3650))]
    pub refresh_token_days: u64,

    /// Lifetime of cached user profiles in seconds
    #[arg(long, default_value = "600")]
    pub profile_cache_secs: u64,

    /// Bound on each cache or database call in milliseconds
    #[arg(long, default_value = "2000", value_parser = clap::value_parser!(u64).range(1..))]
    pub store_timeout_ms: u64,

    /// Bound on a whole request in milliseconds
    #[arg(long, default_value = "5000", value_parser = clap::value_parser!(u64).range(1..))]
    pub request_deadline_ms: u64,

    /// Set the Secure flag on session cookies
    #[arg(long)]
    pub secure_cookies: bool,

    /// Mount point of the user API
    #[arg(long, default_value = DEFAULT_API_PREFIX, value_parser = validate_api_prefix)]
    pub api_prefix: String,

    /// Tokens per minute for routes without an override
    #[arg(long, default_value = "60")]
    pub rate_limit: u32,

    /// Bucket capacity for routes without an override
    #[arg(long, default_value = "60")]
    pub rate_burst: u32,

    #[arg(long, default_value = "1")]
    pub login_rate_limit: u32,

    #[arg(long, default_value = "5")]
    pub login_rate_burst: u32,

    #[arg(long, default_value = "30")]
    pub profile_rate_limit: u32,

    #[arg(long, default_value = "30")]
    pub profile_rate_burst: u32,

    /// Idle expiry of rate-limit buckets in seconds, 0 keeps them forever
    #[arg(long, default_value = "3600")]
    pub rate_limit_ttl_secs: u64,

    /// Log output format
    #[arg(short, long, default_value = "pretty")]
    pub log_format: LogFormat,
}

impl Args {
    pub fn local_mode(&self) -> bool {
        matches!(self.environment.as_str(), "local" | "dev")
    }

    pub fn store_timeout(&self) -> Duration {
        Duration::from_millis(self.store_timeout_ms)
    }

    pub fn lifetimes(&self) -> TokenLifetimes {
        TokenLifetimes {
            access: Duration::from_secs(self.access_token_minutes * 60),
            refresh: Duration::from_secs(self.refresh_token_days * 24 * 60 * 60),
        }
    }

    /// Default bucket plus the login and profile overrides.
    pub fn rate_limits(&self) -> RateLimitConfig {
        let ttl = match self.rate_limit_ttl_secs {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        };
        RateLimitConfig::new(BucketConfig::new(self.rate_limit, self.rate_burst, ttl))
            .with_route(
                route_path(&self.api_prefix, "/login"),
                BucketConfig::new(self.login_rate_limit, self.login_rate_burst, ttl),
            )
            .with_route(
                route_path(&self.api_prefix, "/profile"),
                BucketConfig::new(self.profile_rate_limit, self.profile_rate_burst, ttl),
            )
    }
}

fn validate_api_prefix(s: &str) -> Result<String, String> {
    if s.is_empty() {
        return Ok(String::new());
    }

    if !s.starts_with('/') {
        return Err(format!("API prefix must start with '/': {}", s));
    }

    if s.len() > 1 && s.ends_with('/') {
        return Err(format!("API prefix must not end with '/': {}", s));
    }

    if s.chars().any(|c| !c.is_ascii() || c.is_whitespace()) {
        return Err(format!("API prefix contains invalid characters: {}", s));
    }

    Ok(s.to_string())
}

/// Initialize logging based on the specified format.
/// `RUST_LOG` overrides the default `info` level.
pub fn init_logging(format: &LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    match format {
        LogFormat::Pretty => builder.init(),
        LogFormat::Json => builder.json().init(),
        LogFormat::Compact => builder.compact().init(),
    }
}

/// Load JWT secret from environment variable or file.
/// Returns None and logs an error if the secret cannot be loaded.
pub fn load_jwt_secret(jwt_secret_file: Option<&str>) -> Option<String> {
    let secret = if let Ok(secret) = std::env::var("JWT_SECRET") {
        // Clear the environment variable to prevent leaking
        // SAFETY: Called during startup before any task is spawned,
        // and no other code is reading this environment variable.
        unsafe { std::env::remove_var("JWT_SECRET") };
        secret
    } else if let Some(path) = jwt_secret_file {
        match std::fs::read_to_string(path) {
            Ok(content) => content.trim().to_string(),
            Err(e) => {
                error!(path = %path, error = %e, "Failed to read JWT secret file");
                return None;
            }
        }
    } else {
        error!(
            "JWT secret is required. Set JWT_SECRET environment variable (recommended) or use --jwt-secret-file"
        );
        return None;
    };

    if secret.len() < MIN_JWT_SECRET_LENGTH {
        error!(
            "JWT secret is shorter than {} characters. Use a longer secret",
            MIN_JWT_SECRET_LENGTH
        );
        return None;
    }

    Some(secret)
}

/// Build ServerConfig from validated arguments.
pub fn build_config(args: &Args, db: Database, cache: Cache, jwt_secret: String) -> ServerConfig {
    ServerConfig {
        api_prefix: args.api_prefix.clone(),
        db,
        cache,
        jwt_secret: jwt_secret.into_bytes(),
        lifetimes: args.lifetimes(),
        profile_cache_ttl: Duration::from_secs(args.profile_cache_secs),
        secure_cookies: args.secure_cookies,
        local_mode: args.local_mode(),
        rate_limits: args.rate_limits(),
        request_deadline: Duration::from_millis(args.request_deadline_ms),
    }
}

/// Open the database, logging errors if it fails.
pub async fn open_database(path: &str, timeout: Duration) -> Option<Database> {
    match Database::open_with_timeout(path, timeout).await {
        Ok(db) => {
            info!(path = %path, "Database opened");
            Some(db)
        }
        Err(e) => {
            error!(path = %path, error = %e, "Failed to open database");
            None
        }
    }
}

/// Connect to the cache, logging errors if it fails.
pub async fn open_cache(url: &str, timeout: Duration) -> Option<Cache> {
    match Cache::open(url, timeout).await {
        Ok(cache) => {
            if cache.is_memory() {
                info!("Using in-process cache");
            }
            Some(cache)
        }
        Err(e) => {
            // The URL may carry a password, so it is not logged.
            error!(error = %e, "Failed to connect to cache");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Args {
        Args::try_parse_from(std::iter::once("turnstile").chain(args.iter().copied())).unwrap()
    }

    #[test]
    fn test_defaults() {
        let args = parse(&["--cache-url", "memory", "--env", "production"]);
        assert_eq!(args.api_prefix, "/api/user");
        assert!(!args.local_mode());
        assert_eq!(args.lifetimes(), TokenLifetimes::default());
        assert_eq!(args.store_timeout(), Duration::from_secs(2));
        assert_eq!(args.request_deadline_ms, 5000);
    }

    #[test]
    fn test_local_mode() {
        assert!(parse(&["--env", "local"]).local_mode());
        assert!(parse(&["--env", "dev"]).local_mode());
        assert!(!parse(&["--env", "staging"]).local_mode());
    }

    #[test]
    fn test_rate_limit_routes_use_prefix() {
        let args = parse(&["--api-prefix", "/v1", "--rate-limit-ttl-secs", "0"]);
        let limits = args.rate_limits();

        let login = limits.for_path("/v1/login");
        assert_eq!((login.rate.get(), login.burst.get()), (1, 5));
        let profile = limits.for_path("/v1/profile");
        assert_eq!((profile.rate.get(), profile.burst.get()), (30, 30));
        let other = limits.for_path("/v1/register");
        assert_eq!((other.rate.get(), other.burst.get()), (60, 60));
        assert_eq!(other.ttl, None);
    }

    #[test]
    fn test_rate_limit_ttl() {
        let limits = parse(&[]).rate_limits();
        assert_eq!(limits.default.ttl, Some(Duration::from_secs(3600)));
    }

    #[test]
    fn test_validate_api_prefix() {
        assert_eq!(validate_api_prefix("/api/user").unwrap(), "/api/user");
        assert_eq!(validate_api_prefix("").unwrap(), "");
        assert!(validate_api_prefix("api").is_err());
        assert!(validate_api_prefix("/api/").is_err());
        assert!(validate_api_prefix("/a b").is_err());
    }

    #[test]
    fn test_zero_lifetime_rejected() {
        let result = Args::try_parse_from(["turnstile", "--access-token-minutes", "0"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_lifetime_upper_bounds() {
        for (flag, max, over) in [
            ("--access-token-minutes", "525600", "525601"),
            ("--refresh-token-days", "3650", "3651"),
        ] {
            assert!(Args::try_parse_from(["turnstile", flag, max]).is_ok(), "{}", flag);
            assert!(Args::try_parse_from(["turnstile", flag, over]).is_err(), "{}", flag);
        }
        assert!(Args::try_parse_from(["turnstile", "--refresh-token-days", "18446744073709551615"]).is_err());

        let lifetimes = parse(&["--access-token-minutes", "525600", "--refresh-token-days", "3650"])
            .lifetimes();
        assert_eq!(lifetimes.access, Duration::from_secs(525_600 * 60));
        assert_eq!(lifetimes.refresh, Duration::from_secs(3650 * 24 * 60 * 60));
    }
}
