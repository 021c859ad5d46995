#![allow(dead_code)]

use std::time::Duration;

use axum::{
    Router,
    body::Body,
    http::{Request, Response, StatusCode, header},
};
use serde_json::{Value, json};
use tower::ServiceExt;
use turnstile::{
    ServerConfig,
    cache::{BucketConfig, Cache},
    create_app,
    db::Database,
    jwt::{JwtConfig, TokenLifetimes},
    rate_limit::RateLimitConfig,
};

pub const JWT_SECRET: &[u8] = b"integration-test-secret-0123456789abcdef";
pub const PREFIX: &str = "/api/user";
pub const TEST_IP: &str = "203.0.113.10";
pub const ALT_IP: &str = "198.51.100.20";
pub const EMAIL: &str = "alice@example.com";
pub const PASSWORD: &str = "correct horse battery staple";

pub struct TestApp {
    pub app: Router,
    pub db: Database,
    pub cache: Cache,
    pub jwt: JwtConfig,
}

/// Limits high enough that ordinary tests never hit them.
pub fn generous_limits() -> RateLimitConfig {
    RateLimitConfig::new(BucketConfig::new(10_000, 10_000, None))
}

pub async fn create_test_app() -> TestApp {
    create_test_app_with(|_| {}).await
}

/// Build an app over fresh in-memory stores, letting `customize` adjust the
/// config before the router is built.
pub async fn create_test_app_with(customize: impl FnOnce(&mut ServerConfig)) -> TestApp {
    let db = Database::open(":memory:")
        .await
        .expect("Failed to open test database");
    let cache = Cache::memory();

    let mut config = ServerConfig {
        api_prefix: PREFIX.to_string(),
        db: db.clone(),
        cache: cache.clone(),
        jwt_secret: JWT_SECRET.to_vec(),
        lifetimes: TokenLifetimes::default(),
        profile_cache_ttl: Duration::from_secs(600),
        secure_cookies: false,
        local_mode: false,
        rate_limits: generous_limits(),
        // Password hashing is slow in unoptimized builds.
        request_deadline: Duration::from_secs(60),
    };
    customize(&mut config);

    let jwt = JwtConfig::with_lifetimes(&config.jwt_secret, config.lifetimes);
    TestApp {
        app: create_app(&config),
        db,
        cache,
        jwt,
    }
}

pub fn path(route: &str) -> String {
    format!("{}{}", PREFIX, route)
}

pub fn json_request(method: &str, route: &str, body: Value, ip: &str) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(path(route))
        .header(header::CONTENT_TYPE, "application/json")
        .header("x-forwarded-for", ip)
        .body(Body::from(body.to_string()))
        .unwrap()
}

pub fn bearer_request(method: &str, route: &str, token: &str, ip: &str) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(path(route))
        .header(header::AUTHORIZATION, format!("Bearer {}", token))
        .header("x-forwarded-for", ip)
        .body(Body::empty())
        .unwrap()
}

pub fn cookie_request(method: &str, route: &str, cookies: &str, ip: &str) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(path(route))
        .header(header::COOKIE, cookies)
        .header("x-forwarded-for", ip)
        .body(Body::empty())
        .unwrap()
}

impl TestApp {
    pub async fn send(&self, request: Request<Body>) -> Response<Body> {
        self.app.clone().oneshot(request).await.unwrap()
    }

    pub async fn register(&self, email: &str, password: &str) -> Response<Body> {
        self.send(json_request(
            "POST",
            "/register",
            json!({ "email": email, "password": password }),
            TEST_IP,
        ))
        .await
    }

    pub async fn login_response(&self, email: &str, password: &str, ip: &str) -> Response<Body> {
        self.send(json_request(
            "POST",
            "/login",
            json!({ "email": email, "password": password }),
            ip,
        ))
        .await
    }

    /// Log in and return the issued tokens.
    pub async fn login(&self, email: &str, password: &str, ip: &str) -> Session {
        let response = self.login_response(email, password, ip).await;
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        Session {
            user_id: body["user_id"].as_str().unwrap().to_string(),
            access_token: body["access_token"].as_str().unwrap().to_string(),
            refresh_token: body["refresh_token"].as_str().unwrap().to_string(),
        }
    }

    /// Register the default user and log in from `ip`.
    pub async fn signed_in_user(&self, ip: &str) -> Session {
        assert_eq!(self.register(EMAIL, PASSWORD).await.status(), StatusCode::CREATED);
        self.login(EMAIL, PASSWORD, ip).await
    }

    pub async fn profile(&self, token: &str, ip: &str) -> Response<Body> {
        self.send(bearer_request("GET", "/profile", token, ip)).await
    }
}

pub struct Session {
    pub user_id: String,
    pub access_token: String,
    pub refresh_token: String,
}

pub async fn body_json(response: Response<Body>) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

/// Extract all Set-Cookie headers from a response
pub fn extract_set_cookies(response: &Response<Body>) -> Vec<String> {
    response
        .headers()
        .get_all(header::SET_COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .map(|s| s.to_string())
        .collect()
}

/// Check if cookies contain a token being cleared (Max-Age=0)
pub fn has_cleared_cookie(cookies: &[String], cookie_name: &str) -> bool {
    cookies
        .iter()
        .any(|c| c.starts_with(&format!("{}=;", cookie_name)) && c.contains("Max-Age=0"))
}

/// Value of the Set-Cookie entry for `cookie_name`, if it is not a clear.
pub fn cookie_value(cookies: &[String], cookie_name: &str) -> Option<String> {
    let prefix = format!("{}=", cookie_name);
    cookies.iter().find_map(|c| {
        let rest = c.strip_prefix(&prefix)?;
        let value = rest.split(';').next()?;
        (!value.is_empty()).then(|| value.to_string())
    })
}
