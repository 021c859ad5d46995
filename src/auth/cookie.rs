//! Cookie parsing and `Set-Cookie` construction for session tokens.

use std::time::Duration;

use axum::http::header;
use chrono::{DateTime, Utc};

/// Cookie name for the access token.
pub const ACCESS_COOKIE_NAME: &str = "access_token";

/// Cookie name for the refresh token.
pub const REFRESH_COOKIE_NAME: &str = "refresh_token";

const EPOCH_HTTP_DATE: &str = "Thu, 01 Jan 1970 00:00:00 GMT";

/// Extract a cookie value from the Cookie header.
pub fn get_cookie<'a>(headers: &'a axum::http::HeaderMap, name: &str) -> Option<&'a str> {
    let cookie_header = headers.get(header::COOKIE)?.to_str().ok()?;
    for part in cookie_header.split(';') {
        let part = part.trim();
        if let Some((key, value)) = part.split_once('=') {
            if key.trim() == name {
                return Some(value.trim());
            }
        }
    }
    None
}

/// Format a time as an RFC 7231 HTTP-date.
fn http_date(at: DateTime<Utc>) -> String {
    at.format("%a, %d %b %Y %H:%M:%S GMT").to_string()
}

fn secure_suffix(secure: bool) -> &'static str {
    if secure { "; Secure" } else { "" }
}

/// `Set-Cookie` value for a token that lives for `lifetime` from `now`.
pub fn session_cookie_at(
    name: &str,
    value: &str,
    lifetime: Duration,
    secure: bool,
    now: DateTime<Utc>,
) -> String {
    let lifetime_secs = lifetime.as_secs();
    let expires = i64::try_from(lifetime_secs)
        .ok()
        .and_then(chrono::Duration::try_seconds)
        .and_then(|delta| now.checked_add_signed(delta))
        .unwrap_or(DateTime::<Utc>::MAX_UTC);
    format!(
        "{}={}; HttpOnly; SameSite=Strict; Path=/; Expires={}; Max-Age={}{}",
        name,
        value,
        http_date(expires),
        lifetime_secs,
        secure_suffix(secure)
    )
}

pub fn session_cookie(name: &str, value: &str, lifetime: Duration, secure: bool) -> String {
    session_cookie_at(name, value, lifetime, secure, Utc::now())
}

/// `Set-Cookie` value that removes `name` from the browser.
pub fn clear_cookie(name: &str, secure: bool) -> String {
    format!(
        "{}=; HttpOnly; SameSite=Strict; Path=/; Expires={}; Max-Age=0{}",
        name,
        EPOCH_HTTP_DATE,
        secure_suffix(secure)
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;
    use chrono::TimeZone;

    #[test]
    fn test_get_cookie_multiple() {
        let mut headers = axum::http::HeaderMap::new();
        headers.insert(
            header::COOKIE,
            HeaderValue::from_static("foo=bar; access_token=abc123; refresh_token=xyz789"),
        );

        assert_eq!(get_cookie(&headers, "access_token"), Some("abc123"));
        assert_eq!(get_cookie(&headers, "refresh_token"), Some("xyz789"));
        assert_eq!(get_cookie(&headers, "foo"), Some("bar"));
    }

    #[test]
    fn test_get_cookie_missing() {
        let mut headers = axum::http::HeaderMap::new();
        assert_eq!(get_cookie(&headers, "access_token"), None);

        headers.insert(header::COOKIE, HeaderValue::from_static("foo=bar"));
        assert_eq!(get_cookie(&headers, "access_token"), None);
    }

    #[test]
    fn test_get_cookie_with_spaces() {
        let mut headers = axum::http::HeaderMap::new();
        headers.insert(
            header::COOKIE,
            HeaderValue::from_static("  access_token = abc123  ; foo=bar"),
        );

        assert_eq!(get_cookie(&headers, "access_token"), Some("abc123"));
    }

    #[test]
    fn test_session_cookie_format() {
        let now = Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap();
        let cookie = session_cookie_at(
            ACCESS_COOKIE_NAME,
            "tok",
            Duration::from_secs(30 * 60),
            false,
            now,
        );
        assert_eq!(
            cookie,
            "access_token=tok; HttpOnly; SameSite=Strict; Path=/; \
             Expires=Fri, 01 Mar 2024 12:30:00 GMT; Max-Age=1800"
        );
    }

    #[test]
    fn test_secure_flag() {
        let cookie = session_cookie(REFRESH_COOKIE_NAME, "tok", Duration::from_secs(60), true);
        assert!(cookie.ends_with("; Secure"));
        assert!(clear_cookie(REFRESH_COOKIE_NAME, true).ends_with("; Secure"));
        assert!(!clear_cookie(REFRESH_COOKIE_NAME, false).contains("Secure"));
    }

    #[test]
    fn test_clear_cookie_expires_at_epoch() {
        let cookie = clear_cookie(ACCESS_COOKIE_NAME, false);
        assert!(cookie.starts_with("access_token=;"));
        assert!(cookie.contains("Expires=Thu, 01 Jan 1970 00:00:00 GMT"));
        assert!(cookie.contains("Max-Age=0"));
    }

    #[test]
    fn test_session_cookie_extreme_lifetime_does_not_panic() {
        let now = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();
        for secs in [i64::MAX as u64, u64::MAX] {
            let cookie = session_cookie_at("t", "v", Duration::from_secs(secs), false, now);
            assert!(cookie.contains(&format!("Max-Age={}", secs)));
            assert!(cookie.contains("Expires="));
        }
    }
}
