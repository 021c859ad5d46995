//! Client IP resolution.

use std::net::SocketAddr;

use axum::{extract::ConnectInfo, http::HeaderMap, http::request::Parts};

/// Address every request resolves to in local mode.
pub const LOCAL_IP: &str = "127.0.0.1";

const FORWARDED_FOR: &str = "x-forwarded-for";
const REAL_IP: &str = "x-real-ip";

/// Trait for types that provide access to HTTP headers and extensions.
/// Implemented for both `Parts` and `Request` so gates and middleware share
/// one resolver.
pub trait HasHeadersAndExtensions {
    fn headers(&self) -> &HeaderMap;
    fn extensions(&self) -> &axum::http::Extensions;
}

impl HasHeadersAndExtensions for Parts {
    fn headers(&self) -> &HeaderMap {
        &self.headers
    }
    fn extensions(&self) -> &axum::http::Extensions {
        &self.extensions
    }
}

impl<B> HasHeadersAndExtensions for axum::extract::Request<B> {
    fn headers(&self) -> &HeaderMap {
        axum::extract::Request::headers(self)
    }
    fn extensions(&self) -> &axum::http::Extensions {
        axum::extract::Request::extensions(self)
    }
}

/// Resolves the client identity used for rate limiting and IP binding.
///
/// Order: first non-empty `X-Forwarded-For` entry, then `X-Real-IP`, then the
/// transport peer address.
#[derive(Debug, Clone, Copy, Default)]
pub struct ClientIpResolver {
    local_mode: bool,
}

impl ClientIpResolver {
    pub fn new(local_mode: bool) -> Self {
        Self { local_mode }
    }

    pub fn local_mode(&self) -> bool {
        self.local_mode
    }

    pub fn resolve<T: HasHeadersAndExtensions>(&self, source: &T) -> Option<String> {
        if self.local_mode {
            return Some(LOCAL_IP.to_string());
        }

        let headers = source.headers();
        if let Some(ip) = header_str(headers, FORWARDED_FOR)
            .and_then(|list| list.split(',').map(str::trim).find(|entry| !entry.is_empty()))
        {
            return Some(ip.to_string());
        }

        if let Some(ip) = header_str(headers, REAL_IP)
            .map(str::trim)
            .filter(|ip| !ip.is_empty())
        {
            return Some(ip.to_string());
        }

        source
            .extensions()
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ci| ci.0.ip().to_string())
    }
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name)?.to_str().ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;

    fn request(headers: &[(&str, &str)], peer: Option<&str>) -> Request<Body> {
        let mut builder = Request::builder().uri("/");
        for (name, value) in headers {
            builder = builder.header(*name, *value);
        }
        let mut request = builder.body(Body::empty()).unwrap();
        if let Some(peer) = peer {
            let addr: SocketAddr = peer.parse().unwrap();
            request.extensions_mut().insert(ConnectInfo(addr));
        }
        request
    }

    #[test]
    fn test_forwarded_for_first_entry() {
        let resolver = ClientIpResolver::new(false);
        let req = request(
            &[
                ("x-forwarded-for", " 203.0.113.7 , 10.0.0.1"),
                ("x-real-ip", "198.51.100.2"),
            ],
            Some("192.0.2.1:4000"),
        );
        assert_eq!(resolver.resolve(&req).as_deref(), Some("203.0.113.7"));
    }

    #[test]
    fn test_forwarded_for_skips_empty_entries() {
        let resolver = ClientIpResolver::new(false);
        let req = request(&[("x-forwarded-for", " , 203.0.113.7")], None);
        assert_eq!(resolver.resolve(&req).as_deref(), Some("203.0.113.7"));
    }

    #[test]
    fn test_real_ip_fallback() {
        let resolver = ClientIpResolver::new(false);
        let req = request(&[("x-real-ip", " 198.51.100.2 ")], Some("192.0.2.1:4000"));
        assert_eq!(resolver.resolve(&req).as_deref(), Some("198.51.100.2"));
    }

    #[test]
    fn test_peer_address_fallback() {
        let resolver = ClientIpResolver::new(false);
        let req = request(&[], Some("192.0.2.1:4000"));
        assert_eq!(resolver.resolve(&req).as_deref(), Some("192.0.2.1"));
    }

    #[test]
    fn test_nothing_available() {
        let resolver = ClientIpResolver::new(false);
        assert_eq!(resolver.resolve(&request(&[], None)), None);
    }

    #[test]
    fn test_local_mode_short_circuits() {
        let resolver = ClientIpResolver::new(true);
        let req = request(&[("x-forwarded-for", "203.0.113.7")], Some("192.0.2.1:4000"));
        assert_eq!(resolver.resolve(&req).as_deref(), Some(LOCAL_IP));
        assert_eq!(resolver.resolve(&request(&[], None)).as_deref(), Some(LOCAL_IP));
    }
}
