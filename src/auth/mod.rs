//! Request admission for protected routes.
//!
//! Dual-token system: short-lived access tokens sent as bearer credentials
//! and long-lived refresh tokens held in a cookie. Both are bound to the
//! per-user session record (current refresh token and client IP) kept in the
//! shared cache, and access tokens can be revoked before they expire.

mod cookie;
mod errors;
mod extractors;
mod ip;
mod state;
mod types;

pub use cookie::{
    ACCESS_COOKIE_NAME, REFRESH_COOKIE_NAME, clear_cookie, get_cookie, session_cookie,
};
pub use errors::AuthError;
pub(crate) use errors::ErrorBody;
pub use extractors::{
    Auth, ClientIp, RefreshAuth, authenticate_request, bearer_token, refresh_request,
};
pub use ip::{ClientIpResolver, HasHeadersAndExtensions, LOCAL_IP};
pub use state::HasAuthBackend;
pub use types::{AuthContext, RefreshContext};
