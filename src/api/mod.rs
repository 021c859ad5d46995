mod error;
mod tokens;
mod users;

use axum::Router;
use std::sync::Arc;

use crate::accounts::AccountService;
use crate::auth::ClientIpResolver;
use crate::cache::{RevocationStore, SessionStore};
use crate::impl_has_auth_backend;
use crate::jwt::JwtConfig;

pub use error::{ApiError, ResultExt};

/// State shared by every user API handler.
#[derive(Clone)]
pub struct ApiState {
    pub accounts: AccountService,
    pub jwt: Arc<JwtConfig>,
    pub sessions: SessionStore,
    pub revocations: RevocationStore,
    pub ip_resolver: ClientIpResolver,
    /// Add the Secure flag to every session cookie
    pub secure_cookies: bool,
}

impl_has_auth_backend!(ApiState);

/// Create the user API router. Paths are relative to the mount prefix.
pub fn create_api_router(state: ApiState) -> Router {
    Router::new()
        .merge(users::router())
        .merge(tokens::router())
        .with_state(state)
}
