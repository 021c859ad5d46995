//! Request context attached by the gates.

use crate::jwt::Claims;

/// A request admitted by the access token gate.
#[derive(Debug, Clone)]
pub struct AuthContext {
    pub claims: Claims,
    /// The exact bearer token presented, needed to blacklist it at logout
    pub access_token: String,
    pub client_ip: String,
}

/// A request admitted by the refresh gate.
#[derive(Debug, Clone)]
pub struct RefreshContext {
    pub claims: Claims,
    pub client_ip: String,
}
