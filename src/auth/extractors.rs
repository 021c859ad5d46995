//! Axum extractors for the access token gate and the refresh gate.

use axum::{
    extract::FromRequestParts,
    http::{HeaderMap, header, request::Parts},
};
use tracing::{debug, error};

use super::cookie::{ACCESS_COOKIE_NAME, REFRESH_COOKIE_NAME, get_cookie};
use super::errors::AuthError;
use super::state::HasAuthBackend;
use super::types::{AuthContext, RefreshContext};
use crate::jwt::now_secs;

/// Token from an `Authorization: Bearer <token>` header.
/// Any other scheme or shape yields `None`.
pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    let value = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    let mut parts = value.split(' ');
    let (Some(scheme), Some(token), None) = (parts.next(), parts.next(), parts.next()) else {
        return None;
    };
    if !scheme.eq_ignore_ascii_case("bearer") || token.is_empty() {
        return None;
    }
    Some(token)
}

fn current_time() -> Result<u64, AuthError> {
    now_secs().map_err(|e| {
        error!(error = %e, "Failed to read system time");
        AuthError::Internal
    })
}

/// Admission for protected routes.
///
/// Steps run strictly in order: extract, verify, blacklist, expiry, session
/// lookup, IP binding. The first failing step decides the denial.
pub async fn authenticate_request<S>(parts: &Parts, state: &S) -> Result<AuthContext, AuthError>
where
    S: HasAuthBackend + Send + Sync,
{
    let token = bearer_token(&parts.headers).ok_or(AuthError::MissingToken)?;

    let claims = state.jwt().verify(token).map_err(|e| {
        debug!(error = %e, "Access token rejected");
        AuthError::InvalidToken
    })?;

    if state
        .revocations()
        .is_blacklisted(&claims.user_id, token)
        .await?
    {
        debug!(user_id = %claims.user_id, "Blacklisted access token presented");
        return Err(AuthError::Blacklisted);
    }

    if claims.is_expired_at(current_time()?) {
        debug!(user_id = %claims.user_id, "Expired access token presented");
        return Err(AuthError::Expired);
    }

    let Some(session) = state.sessions().get(&claims.user_id).await? else {
        debug!(user_id = %claims.user_id, "No live session for access token");
        return Err(AuthError::Unauthorized);
    };

    let client_ip = state.ip_resolver().resolve(parts).ok_or_else(|| {
        debug!(user_id = %claims.user_id, "Client IP could not be determined");
        AuthError::Unauthorized
    })?;
    if session.ip_address != client_ip {
        debug!(user_id = %claims.user_id, "Access token used from a different IP");
        return Err(AuthError::Unauthorized);
    }

    Ok(AuthContext {
        claims,
        access_token: token.to_string(),
        client_ip,
    })
}

/// Admission for silent access token renewal.
///
/// The refresh token must verify, be unexpired and be exactly the one on file
/// for the user, presented from the IP on file. An access token cookie sent
/// alongside is rejected if it has been blacklisted.
pub async fn refresh_request<S>(parts: &Parts, state: &S) -> Result<RefreshContext, AuthError>
where
    S: HasAuthBackend + Send + Sync,
{
    let token = get_cookie(&parts.headers, REFRESH_COOKIE_NAME)
        .filter(|t| !t.is_empty())
        .ok_or(AuthError::MissingToken)?;

    let claims = state.jwt().verify(token).map_err(|e| {
        debug!(error = %e, "Refresh token rejected");
        AuthError::InvalidToken
    })?;

    if claims.is_expired_at(current_time()?) {
        debug!(user_id = %claims.user_id, "Expired refresh token presented");
        return Err(AuthError::Expired);
    }

    if let Some(access) = get_cookie(&parts.headers, ACCESS_COOKIE_NAME).filter(|t| !t.is_empty())
    {
        if state.jwt().verify(access).is_ok()
            && state
                .revocations()
                .is_blacklisted(&claims.user_id, access)
                .await?
        {
            debug!(user_id = %claims.user_id, "Refresh attempted with a revoked access token");
            return Err(AuthError::Blacklisted);
        }
    }

    let Some(session) = state.sessions().get(&claims.user_id).await? else {
        debug!(user_id = %claims.user_id, "No live session for refresh token");
        return Err(AuthError::Unauthorized);
    };

    let client_ip = state
        .ip_resolver()
        .resolve(parts)
        .ok_or(AuthError::Unauthorized)?;
    if session.ip_address != client_ip || session.refresh_token != token {
        debug!(user_id = %claims.user_id, "Refresh token does not match the current session");
        return Err(AuthError::Unauthorized);
    }

    Ok(RefreshContext { claims, client_ip })
}

/// Resolved client IP for unauthenticated endpoints.
pub struct ClientIp(pub String);

impl<S> FromRequestParts<S> for ClientIp
where
    S: HasAuthBackend + Send + Sync,
{
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        state
            .ip_resolver()
            .resolve(parts)
            .map(ClientIp)
            .ok_or(AuthError::Unauthorized)
    }
}

/// Extractor for endpoints that require a valid access token.
pub struct Auth(pub AuthContext);

impl<S> FromRequestParts<S> for Auth
where
    S: HasAuthBackend + Send + Sync,
{
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        authenticate_request(parts, state).await.map(Auth)
    }
}

/// Extractor for the access token renewal endpoint.
pub struct RefreshAuth(pub RefreshContext);

impl<S> FromRequestParts<S> for RefreshAuth
where
    S: HasAuthBackend + Send + Sync,
{
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        refresh_request(parts, state).await.map(RefreshAuth)
    }
}
