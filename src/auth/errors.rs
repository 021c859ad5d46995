//! Authentication error types.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use tracing::error;

use crate::cache::CacheError;

/// Why a gate denied a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthError {
    MissingToken,
    InvalidToken,
    Expired,
    Blacklisted,
    Unauthorized,
    /// A store call failed or timed out.
    Internal,
}

impl AuthError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            AuthError::MissingToken
            | AuthError::InvalidToken
            | AuthError::Expired
            | AuthError::Blacklisted
            | AuthError::Unauthorized => StatusCode::UNAUTHORIZED,
            AuthError::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn message(&self) -> &'static str {
        match self {
            AuthError::MissingToken => "Missing token",
            AuthError::InvalidToken => "Invalid token",
            AuthError::Expired => "Token expired",
            AuthError::Blacklisted => "Token has been revoked",
            AuthError::Unauthorized => "Unauthorized",
            AuthError::Internal => "Internal server error",
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            AuthError::MissingToken => "missing_token",
            AuthError::InvalidToken => "invalid_token",
            AuthError::Expired => "expired",
            AuthError::Blacklisted => "blacklisted",
            AuthError::Unauthorized => "unauthorized",
            AuthError::Internal => "internal_error",
        }
    }
}

impl std::fmt::Display for AuthError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.message())
    }
}

impl std::error::Error for AuthError {}

impl From<CacheError> for AuthError {
    fn from(e: CacheError) -> Self {
        error!(error = %e, "Cache failure during authentication");
        AuthError::Internal
    }
}

#[derive(Serialize)]
pub(crate) struct ErrorBody {
    pub error: &'static str,
    pub code: &'static str,
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        (
            self.status_code(),
            Json(ErrorBody {
                error: self.message(),
                code: self.code(),
            }),
        )
            .into_response()
    }
}
