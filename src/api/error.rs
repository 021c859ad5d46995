//! Shared error handling for API endpoints.

use axum::{
    Json,
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use tracing::error;

use crate::accounts::AccountError;
use crate::auth::{AuthError, ErrorBody};

/// Extension trait for concise error mapping on Results.
pub trait ResultExt<T> {
    fn internal_err(self, msg: &str) -> Result<T, ApiError>;
}

impl<T, E: std::fmt::Display> ResultExt<T> for Result<T, E> {
    fn internal_err(self, msg: &str) -> Result<T, ApiError> {
        self.map_err(|e| ApiError::internal_error(msg, e))
    }
}

/// API error type with automatic response conversion.
#[derive(Debug)]
pub enum ApiError {
    Auth(AuthError),
    RateLimitExceeded,
    UserNotFound,
    InvalidCredentials,
    DuplicateUser,
    BadRequest(String),
    Internal(String),
}

impl ApiError {
    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self::BadRequest(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    pub fn internal_error(context: &str, e: impl std::fmt::Display) -> Self {
        error!("{}: {}", context, e);
        Self::Internal(context.into())
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::Auth(e) => e.status_code(),
            ApiError::RateLimitExceeded => StatusCode::TOO_MANY_REQUESTS,
            ApiError::UserNotFound => StatusCode::NOT_FOUND,
            ApiError::InvalidCredentials => StatusCode::UNAUTHORIZED,
            ApiError::DuplicateUser | ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn code(&self) -> &'static str {
        match self {
            ApiError::Auth(e) => e.code(),
            ApiError::RateLimitExceeded => "rate_limit_exceeded",
            ApiError::UserNotFound => "user_not_found",
            ApiError::InvalidCredentials => "invalid_credentials",
            ApiError::DuplicateUser => "duplicate_user",
            ApiError::BadRequest(_) => "bad_request",
            ApiError::Internal(_) => "internal_error",
        }
    }
}

#[derive(serde::Serialize)]
struct OwnedErrorBody {
    error: String,
    code: &'static str,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let code = self.code();
        let message = match self {
            ApiError::Auth(e) => {
                return (
                    status,
                    Json(ErrorBody {
                        error: e.message(),
                        code,
                    }),
                )
                    .into_response();
            }
            ApiError::RateLimitExceeded => "Too many requests. Please try again later.".into(),
            ApiError::UserNotFound => "User not found".into(),
            ApiError::InvalidCredentials => "Invalid credentials".into(),
            ApiError::DuplicateUser => "User already exists".into(),
            ApiError::BadRequest(msg) => msg,
            // Context stays in the logs.
            ApiError::Internal(_) => "Internal server error".into(),
        };
        (
            status,
            Json(OwnedErrorBody {
                error: message,
                code,
            }),
        )
            .into_response()
    }
}

impl From<AuthError> for ApiError {
    fn from(e: AuthError) -> Self {
        ApiError::Auth(e)
    }
}

impl From<AccountError> for ApiError {
    fn from(e: AccountError) -> Self {
        match e {
            AccountError::InvalidInput(msg) => ApiError::bad_request(msg),
            AccountError::DuplicateUser => ApiError::DuplicateUser,
            AccountError::UserNotFound => ApiError::UserNotFound,
            AccountError::InvalidCredentials => ApiError::InvalidCredentials,
            AccountError::Internal(msg) => ApiError::internal(msg),
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(e: JsonRejection) -> Self {
        ApiError::bad_request(e.body_text())
    }
}
