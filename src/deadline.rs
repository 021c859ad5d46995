//! Per-request deadline.
//!
//! The whole downstream stack (rate limiter, gates, handler) runs under one
//! timeout. When it fires the inner future is dropped, which abandons every
//! in-flight cache and database call, and the client gets a 500.

use std::time::Duration;

use axum::{
    extract::{Request, State},
    middleware::Next,
    response::{IntoResponse, Response},
};
use tracing::warn;

use crate::api::ApiError;

/// Default request deadline.
pub const DEFAULT_REQUEST_DEADLINE: Duration = Duration::from_secs(5);

pub async fn request_deadline(
    State(deadline): State<Duration>,
    request: Request,
    next: Next,
) -> Response {
    let method = request.method().clone();
    let path = request.uri().path().to_string();

    match tokio::time::timeout(deadline, next.run(request)).await {
        Ok(response) => response,
        Err(_) => {
            warn!(
                %method,
                path = %path,
                deadline_ms = deadline.as_millis() as u64,
                "Request deadline exceeded"
            );
            ApiError::internal("Request deadline exceeded").into_response()
        }
    }
}
