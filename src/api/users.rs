//! Account API endpoints.
//!
//! - POST `/register` - Create an account
//! - GET `/profile` - Current user's profile (access token required)

use axum::{
    Json, Router,
    extract::{State, rejection::JsonRejection},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
};
use serde::{Deserialize, Serialize};

use super::ApiState;
use super::error::ApiError;
use crate::auth::Auth;

pub fn router() -> Router<ApiState> {
    Router::new()
        .route("/register", post(register))
        .route("/profile", get(profile))
}

#[derive(Deserialize)]
struct RegisterRequest {
    email: String,
    password: String,
}

#[derive(Serialize)]
struct MessageResponse {
    message: &'static str,
}

async fn register(
    State(state): State<ApiState>,
    payload: Result<Json<RegisterRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Json(payload) = payload?;
    state
        .accounts
        .register(&payload.email, &payload.password)
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(MessageResponse {
            message: "User registered successfully",
        }),
    ))
}

async fn profile(
    State(state): State<ApiState>,
    Auth(auth): Auth,
) -> Result<impl IntoResponse, ApiError> {
    let profile = state.accounts.profile(&auth.claims.user_id).await?;
    Ok(Json(profile))
}
