//! Session token endpoints.
//!
//! - POST `/login` - Check credentials, issue both tokens and start a session
//! - POST `/logout` - Revoke the current access token and end the session
//! - GET `/access-token` - Mint a new access token from the refresh cookie

use std::time::Duration;

use axum::{
    Json, Router,
    extract::{State, rejection::JsonRejection},
    http::header::SET_COOKIE,
    response::{AppendHeaders, IntoResponse},
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use tracing::info;

use super::ApiState;
use super::error::{ApiError, ResultExt};
use crate::auth::{
    ACCESS_COOKIE_NAME, Auth, ClientIp, REFRESH_COOKIE_NAME, RefreshAuth, clear_cookie,
    session_cookie,
};
use crate::jwt::now_secs;

pub fn router() -> Router<ApiState> {
    Router::new()
        .route("/login", post(login))
        .route("/logout", post(logout))
        .route("/access-token", get(access_token))
}

#[derive(Deserialize)]
struct LoginRequest {
    email: String,
    password: String,
}

#[derive(Serialize)]
struct LoginResponse {
    access_token: String,
    refresh_token: String,
    user_id: String,
    email: String,
}

#[derive(Serialize)]
struct AccessTokenResponse {
    access_token: String,
}

#[derive(Serialize)]
struct MessageResponse {
    message: &'static str,
}

async fn login(
    State(state): State<ApiState>,
    ClientIp(client_ip): ClientIp,
    payload: Result<Json<LoginRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Json(payload) = payload?;
    let user = state
        .accounts
        .authenticate(&payload.email, &payload.password)
        .await?;

    let access = state
        .jwt
        .mint_access(&user.id, &user.email)
        .internal_err("Failed to generate access token")?;
    let refresh = state
        .jwt
        .mint_refresh(&user.id, &user.email)
        .internal_err("Failed to generate refresh token")?;

    // The cache record gates requests; the durable copy backs the profile.
    state
        .sessions
        .put(&user.id, &refresh.token, &client_ip)
        .await
        .internal_err("Failed to store session")?;
    state
        .accounts
        .record_session(&user.id, &refresh.token, &client_ip)
        .await?;

    info!(user_id = %user.id, ip = %client_ip, "User logged in");

    let cookies = AppendHeaders([
        (
            SET_COOKIE,
            session_cookie(
                ACCESS_COOKIE_NAME,
                &access.token,
                Duration::from_secs(access.duration),
                state.secure_cookies,
            ),
        ),
        (
            SET_COOKIE,
            session_cookie(
                REFRESH_COOKIE_NAME,
                &refresh.token,
                Duration::from_secs(refresh.duration),
                state.secure_cookies,
            ),
        ),
    ]);

    Ok((
        cookies,
        Json(LoginResponse {
            access_token: access.token,
            refresh_token: refresh.token,
            user_id: user.id,
            email: user.email,
        }),
    ))
}

async fn logout(
    State(state): State<ApiState>,
    Auth(auth): Auth,
) -> Result<impl IntoResponse, ApiError> {
    let user_id = &auth.claims.user_id;
    let now = now_secs().internal_err("Failed to read system time")?;

    state
        .revocations
        .blacklist(
            user_id,
            &auth.access_token,
            Duration::from_secs(auth.claims.remaining_secs(now)),
        )
        .await
        .internal_err("Failed to blacklist access token")?;
    state
        .sessions
        .delete(user_id)
        .await
        .internal_err("Failed to delete session")?;

    info!(user_id = %user_id, "User logged out");

    let cookies = AppendHeaders([
        (SET_COOKIE, clear_cookie(ACCESS_COOKIE_NAME, state.secure_cookies)),
        (SET_COOKIE, clear_cookie(REFRESH_COOKIE_NAME, state.secure_cookies)),
    ]);

    Ok((
        cookies,
        Json(MessageResponse {
            message: "Logged out successfully",
        }),
    ))
}

async fn access_token(
    State(state): State<ApiState>,
    RefreshAuth(refresh): RefreshAuth,
) -> Result<impl IntoResponse, ApiError> {
    let access = state
        .jwt
        .mint_access(&refresh.claims.user_id, &refresh.claims.email)
        .internal_err("Failed to generate access token")?;

    let cookie = session_cookie(
        ACCESS_COOKIE_NAME,
        &access.token,
        Duration::from_secs(access.duration),
        state.secure_cookies,
    );

    Ok((
        AppendHeaders([(SET_COOKIE, cookie)]),
        Json(AccessTokenResponse {
            access_token: access.token,
        }),
    ))
}
