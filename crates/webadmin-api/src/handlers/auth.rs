//! Authentication API handlers
//!
//! Author: hephaex@gmail.com

use super::parse_json;
use crate::audit::AuditContext;
use crate::auth::service::{LoginRequest, LogoutRequest, RefreshRequest, TokenResponse};
use crate::error::AppError;
use crate::state::AppState;
use axum::{body::Bytes, extract::State, http::HeaderMap, Json};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use utoipa::ToSchema;

/// Generic confirmation message
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct MessageResponse {
    pub message: String,
}

impl MessageResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Login with username and password
///
/// With `rememberMe` the response also carries a refresh token, unless it
/// could not be stored.
#[utoipa::path(
    post,
    path = "/auth/login",
    tag = "auth",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Login successful", body = TokenResponse),
        (status = 400, description = "Missing username or password", body = crate::error::ApiError),
        (status = 401, description = "Invalid credentials", body = crate::error::ApiError),
        (status = 500, description = "Internal server error", body = crate::error::ApiError),
    )
)]
pub async fn login_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<TokenResponse>, AppError> {
    let request: LoginRequest = parse_json(&body)?;
    let response = state
        .auth
        .login(request, AuditContext::from_headers(&headers))
        .await?;

    Ok(Json(response))
}

/// Exchange a refresh token for a new access token
#[utoipa::path(
    post,
    path = "/auth/refresh",
    tag = "auth",
    request_body = RefreshRequest,
    responses(
        (status = 200, description = "New access token", body = TokenResponse),
        (status = 400, description = "Missing refresh token", body = crate::error::ApiError),
        (status = 401, description = "Invalid or expired refresh token", body = crate::error::ApiError),
    )
)]
pub async fn refresh_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<TokenResponse>, AppError> {
    let request: RefreshRequest = parse_json(&body)?;
    let response = state
        .auth
        .refresh(request, AuditContext::from_headers(&headers))
        .await?;

    Ok(Json(response))
}

/// Logout
///
/// Revokes the given refresh token if there is one. The body is optional
/// and a malformed body is ignored; the call always succeeds.
#[utoipa::path(
    post,
    path = "/auth/logout",
    tag = "auth",
    request_body(content = LogoutRequest, description = "Optional"),
    responses(
        (status = 200, description = "Logged out", body = MessageResponse),
    )
)]
pub async fn logout_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Json<MessageResponse> {
    let request: LogoutRequest = serde_json::from_slice(&body).unwrap_or_default();
    state
        .auth
        .logout(request, AuditContext::from_headers(&headers))
        .await;

    Json(MessageResponse::new("Logged out successfully"))
}
