/// Authentication and authorization gates
///
/// `auth_middleware` validates the bearer token and stores an
/// `AuthenticatedUser` in the request extensions. `require_admin` must run
/// after it and rejects every request whose identity is missing or not admin.
use std::sync::Arc;

use super::jwt::{Claims, JwtError};
use crate::audit::{audit_log, AuditContext, AuditEvent};
use crate::error::ApiError;
use crate::state::AppState;
use axum::{
    extract::{Request, State},
    http::{header, HeaderMap, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use webadmin_core::Role;

/// Identity extracted from a valid access token
///
/// Handlers read it with `Extension<AuthenticatedUser>`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthenticatedUser {
    pub user_id: i64,
    pub username: String,
    pub role: Role,
}

impl AuthenticatedUser {
    pub fn is_admin(&self) -> bool {
        self.role.is_admin()
    }
}

impl From<Claims> for AuthenticatedUser {
    fn from(claims: Claims) -> Self {
        Self {
            user_id: claims.user_id,
            username: claims.username,
            role: claims.role,
        }
    }
}

/// Gate failures
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Authorization header required")]
    MissingAuthHeader,

    #[error("Invalid authorization header format")]
    InvalidAuthHeader,

    /// The cause stays in logs; the response is always the same
    #[error("Invalid or expired token")]
    InvalidToken(#[source] JwtError),

    #[error("Admin access required")]
    AdminRequired,
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let (status, code) = match self {
            AuthError::AdminRequired => (StatusCode::FORBIDDEN, "FORBIDDEN"),
            _ => (StatusCode::UNAUTHORIZED, "UNAUTHORIZED"),
        };

        (status, Json(ApiError::new(code, self.to_string()))).into_response()
    }
}

/// Pull the token out of `Authorization: Bearer <token>`
///
/// The value must be visible ASCII and split on single spaces into exactly
/// two parts, the first being `Bearer`.
pub fn extract_bearer_token(headers: &HeaderMap) -> Result<&str, AuthError> {
    let value = match headers.get(header::AUTHORIZATION) {
        Some(value) if !value.is_empty() => value,
        _ => return Err(AuthError::MissingAuthHeader),
    };

    let value = value.to_str().map_err(|_| AuthError::InvalidAuthHeader)?;

    let mut parts = value.split(' ');
    match (parts.next(), parts.next(), parts.next()) {
        (Some("Bearer"), Some(token), None) => Ok(token),
        _ => Err(AuthError::InvalidAuthHeader),
    }
}

/// Authentication gate
///
/// ```ignore
/// let protected = Router::new()
///     .route("/user", get(get_current_user))
///     .route_layer(middleware::from_fn_with_state(state.clone(), auth_middleware));
/// ```
pub async fn auth_middleware(
    State(state): State<Arc<AppState>>,
    mut request: Request,
    next: Next,
) -> Result<Response, AuthError> {
    let token = extract_bearer_token(request.headers())?;

    let claims = match state.jwt.validate(token) {
        Ok(claims) => claims,
        Err(e) => {
            audit_log(&AuditEvent::InvalidToken {
                reason: e.to_string(),
                path: request.uri().path().to_string(),
                context: AuditContext::from_headers(request.headers()),
            });
            return Err(AuthError::InvalidToken(e));
        }
    };

    request
        .extensions_mut()
        .insert(AuthenticatedUser::from(claims));

    Ok(next.run(request).await)
}

/// Authorization gate for admin-only routes
///
/// Fails closed when no identity was attached.
pub async fn require_admin(request: Request, next: Next) -> Result<Response, AuthError> {
    let user = request.extensions().get::<AuthenticatedUser>();

    if !user.is_some_and(AuthenticatedUser::is_admin) {
        audit_log(&AuditEvent::AccessDenied {
            user_id: user.map(|u| u.user_id),
            username: user.map(|u| u.username.clone()),
            path: request.uri().path().to_string(),
            context: AuditContext::from_headers(request.headers()),
        });
        return Err(AuthError::AdminRequired);
    }

    Ok(next.run(request).await)
}
