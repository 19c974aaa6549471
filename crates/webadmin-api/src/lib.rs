//! Webadmin API - user administration server
//!
//! Provides HTTP endpoints for session authentication (login, refresh,
//! logout) and admin-only user management. Access tokens are stateless
//! HS256 JWTs; refresh tokens are persisted in the credential store.
//!
//! Author: hephaex@gmail.com

pub mod audit;
pub mod auth;
pub mod error;
pub mod handlers;
pub mod routes;
pub mod state;

use axum::{http::HeaderValue, routing::get, Json, Router};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use utoipa::openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme};
use utoipa::{Modify, OpenApi};

use crate::state::AppState;

/// OpenAPI document
#[derive(OpenApi)]
#[openapi(
    paths(
        handlers::health::health_check,
        handlers::health::readiness_check,
        handlers::auth::login_handler,
        handlers::auth::refresh_handler,
        handlers::auth::logout_handler,
        handlers::users::get_current_user,
        handlers::users::list_users,
        handlers::users::create_user,
        handlers::users::get_user,
        handlers::users::update_user,
        handlers::users::delete_user,
        handlers::users::enable_user,
        handlers::users::disable_user,
    ),
    components(schemas(
        error::ApiError,
        auth::service::LoginRequest,
        auth::service::RefreshRequest,
        auth::service::LogoutRequest,
        auth::service::TokenResponse,
        handlers::auth::MessageResponse,
        handlers::health::HealthResponse,
        handlers::health::ReadinessResponse,
        handlers::users::UserResponse,
        handlers::users::UsersListResponse,
        handlers::users::CreateUserRequest,
        handlers::users::UpdateUserRequest,
    )),
    modifiers(&SecurityAddon),
    tags(
        (name = "auth", description = "Login, token refresh and logout"),
        (name = "users", description = "Current user profile"),
        (name = "admin", description = "User management (admin only)"),
        (name = "health", description = "Liveness and readiness probes"),
    )
)]
pub struct ApiDoc;

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer_auth",
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .bearer_format("JWT")
                        .build(),
                ),
            );
        }
    }
}

/// Build the application router
pub fn create_router(state: Arc<AppState>) -> Router {
    let cors = cors_layer(&state.config.server.cors_origins);
    let verbose = state.config.server.verbose;

    let router = Router::new()
        .merge(routes::api_routes(state.clone()))
        .route(
            "/api-docs/openapi.json",
            get(|| async { Json(ApiDoc::openapi()) }),
        )
        .layer(cors)
        .with_state(state);

    if verbose {
        router.layer(TraceLayer::new_for_http())
    } else {
        router
    }
}

/// Allow the configured origins, or any origin when none are configured
fn cors_layer(origins: &[String]) -> CorsLayer {
    if origins.is_empty() {
        return CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any);
    }

    let allowed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match origin.parse::<HeaderValue>() {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!(origin = %origin, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(allowed)
        .allow_methods(Any)
        .allow_headers(Any)
}
