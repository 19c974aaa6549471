//! API route definitions
//!
//! Author: hephaex@gmail.com

use crate::auth::middleware::{auth_middleware, require_admin};
use crate::handlers::{auth, health, users};
use crate::state::AppState;
use axum::{
    middleware,
    routing::{get, post, put},
    Router,
};
use std::sync::Arc;

/// Create API routes
pub fn api_routes(state: Arc<AppState>) -> Router<Arc<AppState>> {
    // Public routes (no authentication required)
    let public_routes = Router::new()
        .route("/health", get(health::health_check))
        .route("/ready", get(health::readiness_check))
        .route("/auth/login", post(auth::login_handler))
        .route("/auth/refresh", post(auth::refresh_handler))
        .route("/auth/logout", post(auth::logout_handler));

    // Authenticated routes
    let protected_routes = Router::new().route("/user", get(users::get_current_user));

    // Admin routes: authentication runs first, then the role check
    let admin_routes = Router::new()
        .route("/admin/users", get(users::list_users).post(users::create_user))
        .route(
            "/admin/users/:id",
            get(users::get_user)
                .put(users::update_user)
                .delete(users::delete_user),
        )
        .route("/admin/users/:id/enable", put(users::enable_user))
        .route("/admin/users/:id/disable", put(users::disable_user))
        .route_layer(middleware::from_fn(require_admin));

    let authenticated = protected_routes
        .merge(admin_routes)
        .route_layer(middleware::from_fn_with_state(state, auth_middleware));

    Router::new().merge(public_routes).merge(authenticated)
}
