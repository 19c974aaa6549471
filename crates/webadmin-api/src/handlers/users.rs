//! User account handlers
//!
//! `GET /user` serves the caller's own profile. Everything under
//! `/admin/users` runs behind both gates.
//!
//! Author: hephaex@gmail.com

use super::auth::MessageResponse;
use super::parse_json;
use crate::auth::middleware::AuthenticatedUser;
use crate::error::{conflict_message, AppError};
use crate::state::AppState;
use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    http::StatusCode,
    Extension, Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use utoipa::{IntoParams, ToSchema};
use validator::{Validate, ValidationErrors};
use webadmin_core::{
    NewUser, Role, StoreError, User, UserChanges, UserStatus, DEFAULT_AVATAR,
};

const DEFAULT_PAGE_SIZE: i64 = 10;

/// Public view of a user. The password hash is never included.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct UserResponse {
    pub id: i64,
    pub username: String,
    pub email: String,
    pub name: String,
    pub avatar: String,
    pub role: String,
    pub status: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<User> for UserResponse {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            username: user.username,
            email: user.email,
            name: user.name,
            avatar: user.avatar,
            role: user.role.into(),
            status: user.status.as_str().to_string(),
            created_at: user.created_at,
            updated_at: user.updated_at,
        }
    }
}

/// Page of users
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct UsersListResponse {
    pub users: Vec<UserResponse>,
    /// Total number of users, across all pages
    pub total: i64,
}

/// Pagination parameters. Unparseable or out-of-range values fall back
/// to the defaults.
#[derive(Debug, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct ListUsersQuery {
    /// Page size (default 10)
    pub limit: Option<String>,
    /// Number of users to skip (default 0)
    pub offset: Option<String>,
}

impl ListUsersQuery {
    fn limit(&self) -> i64 {
        self.limit
            .as_deref()
            .and_then(|l| l.parse::<i64>().ok())
            .filter(|l| *l > 0)
            .unwrap_or(DEFAULT_PAGE_SIZE)
    }

    fn offset(&self) -> i64 {
        self.offset
            .as_deref()
            .and_then(|o| o.parse::<i64>().ok())
            .filter(|o| *o >= 0)
            .unwrap_or(0)
    }
}

/// Create user request
#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate, ToSchema)]
#[serde(default)]
pub struct CreateUserRequest {
    pub username: String,
    #[validate(email)]
    pub email: String,
    pub name: String,
    pub password: String,
    /// "admin" or "user" (default "user")
    pub role: Option<String>,
    pub avatar: Option<String>,
}

/// Update user request. Absent or empty fields are left unchanged.
#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate, ToSchema)]
#[serde(default)]
pub struct UpdateUserRequest {
    #[validate(email)]
    pub email: Option<String>,
    pub name: Option<String>,
    /// "admin" or "user"
    pub role: Option<String>,
    /// "active" or "disabled"
    pub status: Option<String>,
    pub avatar: Option<String>,
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.is_empty())
}

fn parse_role(value: &str) -> Result<Role, AppError> {
    Role::parse_known(value).ok_or_else(|| AppError::bad_request("Role must be 'admin' or 'user'"))
}

fn parse_status(value: &str) -> Result<UserStatus, AppError> {
    UserStatus::parse_known(value)
        .ok_or_else(|| AppError::bad_request("Status must be 'active' or 'disabled'"))
}

fn invalid_email(_: ValidationErrors) -> AppError {
    AppError::bad_request("Invalid email format")
}

fn parse_user_id(raw: &str) -> Result<i64, AppError> {
    raw.parse()
        .map_err(|_| AppError::bad_request("Invalid user ID"))
}

impl UpdateUserRequest {
    fn into_changes(self) -> Result<UserChanges, AppError> {
        let request = UpdateUserRequest {
            email: non_empty(self.email),
            name: non_empty(self.name),
            role: non_empty(self.role),
            status: non_empty(self.status),
            avatar: non_empty(self.avatar),
        };
        request.validate().map_err(invalid_email)?;

        Ok(UserChanges {
            role: request.role.as_deref().map(parse_role).transpose()?,
            status: request.status.as_deref().map(parse_status).transpose()?,
            email: request.email,
            name: request.name,
            avatar: request.avatar,
        })
    }
}

/// Apply changes, mapping store errors to API errors
async fn apply_changes(
    state: &AppState,
    id: i64,
    changes: &UserChanges,
) -> Result<UserResponse, AppError> {
    match state.store.update_user(id, changes).await {
        Ok(user) => Ok(user.into()),
        Err(StoreError::NotFound) => Err(AppError::NotFound("User not found".to_string())),
        Err(StoreError::Conflict { field }) => {
            Err(AppError::Conflict(conflict_message(field.as_deref().or(Some("email")))))
        }
        Err(e) => Err(e.into()),
    }
}

/// Current user's profile
#[utoipa::path(
    get,
    path = "/user",
    tag = "users",
    responses(
        (status = 200, description = "Caller's profile", body = UserResponse),
        (status = 401, description = "Not authenticated", body = crate::error::ApiError),
        (status = 404, description = "User no longer exists", body = crate::error::ApiError),
    ),
    security(("bearer_auth" = []))
)]
pub async fn get_current_user(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthenticatedUser>,
) -> Result<Json<UserResponse>, AppError> {
    let user = state
        .store
        .get_user_by_id(user.user_id)
        .await?
        .ok_or_else(|| AppError::NotFound("User not found".to_string()))?;

    Ok(Json(user.into()))
}

/// List users, newest first
#[utoipa::path(
    get,
    path = "/admin/users",
    tag = "admin",
    params(ListUsersQuery),
    responses(
        (status = 200, description = "Page of users", body = UsersListResponse),
        (status = 403, description = "Admin access required", body = crate::error::ApiError),
    ),
    security(("bearer_auth" = []))
)]
pub async fn list_users(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ListUsersQuery>,
) -> Result<Json<UsersListResponse>, AppError> {
    let (users, total) = state
        .store
        .list_users(query.limit(), query.offset())
        .await?;

    Ok(Json(UsersListResponse {
        users: users.into_iter().map(UserResponse::from).collect(),
        total,
    }))
}

/// Create a user
#[utoipa::path(
    post,
    path = "/admin/users",
    tag = "admin",
    request_body = CreateUserRequest,
    responses(
        (status = 201, description = "User created", body = UserResponse),
        (status = 400, description = "Missing or invalid fields", body = crate::error::ApiError),
        (status = 409, description = "Username or email already exists", body = crate::error::ApiError),
    ),
    security(("bearer_auth" = []))
)]
pub async fn create_user(
    State(state): State<Arc<AppState>>,
    body: Bytes,
) -> Result<(StatusCode, Json<UserResponse>), AppError> {
    let request: CreateUserRequest = parse_json(&body)?;

    if request.username.is_empty()
        || request.email.is_empty()
        || request.name.is_empty()
        || request.password.is_empty()
    {
        return Err(AppError::bad_request(
            "Username, email, name, and password are required",
        ));
    }

    let role = match non_empty(request.role.clone()) {
        Some(role) => parse_role(&role)?,
        None => Role::User,
    };
    request.validate().map_err(invalid_email)?;

    let password_hash = state.hash_password(&request.password)?;
    let new_user = NewUser::new(
        request.username,
        request.email,
        request.name,
        role,
        password_hash,
    )
    .with_avatar(non_empty(request.avatar).unwrap_or_else(|| DEFAULT_AVATAR.to_string()));

    let user = state.store.create_user(&new_user).await.map_err(|e| match e {
        StoreError::Conflict { .. } => AppError::Conflict(conflict_message(None)),
        other => other.into(),
    })?;

    tracing::info!(user_id = user.id, username = %user.username, "User created");
    Ok((StatusCode::CREATED, Json(user.into())))
}

/// Get a user by id
#[utoipa::path(
    get,
    path = "/admin/users/{id}",
    tag = "admin",
    params(("id" = i64, Path, description = "User ID")),
    responses(
        (status = 200, description = "User", body = UserResponse),
        (status = 400, description = "Invalid user ID", body = crate::error::ApiError),
        (status = 404, description = "User not found", body = crate::error::ApiError),
    ),
    security(("bearer_auth" = []))
)]
pub async fn get_user(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<UserResponse>, AppError> {
    let id = parse_user_id(&id)?;
    let user = state
        .store
        .get_user_by_id(id)
        .await?
        .ok_or_else(|| AppError::NotFound("User not found".to_string()))?;

    Ok(Json(user.into()))
}

/// Update a user
#[utoipa::path(
    put,
    path = "/admin/users/{id}",
    tag = "admin",
    params(("id" = i64, Path, description = "User ID")),
    request_body = UpdateUserRequest,
    responses(
        (status = 200, description = "Updated user", body = UserResponse),
        (status = 400, description = "Invalid user ID or field value", body = crate::error::ApiError),
        (status = 404, description = "User not found", body = crate::error::ApiError),
        (status = 409, description = "Email already exists", body = crate::error::ApiError),
    ),
    security(("bearer_auth" = []))
)]
pub async fn update_user(
    State(state): State<Arc<AppState>>,
    Extension(caller): Extension<AuthenticatedUser>,
    Path(id): Path<String>,
    body: Bytes,
) -> Result<Json<UserResponse>, AppError> {
    let id = parse_user_id(&id)?;
    let request: UpdateUserRequest = parse_json(&body)?;
    let changes = request.into_changes()?;

    if id == caller.user_id && changes.status == Some(UserStatus::Disabled) {
        return Err(AppError::bad_request("Cannot disable your own account"));
    }

    Ok(Json(apply_changes(&state, id, &changes).await?))
}

/// Delete a user
#[utoipa::path(
    delete,
    path = "/admin/users/{id}",
    tag = "admin",
    params(("id" = i64, Path, description = "User ID")),
    responses(
        (status = 200, description = "User deleted", body = MessageResponse),
        (status = 400, description = "Invalid user ID or own account", body = crate::error::ApiError),
        (status = 404, description = "User not found", body = crate::error::ApiError),
    ),
    security(("bearer_auth" = []))
)]
pub async fn delete_user(
    State(state): State<Arc<AppState>>,
    Extension(caller): Extension<AuthenticatedUser>,
    Path(id): Path<String>,
) -> Result<Json<MessageResponse>, AppError> {
    let id = parse_user_id(&id)?;
    if id == caller.user_id {
        return Err(AppError::bad_request("Cannot delete your own account"));
    }

    state.store.delete_user(id).await?;

    tracing::info!(user_id = id, deleted_by = caller.user_id, "User deleted");
    Ok(Json(MessageResponse::new("User deleted successfully")))
}

/// Enable a user account
#[utoipa::path(
    put,
    path = "/admin/users/{id}/enable",
    tag = "admin",
    params(("id" = i64, Path, description = "User ID")),
    responses(
        (status = 200, description = "User enabled", body = UserResponse),
        (status = 400, description = "Invalid user ID", body = crate::error::ApiError),
        (status = 404, description = "User not found", body = crate::error::ApiError),
    ),
    security(("bearer_auth" = []))
)]
pub async fn enable_user(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<UserResponse>, AppError> {
    let id = parse_user_id(&id)?;
    let changes = UserChanges::status(UserStatus::Active);

    Ok(Json(apply_changes(&state, id, &changes).await?))
}

/// Disable a user account
///
/// An admin can never disable their own account.
#[utoipa::path(
    put,
    path = "/admin/users/{id}/disable",
    tag = "admin",
    params(("id" = i64, Path, description = "User ID")),
    responses(
        (status = 200, description = "User disabled", body = UserResponse),
        (status = 400, description = "Invalid user ID or own account", body = crate::error::ApiError),
        (status = 404, description = "User not found", body = crate::error::ApiError),
    ),
    security(("bearer_auth" = []))
)]
pub async fn disable_user(
    State(state): State<Arc<AppState>>,
    Extension(caller): Extension<AuthenticatedUser>,
    Path(id): Path<String>,
) -> Result<Json<UserResponse>, AppError> {
    let id = parse_user_id(&id)?;
    if id == caller.user_id {
        return Err(AppError::bad_request("Cannot disable your own account"));
    }

    let changes = UserChanges::status(UserStatus::Disabled);
    Ok(Json(apply_changes(&state, id, &changes).await?))
}
