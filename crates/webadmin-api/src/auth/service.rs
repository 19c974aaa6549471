//! Authentication service layer
//!
//! Login, token refresh and logout on top of the credential store,
//! the token issuer and the refresh token manager.

use std::sync::Arc;

use super::jwt::JwtConfig;
use super::password::{hash_password_with_config, verify_password, PasswordConfig};
use super::refresh::{RefreshTokenError, RefreshTokenManager};
use crate::audit::{audit_log, AuditContext, AuditEvent};
use crate::error::AppError;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use webadmin_core::{CredentialStore, User};

const INVALID_CREDENTIALS: &str = "Invalid credentials";
const INVALID_REFRESH_TOKEN: &str = "Invalid or expired refresh token";

/// User login request
#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
#[serde(default)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
    /// Also issue a refresh token
    #[serde(rename = "rememberMe")]
    pub remember_me: bool,
}

/// Token refresh request
#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
#[serde(default)]
pub struct RefreshRequest {
    pub refresh_token: String,
}

/// Logout request
#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
#[serde(default)]
pub struct LogoutRequest {
    pub refresh_token: Option<String>,
}

/// Issued tokens
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct TokenResponse {
    pub access_token: String,
    /// Always "Bearer"
    pub token_type: String,
    /// Access token lifetime in seconds
    pub expires_in: i64,
    /// Present only after a remember-me login whose token was stored
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
}

/// Authentication service
#[derive(Clone)]
pub struct AuthService {
    store: Arc<dyn CredentialStore>,
    jwt: JwtConfig,
    refresh_tokens: RefreshTokenManager,
    /// Verified against when the username does not resolve, so that
    /// misses cost the same hashing work as a wrong password
    dummy_hash: Option<String>,
}

impl AuthService {
    /// `password` must match the cost used for stored hashes
    pub fn new(store: Arc<dyn CredentialStore>, jwt: JwtConfig, password: &PasswordConfig) -> Self {
        let dummy_hash = match hash_password_with_config("webadmin-unknown-user", password) {
            Ok(hash) => Some(hash),
            Err(e) => {
                tracing::warn!(error = %e, "Failed to prepare dummy password hash");
                None
            }
        };

        Self {
            refresh_tokens: RefreshTokenManager::new(store.clone()),
            store,
            jwt,
            dummy_hash,
        }
    }

    pub fn refresh_tokens(&self) -> &RefreshTokenManager {
        &self.refresh_tokens
    }

    /// Authenticate with username and password
    ///
    /// Unknown user, disabled user and wrong password all fail with the
    /// same `Unauthenticated("Invalid credentials")`.
    pub async fn login(
        &self,
        request: LoginRequest,
        context: AuditContext,
    ) -> Result<TokenResponse, AppError> {
        if request.username.is_empty() || request.password.is_empty() {
            return Err(AppError::bad_request("Username and password are required"));
        }

        let user = match self.check_credentials(&request).await? {
            Ok(user) => user,
            Err(reason) => {
                audit_log(&AuditEvent::LoginFailure {
                    username: request.username,
                    reason: reason.to_string(),
                    context,
                });
                return Err(AppError::Unauthenticated(INVALID_CREDENTIALS.to_string()));
            }
        };

        let mut response = self.token_response(&user)?;
        if request.remember_me {
            response.refresh_token = self.issue_refresh_token(&user).await;
        }

        audit_log(&AuditEvent::LoginSuccess {
            user_id: user.id,
            username: user.username,
            remember_me: request.remember_me,
            context,
        });

        Ok(response)
    }

    /// Look the user up and check the password
    ///
    /// The inner `Err` carries the rejection reason for the audit log.
    async fn check_credentials(
        &self,
        request: &LoginRequest,
    ) -> Result<Result<User, &'static str>, AppError> {
        let Some(user) = self
            .store
            .get_user_by_username(&request.username, true)
            .await?
        else {
            self.burn_verification(&request.password);
            return Ok(Err("unknown or disabled user"));
        };

        if !user.is_active() {
            self.burn_verification(&request.password);
            return Ok(Err("account disabled"));
        }

        match verify_password(&request.password, &user.password_hash) {
            Ok(true) => Ok(Ok(user)),
            Ok(false) => Ok(Err("wrong password")),
            Err(e) => {
                tracing::warn!(user_id = user.id, error = %e, "Stored password hash is unusable");
                Ok(Err("unusable password hash"))
            }
        }
    }

    /// Run one hash verification whose result is discarded
    fn burn_verification(&self, password: &str) -> bool {
        match &self.dummy_hash {
            Some(hash) => verify_password(password, hash).unwrap_or(false),
            None => false,
        }
    }

    /// Sign and store a refresh token. Any failure yields `None`.
    async fn issue_refresh_token(&self, user: &User) -> Option<String> {
        let issued = match self.jwt.issue_refresh_token() {
            Ok(issued) => issued,
            Err(e) => {
                audit_log(&AuditEvent::RefreshTokenNotPersisted {
                    user_id: user.id,
                    reason: e.to_string(),
                });
                return None;
            }
        };

        match self
            .refresh_tokens
            .save(user.id, &issued.token, issued.expires_at)
            .await
        {
            Ok(()) => Some(issued.token),
            Err(e) => {
                audit_log(&AuditEvent::RefreshTokenNotPersisted {
                    user_id: user.id,
                    reason: e.to_string(),
                });
                None
            }
        }
    }

    /// Exchange a stored refresh token for a new access token
    ///
    /// The refresh token stays valid; it is not rotated.
    pub async fn refresh(
        &self,
        request: RefreshRequest,
        context: AuditContext,
    ) -> Result<TokenResponse, AppError> {
        if request.refresh_token.is_empty() {
            return Err(AppError::bad_request("Refresh token is required"));
        }

        let rejected = |reason: String, context: AuditContext| {
            audit_log(&AuditEvent::TokenRefreshFailure { reason, context });
            AppError::Unauthenticated(INVALID_REFRESH_TOKEN.to_string())
        };

        let user_id = match self.refresh_tokens.validate(&request.refresh_token).await {
            Ok(user_id) => user_id,
            Err(RefreshTokenError::NotFound) => {
                return Err(rejected("unknown or expired token".to_string(), context));
            }
            Err(e) => {
                tracing::warn!(error = %e, "Refresh token lookup failed");
                return Err(rejected(e.to_string(), context));
            }
        };

        // Re-read the user so role changes apply to the new token
        let user = match self.store.get_user_by_id(user_id).await? {
            Some(user) if user.is_active() => user,
            Some(_) => return Err(rejected("account disabled".to_string(), context)),
            None => return Err(rejected("user no longer exists".to_string(), context)),
        };

        let response = self.token_response(&user)?;

        audit_log(&AuditEvent::TokenRefresh {
            user_id: user.id,
            username: user.username,
            context,
        });

        Ok(response)
    }

    /// Best-effort revocation of a refresh token
    ///
    /// # Returns
    /// Whether a stored token was removed. Never fails.
    pub async fn logout(&self, request: LogoutRequest, context: AuditContext) -> bool {
        let revoked = match request.refresh_token.as_deref() {
            Some(token) if !token.is_empty() => match self.refresh_tokens.delete(token).await {
                Ok(removed) => removed,
                Err(e) => {
                    tracing::warn!(error = %e, "Failed to revoke refresh token on logout");
                    false
                }
            },
            _ => false,
        };

        audit_log(&AuditEvent::Logout {
            refresh_token_revoked: revoked,
            context,
        });

        revoked
    }

    fn token_response(&self, user: &User) -> Result<TokenResponse, AppError> {
        let access_token = self
            .jwt
            .issue_access_token(user)
            .map_err(|e| AppError::internal(format!("Failed to generate access token: {e}")))?;

        Ok(TokenResponse {
            access_token,
            token_type: "Bearer".to_string(),
            expires_in: self.jwt.access_ttl_secs,
            refresh_token: None,
        })
    }
}
