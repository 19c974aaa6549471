//! Application state management
//!
//! Author: hephaex@gmail.com

use std::sync::Arc;
use std::time::Instant;

use crate::auth::jwt::JwtConfig;
use crate::auth::password::{hash_password_with_config, PasswordConfig, PasswordError};
use crate::auth::service::AuthService;
use webadmin_core::config::AppConfig;
use webadmin_core::{CredentialStore, NewUser, Role, SqliteCredentialStore, StoreError};

/// Failures while preparing the store at startup
#[derive(Debug, thiserror::Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Password(#[from] PasswordError),
}

/// Application state shared across handlers
pub struct AppState {
    /// Application configuration
    pub config: AppConfig,
    /// Server start time
    pub start_time: Instant,
    /// Users and refresh tokens
    pub store: Arc<dyn CredentialStore>,
    /// Signing configuration, fixed for the process lifetime
    pub jwt: JwtConfig,
    /// Argon2 cost for newly hashed passwords
    pub password: PasswordConfig,
    /// Login, refresh and logout
    pub auth: AuthService,
}

impl AppState {
    pub fn new(config: AppConfig, store: Arc<dyn CredentialStore>) -> Self {
        Self::with_password_config(config, store, PasswordConfig::default())
    }

    pub fn with_password_config(
        config: AppConfig,
        store: Arc<dyn CredentialStore>,
        password: PasswordConfig,
    ) -> Self {
        let jwt = JwtConfig::from_auth_config(&config.auth);
        let auth = AuthService::new(store.clone(), jwt.clone(), &password);

        Self {
            config,
            start_time: Instant::now(),
            store,
            jwt,
            password,
            auth,
        }
    }

    /// Fresh in-memory store seeded with the configured default admin
    pub async fn in_memory(
        config: AppConfig,
        password: PasswordConfig,
    ) -> Result<Self, BootstrapError> {
        let store = SqliteCredentialStore::connect_in_memory().await?;
        seed_default_admin(&store, &config, &password).await?;
        Ok(Self::with_password_config(config, Arc::new(store), password))
    }

    /// Get uptime in seconds
    pub fn uptime_secs(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }

    /// Hash a password with the configured cost
    pub fn hash_password(&self, password: &str) -> Result<String, crate::error::AppError> {
        hash_password_with_config(password, &self.password)
            .map_err(|e| crate::error::AppError::internal(e.to_string()))
    }
}

/// Create the default admin account when the users table is empty
pub async fn seed_default_admin(
    store: &SqliteCredentialStore,
    config: &AppConfig,
    password: &PasswordConfig,
) -> Result<bool, BootstrapError> {
    if store.count_users().await? > 0 {
        return Ok(false);
    }

    let auth = &config.auth;
    let hash = hash_password_with_config(&auth.default_admin_password, password)?;
    let admin = NewUser::new(
        &auth.default_admin_username,
        &auth.default_admin_email,
        &auth.default_admin_name,
        Role::Admin,
        hash,
    );

    match store.seed_default_admin(&admin).await {
        Ok(created) => Ok(created),
        // Another process seeded first
        Err(StoreError::Conflict { .. }) => Ok(false),
        Err(e) => Err(e.into()),
    }
}
