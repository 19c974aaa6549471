//! Webadmin Core - Domain models, configuration and credential storage
//!
//! This crate defines the pieces shared by the webadmin service:
//! - User and refresh token models
//! - The `CredentialStore` trait and its SQLite implementation
//! - Store error types
//! - Configuration management
//!
//! Author: hephaex@gmail.com

pub mod config;
pub mod models;
pub mod store;

pub use config::{AppConfig, AuthConfig, ConfigError, DatabaseConfig, LoggingConfig, ServerConfig};
pub use models::{NewUser, RefreshTokenRecord, Role, User, UserChanges, UserStatus, DEFAULT_AVATAR};
pub use store::{CredentialStore, SqliteCredentialStore};

use thiserror::Error;

// ============================================================================
// Error Types
// ============================================================================

/// Credential store errors
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Record not found")]
    NotFound,

    /// A UNIQUE constraint rejected the write. `field` names the column
    /// when the database reports it.
    #[error("Conflict on {}", field.as_deref().unwrap_or("unique constraint"))]
    Conflict { field: Option<String> },

    #[error("Database error: {0}")]
    Database(String),
}

pub type Result<T> = std::result::Result<T, StoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_error_display() {
        let err = StoreError::Conflict {
            field: Some("email".to_string()),
        };
        assert_eq!(err.to_string(), "Conflict on email");

        let err = StoreError::Conflict { field: None };
        assert_eq!(err.to_string(), "Conflict on unique constraint");

        assert_eq!(StoreError::NotFound.to_string(), "Record not found");
    }
}
