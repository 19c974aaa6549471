//! Refresh token persistence
//!
//! Refresh tokens are looked up by their exact string, never decoded.
//! Expired rows are removed lazily, on the first lookup after expiry.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use thiserror::Error;
use webadmin_core::{CredentialStore, StoreError};

#[derive(Debug, Error)]
pub enum RefreshTokenError {
    /// Unknown, revoked or expired
    #[error("Refresh token not found")]
    NotFound,

    #[error("Refresh token store error: {0}")]
    Store(#[from] StoreError),
}

/// Saves, validates and revokes refresh tokens
#[derive(Clone)]
pub struct RefreshTokenManager {
    store: Arc<dyn CredentialStore>,
}

impl RefreshTokenManager {
    pub fn new(store: Arc<dyn CredentialStore>) -> Self {
        Self { store }
    }

    pub async fn save(
        &self,
        user_id: i64,
        token: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<(), RefreshTokenError> {
        self.store
            .insert_refresh_token(user_id, token, expires_at)
            .await?;
        Ok(())
    }

    /// Resolve a refresh token to its owning user id
    pub async fn validate(&self, token: &str) -> Result<i64, RefreshTokenError> {
        self.validate_at(token, Utc::now()).await
    }

    /// Resolve `token` as of `now`, deleting it if it expired before `now`
    pub async fn validate_at(
        &self,
        token: &str,
        now: DateTime<Utc>,
    ) -> Result<i64, RefreshTokenError> {
        let record = self
            .store
            .find_refresh_token(token)
            .await?
            .ok_or(RefreshTokenError::NotFound)?;

        if record.is_expired_at(now) {
            // Another request may have removed it already
            if let Err(e) = self.store.delete_refresh_token(token).await {
                tracing::warn!(error = %e, "Failed to remove expired refresh token");
            }
            return Err(RefreshTokenError::NotFound);
        }

        Ok(record.user_id)
    }

    /// Revoke a token. Unknown tokens are not an error.
    pub async fn delete(&self, token: &str) -> Result<bool, RefreshTokenError> {
        let removed = self.store.delete_refresh_token(token).await?;
        Ok(removed > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use webadmin_core::{NewUser, Role, SqliteCredentialStore};

    async fn setup() -> (Arc<SqliteCredentialStore>, RefreshTokenManager, i64) {
        let store = Arc::new(SqliteCredentialStore::connect_in_memory().await.unwrap());
        let user = store
            .create_user(&NewUser::new("u", "u@example.com", "U", Role::User, "h"))
            .await
            .unwrap();
        let manager = RefreshTokenManager::new(store.clone());
        (store, manager, user.id)
    }

    #[tokio::test]
    async fn test_save_and_validate() {
        let (_, manager, user_id) = setup().await;
        manager
            .save(user_id, "token-a", Utc::now() + Duration::days(7))
            .await
            .unwrap();

        assert_eq!(manager.validate("token-a").await.unwrap(), user_id);
        // Validation does not consume the token
        assert_eq!(manager.validate("token-a").await.unwrap(), user_id);
    }

    #[tokio::test]
    async fn test_unknown_token() {
        let (_, manager, _) = setup().await;
        assert!(matches!(
            manager.validate("missing").await,
            Err(RefreshTokenError::NotFound)
        ));
    }

    #[tokio::test]
    async fn test_expired_token_removed() {
        let (store, manager, user_id) = setup().await;
        let expires_at = Utc::now() + Duration::hours(1);
        manager.save(user_id, "token-b", expires_at).await.unwrap();

        // Valid exactly at expiry
        assert!(manager.validate_at("token-b", expires_at).await.is_ok());

        let later = expires_at + Duration::seconds(1);
        assert!(matches!(
            manager.validate_at("token-b", later).await,
            Err(RefreshTokenError::NotFound)
        ));
        assert!(store.find_refresh_token("token-b").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_delete_is_idempotent() {
        let (_, manager, user_id) = setup().await;
        manager
            .save(user_id, "token-c", Utc::now() + Duration::days(1))
            .await
            .unwrap();

        assert!(manager.delete("token-c").await.unwrap());
        assert!(!manager.delete("token-c").await.unwrap());
        assert!(!manager.delete("never-issued").await.unwrap());
        assert!(manager.validate("token-c").await.is_err());
    }
}
