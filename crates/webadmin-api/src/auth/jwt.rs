//! JWT token issuance and validation
//!
//! Access tokens carry the user's id, username and role and are validated
//! without any store lookup. Refresh tokens carry only `iat`, `exp` and a
//! random `jti`; they are opaque to the server, which looks them up by their
//! stored string instead of decoding them.
//!
//! Both kinds are HS256 over the same process secret.

use chrono::{DateTime, TimeDelta, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;
use webadmin_core::{AuthConfig, Role, User};

/// Access token claims
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Claims {
    pub user_id: i64,
    pub username: String,
    pub role: Role,
    /// Issued at (Unix seconds)
    pub iat: i64,
    /// Expiration (Unix seconds)
    pub exp: i64,
}

/// Refresh token claims
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefreshClaims {
    /// Random nonce so tokens minted in the same second differ
    pub jti: String,
    pub iat: i64,
    pub exp: i64,
}

/// JWT token generation and validation errors
#[derive(Debug, Error)]
pub enum JwtError {
    #[error("Failed to encode JWT: {0}")]
    EncodingError(#[source] jsonwebtoken::errors::Error),

    #[error("Invalid token format")]
    InvalidToken,

    #[error("Token has expired")]
    ExpiredToken,

    #[error("Invalid token signature")]
    InvalidSignature,

    #[error("Token lifetime of {0} seconds is out of range")]
    LifetimeOutOfRange(i64),
}

/// A freshly signed refresh token and its expiry
#[derive(Debug, Clone)]
pub struct IssuedRefreshToken {
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

/// Signing configuration, built once at startup
#[derive(Clone)]
pub struct JwtConfig {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    /// Access token lifetime in seconds
    pub access_ttl_secs: i64,
    /// Refresh token lifetime in seconds
    pub refresh_ttl_secs: i64,
}

impl std::fmt::Debug for JwtConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JwtConfig")
            .field("access_ttl_secs", &self.access_ttl_secs)
            .field("refresh_ttl_secs", &self.refresh_ttl_secs)
            .finish_non_exhaustive()
    }
}

impl Default for JwtConfig {
    fn default() -> Self {
        Self::from_auth_config(&AuthConfig::default())
    }
}

impl JwtConfig {
    pub fn new(secret: &str, access_ttl_secs: i64, refresh_ttl_secs: i64) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            access_ttl_secs,
            refresh_ttl_secs,
        }
    }

    pub fn from_auth_config(config: &AuthConfig) -> Self {
        Self::new(
            &config.jwt_secret,
            config.access_token_ttl_secs,
            config.refresh_token_ttl_secs,
        )
    }

    /// Sign an access token for `user`
    ///
    /// # Returns
    ///
    /// * `Ok(String)` - Encoded JWT
    /// * `Err(JwtError)` - Signing failed
    pub fn issue_access_token(&self, user: &User) -> Result<String, JwtError> {
        self.issue_access_token_at(user, Utc::now())
    }

    /// Sign an access token as if issued at `now`
    pub fn issue_access_token_at(&self, user: &User, now: DateTime<Utc>) -> Result<String, JwtError> {
        let iat = now.timestamp();
        let exp = iat
            .checked_add(self.access_ttl_secs)
            .ok_or(JwtError::LifetimeOutOfRange(self.access_ttl_secs))?;
        let claims = Claims {
            user_id: user.id,
            username: user.username.clone(),
            role: user.role.clone(),
            iat,
            exp,
        };

        self.sign(&claims)
    }

    /// Sign a refresh token
    pub fn issue_refresh_token(&self) -> Result<IssuedRefreshToken, JwtError> {
        let now = Utc::now();
        let expires_at = TimeDelta::try_seconds(self.refresh_ttl_secs)
            .and_then(|ttl| now.checked_add_signed(ttl))
            .ok_or(JwtError::LifetimeOutOfRange(self.refresh_ttl_secs))?;
        let claims = RefreshClaims {
            jti: Uuid::new_v4().to_string(),
            iat: now.timestamp(),
            exp: expires_at.timestamp(),
        };

        Ok(IssuedRefreshToken {
            token: self.sign(&claims)?,
            expires_at,
        })
    }

    /// Validate an access token against the current time
    pub fn validate(&self, token: &str) -> Result<Claims, JwtError> {
        self.validate_at(token, Utc::now().timestamp())
    }

    /// Validate an access token against `now` (Unix seconds)
    ///
    /// A token is still valid at `now == exp` and expired one second later.
    pub fn validate_at(&self, token: &str, now: i64) -> Result<Claims, JwtError> {
        // Expiry is checked below without leeway
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = false;
        validation.leeway = 0;
        validation.set_required_spec_claims(&["exp"]);

        let token_data = decode::<Claims>(token, &self.decoding_key, &validation).map_err(|e| {
            match e.kind() {
                jsonwebtoken::errors::ErrorKind::InvalidSignature => JwtError::InvalidSignature,
                _ => JwtError::InvalidToken,
            }
        })?;

        if now > token_data.claims.exp {
            return Err(JwtError::ExpiredToken);
        }

        Ok(token_data.claims)
    }

    fn sign<T: Serialize>(&self, claims: &T) -> Result<String, JwtError> {
        encode(&Header::new(Algorithm::HS256), claims, &self.encoding_key)
            .map_err(JwtError::EncodingError)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use webadmin_core::UserStatus;

    fn user(id: i64, username: &str, role: Role) -> User {
        let now = Utc::now();
        User {
            id,
            username: username.to_string(),
            email: format!("{username}@example.com"),
            name: username.to_string(),
            avatar: String::new(),
            role,
            status: UserStatus::Active,
            password_hash: String::new(),
            created_at: now,
            updated_at: now,
        }
    }

    fn config() -> JwtConfig {
        JwtConfig::new("test-secret", 86400, 604800)
    }

    #[test]
    fn test_issue_and_validate_token() {
        let config = config();
        let token = config
            .issue_access_token(&user(7, "admin", Role::Admin))
            .expect("Failed to generate token");

        let claims = config.validate(&token).expect("Failed to validate token");

        assert_eq!(claims.user_id, 7);
        assert_eq!(claims.username, "admin");
        assert_eq!(claims.role, Role::Admin);
        assert_eq!(claims.exp - claims.iat, 86400);
    }

    #[test]
    fn test_invalid_token() {
        let result = config().validate("invalid.token.here");
        assert!(matches!(result, Err(JwtError::InvalidToken)));

        let result = config().validate("");
        assert!(result.is_err());
    }

    #[test]
    fn test_wrong_secret() {
        let token = JwtConfig::new("secret1", 60, 60)
            .issue_access_token(&user(1, "u", Role::User))
            .unwrap();

        let result = JwtConfig::new("secret2", 60, 60).validate(&token);
        assert!(matches!(result, Err(JwtError::InvalidSignature)));
    }

    #[test]
    fn test_expiry_boundary_is_exact() {
        let config = JwtConfig::new("test-secret", 100, 60);
        let issued = Utc::now();
        let token = config
            .issue_access_token_at(&user(1, "u", Role::User), issued)
            .unwrap();
        let exp = issued.timestamp() + 100;

        assert!(config.validate_at(&token, exp - 1).is_ok());
        assert!(config.validate_at(&token, exp).is_ok());
        assert!(matches!(
            config.validate_at(&token, exp + 1),
            Err(JwtError::ExpiredToken)
        ));
    }

    #[test]
    fn test_other_algorithm_rejected() {
        let now = Utc::now().timestamp();
        let claims = Claims {
            user_id: 1,
            username: "admin".to_string(),
            role: Role::Admin,
            iat: now,
            exp: now + 60,
        };
        let token = encode(
            &Header::new(Algorithm::HS512),
            &claims,
            &EncodingKey::from_secret(b"test-secret"),
        )
        .unwrap();

        assert!(config().validate(&token).is_err());
    }

    #[test]
    fn test_refresh_tokens_are_unique() {
        let config = config();
        let first = config.issue_refresh_token().unwrap();
        let second = config.issue_refresh_token().unwrap();

        assert_ne!(first.token, second.token);
        let ttl = first.expires_at - Utc::now();
        assert!(ttl.num_seconds() > 604800 - 5);
    }

    #[test]
    fn test_oversized_lifetimes_are_errors() {
        let config = JwtConfig::new("test-secret", i64::MAX, i64::MAX);

        assert!(matches!(
            config.issue_access_token(&user(1, "u", Role::User)),
            Err(JwtError::LifetimeOutOfRange(i64::MAX))
        ));
        assert!(matches!(
            config.issue_refresh_token(),
            Err(JwtError::LifetimeOutOfRange(i64::MAX))
        ));
    }

    #[test]
    fn test_refresh_token_is_not_an_access_token() {
        let config = config();
        let refresh = config.issue_refresh_token().unwrap();
        assert!(config.validate(&refresh.token).is_err());
    }

    #[test]
    fn test_unknown_role_round_trips_unprivileged() {
        let config = config();
        let token = config
            .issue_access_token(&user(3, "ops", Role::from("operator")))
            .unwrap();
        let claims = config.validate(&token).unwrap();
        assert_eq!(claims.role, Role::Other("operator".to_string()));
        assert!(!claims.role.is_admin());
    }

    mod prop {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn issue_validate_preserves_identity(
                id in 1i64..i64::MAX / 2,
                username in "[a-z][a-z0-9_]{0,15}",
                role in prop_oneof![
                    Just("admin".to_string()),
                    Just("user".to_string()),
                    "[a-z]{1,10}",
                ],
            ) {
                let config = JwtConfig::new("prop-secret", 3600, 3600);
                let role = Role::from(role);
                let token = config.issue_access_token(&user(id, &username, role.clone())).unwrap();
                let claims = config.validate(&token).unwrap();

                prop_assert_eq!(claims.user_id, id);
                prop_assert_eq!(claims.username, username);
                prop_assert_eq!(claims.role, role);
            }
        }
    }
}
