//! Account and session models
//!
//! This module defines the records persisted by the credential store:
//! - User: account identity, profile fields and password hash
//! - RefreshTokenRecord: persisted remember-me tokens
//!
//! Role and status are stored as plain text columns. They are parsed into
//! closed Rust types here so that access decisions never compare strings.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Avatar assigned to accounts created without one
pub const DEFAULT_AVATAR: &str = "/images/avatar-default.jpg";

/// User role
///
/// The `role` column is an open string. Values other than `admin` and
/// `user` are kept verbatim in `Other` and are never privileged.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Role {
    Admin,
    User,
    Other(String),
}

impl Role {
    pub fn as_str(&self) -> &str {
        match self {
            Role::Admin => "admin",
            Role::User => "user",
            Role::Other(s) => s.as_str(),
        }
    }

    /// Only the exact `admin` value grants privileges
    pub fn is_admin(&self) -> bool {
        matches!(self, Role::Admin)
    }

    /// Parse a role supplied by an API caller, accepting only known roles
    pub fn parse_known(s: &str) -> Option<Self> {
        match s {
            "admin" => Some(Role::Admin),
            "user" => Some(Role::User),
            _ => None,
        }
    }
}

impl From<String> for Role {
    fn from(s: String) -> Self {
        match s.as_str() {
            "admin" => Role::Admin,
            "user" => Role::User,
            _ => Role::Other(s),
        }
    }
}

impl From<&str> for Role {
    fn from(s: &str) -> Self {
        Role::from(s.to_string())
    }
}

impl From<Role> for String {
    fn from(role: Role) -> Self {
        match role {
            Role::Other(s) => s,
            known => known.as_str().to_string(),
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Account status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UserStatus {
    Active,
    Disabled,
}

impl UserStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            UserStatus::Active => "active",
            UserStatus::Disabled => "disabled",
        }
    }

    /// Parse a status supplied by an API caller
    pub fn parse_known(s: &str) -> Option<Self> {
        match s {
            "active" => Some(UserStatus::Active),
            "disabled" => Some(UserStatus::Disabled),
            _ => None,
        }
    }

    /// Read a stored status. Anything but `active` is disabled.
    pub fn from_column(s: &str) -> Self {
        Self::parse_known(s).unwrap_or(UserStatus::Disabled)
    }
}

impl std::fmt::Display for UserStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// User account record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    /// Primary key, assigned by the store
    pub id: i64,
    /// Login name (unique)
    pub username: String,
    /// Email address (unique)
    pub email: String,
    /// Display name
    pub name: String,
    /// Avatar reference (URL or path)
    pub avatar: String,
    pub role: Role,
    pub status: UserStatus,
    /// Password hash in PHC (Argon2) or bcrypt format.
    /// Never serialized.
    #[serde(skip_serializing, default)]
    pub password_hash: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    pub fn is_active(&self) -> bool {
        self.status == UserStatus::Active
    }
}

/// Fields required to insert a user
#[derive(Debug, Clone)]
pub struct NewUser {
    pub username: String,
    pub email: String,
    pub name: String,
    pub avatar: String,
    pub role: Role,
    pub password_hash: String,
}

impl NewUser {
    pub fn new(
        username: impl Into<String>,
        email: impl Into<String>,
        name: impl Into<String>,
        role: Role,
        password_hash: impl Into<String>,
    ) -> Self {
        Self {
            username: username.into(),
            email: email.into(),
            name: name.into(),
            avatar: DEFAULT_AVATAR.to_string(),
            role,
            password_hash: password_hash.into(),
        }
    }

    pub fn with_avatar(mut self, avatar: impl Into<String>) -> Self {
        self.avatar = avatar.into();
        self
    }
}

/// Partial update of a user. `None` leaves the column untouched.
#[derive(Debug, Clone, Default)]
pub struct UserChanges {
    pub email: Option<String>,
    pub name: Option<String>,
    pub role: Option<Role>,
    pub status: Option<UserStatus>,
    pub avatar: Option<String>,
}

impl UserChanges {
    pub fn status(status: UserStatus) -> Self {
        Self {
            status: Some(status),
            ..Default::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.email.is_none()
            && self.name.is_none()
            && self.role.is_none()
            && self.status.is_none()
            && self.avatar.is_none()
    }
}

/// Persisted refresh token row
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct RefreshTokenRecord {
    pub id: i64,
    /// Owning user
    pub user_id: i64,
    /// Token string exactly as handed to the client
    pub token: String,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

impl RefreshTokenRecord {
    /// A token is expired strictly after its expiry instant
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_role_conversion() {
        assert_eq!(Role::from("admin"), Role::Admin);
        assert_eq!(Role::from("user"), Role::User);
        assert_eq!(Role::from("Admin"), Role::Other("Admin".to_string()));
        assert_eq!(String::from(Role::Other("auditor".into())), "auditor");
        assert_eq!(Role::parse_known("editor"), None);
    }

    #[test]
    fn test_only_exact_admin_is_privileged() {
        assert!(Role::Admin.is_admin());
        assert!(!Role::User.is_admin());
        assert!(!Role::from("ADMIN").is_admin());
        assert!(!Role::from("admin ").is_admin());
    }

    #[test]
    fn test_role_serializes_as_plain_string() {
        let json = serde_json::to_string(&Role::Admin).unwrap();
        assert_eq!(json, "\"admin\"");

        let role: Role = serde_json::from_str("\"operator\"").unwrap();
        assert_eq!(role, Role::Other("operator".to_string()));
    }

    #[test]
    fn test_unknown_status_fails_closed() {
        assert_eq!(UserStatus::from_column("active"), UserStatus::Active);
        assert_eq!(UserStatus::from_column("disabled"), UserStatus::Disabled);
        assert_eq!(UserStatus::from_column("pending"), UserStatus::Disabled);
        assert_eq!(UserStatus::parse_known("pending"), None);
    }

    #[test]
    fn test_password_hash_not_serialized() {
        let now = Utc::now();
        let user = User {
            id: 1,
            username: "admin".to_string(),
            email: "admin@example.com".to_string(),
            name: "Administrator".to_string(),
            avatar: DEFAULT_AVATAR.to_string(),
            role: Role::Admin,
            status: UserStatus::Active,
            password_hash: "$argon2id$secret".to_string(),
            created_at: now,
            updated_at: now,
        };

        let json = serde_json::to_string(&user).unwrap();
        assert!(!json.contains("password_hash"));
        assert!(!json.contains("secret"));
    }

    #[test]
    fn test_refresh_token_expiry_boundary() {
        let now = Utc::now();
        let record = RefreshTokenRecord {
            id: 1,
            user_id: 1,
            token: "t".to_string(),
            expires_at: now,
            created_at: now - Duration::days(7),
        };

        assert!(!record.is_expired_at(now - Duration::seconds(1)));
        assert!(!record.is_expired_at(now));
        assert!(record.is_expired_at(now + Duration::seconds(1)));
    }

    #[test]
    fn test_user_changes_is_empty() {
        assert!(UserChanges::default().is_empty());
        assert!(!UserChanges::status(UserStatus::Disabled).is_empty());
    }
}
