//! SQLite credential store
//!
//! Persists user accounts and issued refresh tokens using SQLx and SQLite.
//! Tables are created on connect when missing.

use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use sqlx::{FromRow, QueryBuilder, Sqlite};

use crate::models::{NewUser, RefreshTokenRecord, Role, User, UserChanges, UserStatus};
use crate::{Result, StoreError};

const SCHEMA: [&str; 3] = [
    r#"
    CREATE TABLE IF NOT EXISTS users (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        username TEXT UNIQUE NOT NULL,
        email TEXT UNIQUE NOT NULL,
        name TEXT NOT NULL,
        avatar TEXT NOT NULL DEFAULT '',
        role TEXT NOT NULL DEFAULT 'user',
        status TEXT NOT NULL DEFAULT 'active',
        password_hash TEXT NOT NULL,
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS refresh_tokens (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        user_id INTEGER NOT NULL REFERENCES users (id) ON DELETE CASCADE,
        token TEXT NOT NULL,
        expires_at TEXT NOT NULL,
        created_at TEXT NOT NULL
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_refresh_tokens_token ON refresh_tokens (token)",
];

const USER_COLUMNS: &str =
    "id, username, email, name, avatar, role, status, password_hash, created_at, updated_at";

/// Trait for credential store operations
#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// Look up a user by login name
    ///
    /// # Arguments
    /// * `username` - Login name
    /// * `active_only` - When true, disabled accounts are treated as absent
    async fn get_user_by_username(&self, username: &str, active_only: bool)
        -> Result<Option<User>>;

    /// Look up a user by primary key, regardless of status
    async fn get_user_by_id(&self, id: i64) -> Result<Option<User>>;

    /// Insert a user
    ///
    /// # Returns
    /// The stored user, or `StoreError::Conflict` when username or email is taken
    async fn create_user(&self, user: &NewUser) -> Result<User>;

    /// Apply a partial update and return the updated user
    async fn update_user(&self, id: i64, changes: &UserChanges) -> Result<User>;

    /// Delete a user and, through the foreign key, its refresh tokens
    async fn delete_user(&self, id: i64) -> Result<()>;

    /// List users newest first
    ///
    /// # Returns
    /// The requested page and the total number of users
    async fn list_users(&self, limit: i64, offset: i64) -> Result<(Vec<User>, i64)>;

    /// Number of stored users
    async fn count_users(&self) -> Result<i64>;

    /// Persist an issued refresh token
    async fn insert_refresh_token(
        &self,
        user_id: i64,
        token: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<()>;

    /// Find a refresh token row by its exact string
    async fn find_refresh_token(&self, token: &str) -> Result<Option<RefreshTokenRecord>>;

    /// Delete every row holding this token string
    ///
    /// # Returns
    /// Number of rows removed (zero is not an error)
    async fn delete_refresh_token(&self, token: &str) -> Result<u64>;

    /// Check that the store is reachable
    async fn ping(&self) -> Result<()>;
}

/// SQLite-backed credential store
#[derive(Clone)]
pub struct SqliteCredentialStore {
    pool: SqlitePool,
}

impl SqliteCredentialStore {
    /// Open (creating if missing) the database at `url` and bootstrap tables
    pub async fn connect(url: &str, max_connections: u32) -> Result<Self> {
        if url.contains(":memory:") {
            return Self::connect_in_memory().await;
        }

        let options = SqliteConnectOptions::from_str(url)
            .map_err(|e| StoreError::Database(format!("Invalid database URL: {e}")))?
            .create_if_missing(true)
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect_with(options)
            .await
            .map_err(|e| StoreError::Database(format!("SQLite connection failed: {e}")))?;

        let store = Self { pool };
        store.initialize().await?;
        tracing::info!(url = %url, "Credential store ready");
        Ok(store)
    }

    /// Single-connection in-memory database
    ///
    /// Every pooled connection to `sqlite::memory:` is its own database, so
    /// the pool is pinned to one connection that never expires.
    pub async fn connect_in_memory() -> Result<Self> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")
            .map_err(|e| StoreError::Database(format!("Invalid database URL: {e}")))?
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await
            .map_err(|e| StoreError::Database(format!("SQLite connection failed: {e}")))?;

        let store = Self { pool };
        store.initialize().await?;
        Ok(store)
    }

    /// Create from an existing pool. Tables are not created.
    pub fn from_pool(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Get the connection pool
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Create tables and indexes if missing
    pub async fn initialize(&self) -> Result<()> {
        for statement in SCHEMA {
            sqlx::query(statement)
                .execute(&self.pool)
                .await
                .map_err(|e| StoreError::Database(format!("Failed to create schema: {e}")))?;
        }
        Ok(())
    }

    /// Insert `admin` when the users table is empty
    ///
    /// # Returns
    /// `true` when the account was created
    pub async fn seed_default_admin(&self, admin: &NewUser) -> Result<bool> {
        if self.count_users().await? > 0 {
            return Ok(false);
        }

        let user = self.create_user(admin).await?;
        tracing::info!(user_id = user.id, username = %user.username, "Default admin account created");
        Ok(true)
    }
}

/// User row from database
#[derive(Debug, FromRow)]
struct UserRow {
    id: i64,
    username: String,
    email: String,
    name: String,
    avatar: String,
    role: String,
    status: String,
    password_hash: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<UserRow> for User {
    fn from(row: UserRow) -> Self {
        User {
            id: row.id,
            username: row.username,
            email: row.email,
            name: row.name,
            avatar: row.avatar,
            role: Role::from(row.role),
            status: UserStatus::from_column(&row.status),
            password_hash: row.password_hash,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

/// Map a write error, recognising UNIQUE violations
fn write_error(err: sqlx::Error, action: &str) -> StoreError {
    if let sqlx::Error::Database(db_err) = &err {
        if db_err.is_unique_violation() {
            return StoreError::Conflict {
                field: unique_violation_column(db_err.message()),
            };
        }
    }
    StoreError::Database(format!("Failed to {action}: {err}"))
}

/// Extract `email` from "UNIQUE constraint failed: users.email"
fn unique_violation_column(message: &str) -> Option<String> {
    let (_, columns) = message.split_once("UNIQUE constraint failed:")?;
    let first = columns.split(',').next()?.trim();
    let column = first.rsplit('.').next()?.trim();
    (!column.is_empty()).then(|| column.to_string())
}

#[async_trait]
impl CredentialStore for SqliteCredentialStore {
    async fn get_user_by_username(
        &self,
        username: &str,
        active_only: bool,
    ) -> Result<Option<User>> {
        let sql = if active_only {
            format!("SELECT {USER_COLUMNS} FROM users WHERE username = ? AND status = 'active'")
        } else {
            format!("SELECT {USER_COLUMNS} FROM users WHERE username = ?")
        };

        let row: Option<UserRow> = sqlx::query_as(&sql)
            .bind(username)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| StoreError::Database(format!("Failed to get user: {e}")))?;

        Ok(row.map(User::from))
    }

    async fn get_user_by_id(&self, id: i64) -> Result<Option<User>> {
        let row: Option<UserRow> =
            sqlx::query_as(&format!("SELECT {USER_COLUMNS} FROM users WHERE id = ?"))
                .bind(id)
                .fetch_optional(&self.pool)
                .await
                .map_err(|e| StoreError::Database(format!("Failed to get user: {e}")))?;

        Ok(row.map(User::from))
    }

    async fn create_user(&self, user: &NewUser) -> Result<User> {
        let now = Utc::now();
        let result = sqlx::query(
            r#"
            INSERT INTO users (username, email, name, avatar, role, status, password_hash, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&user.username)
        .bind(&user.email)
        .bind(&user.name)
        .bind(&user.avatar)
        .bind(user.role.as_str())
        .bind(UserStatus::Active.as_str())
        .bind(&user.password_hash)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(|e| write_error(e, "create user"))?;

        let id = result.last_insert_rowid();
        self.get_user_by_id(id).await?.ok_or(StoreError::NotFound)
    }

    async fn update_user(&self, id: i64, changes: &UserChanges) -> Result<User> {
        if changes.is_empty() {
            return self.get_user_by_id(id).await?.ok_or(StoreError::NotFound);
        }

        let mut builder = QueryBuilder::<Sqlite>::new("UPDATE users SET ");
        let mut set = builder.separated(", ");
        if let Some(email) = &changes.email {
            set.push("email = ").push_bind_unseparated(email.clone());
        }
        if let Some(name) = &changes.name {
            set.push("name = ").push_bind_unseparated(name.clone());
        }
        if let Some(role) = &changes.role {
            set.push("role = ").push_bind_unseparated(role.as_str().to_string());
        }
        if let Some(status) = changes.status {
            set.push("status = ").push_bind_unseparated(status.as_str());
        }
        if let Some(avatar) = &changes.avatar {
            set.push("avatar = ").push_bind_unseparated(avatar.clone());
        }
        set.push("updated_at = ").push_bind_unseparated(Utc::now());
        builder.push(" WHERE id = ").push_bind(id);

        let result = builder
            .build()
            .execute(&self.pool)
            .await
            .map_err(|e| write_error(e, "update user"))?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound);
        }

        self.get_user_by_id(id).await?.ok_or(StoreError::NotFound)
    }

    async fn delete_user(&self, id: i64) -> Result<()> {
        let result = sqlx::query("DELETE FROM users WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|e| StoreError::Database(format!("Failed to delete user: {e}")))?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }

    async fn list_users(&self, limit: i64, offset: i64) -> Result<(Vec<User>, i64)> {
        let total = self.count_users().await?;

        let rows: Vec<UserRow> = sqlx::query_as(&format!(
            "SELECT {USER_COLUMNS} FROM users ORDER BY created_at DESC, id DESC LIMIT ? OFFSET ?"
        ))
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| StoreError::Database(format!("Failed to list users: {e}")))?;

        Ok((rows.into_iter().map(User::from).collect(), total))
    }

    async fn count_users(&self) -> Result<i64> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM users")
            .fetch_one(&self.pool)
            .await
            .map_err(|e| StoreError::Database(format!("Failed to count users: {e}")))?;

        Ok(count)
    }

    async fn insert_refresh_token(
        &self,
        user_id: i64,
        token: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<()> {
        sqlx::query(
            "INSERT INTO refresh_tokens (user_id, token, expires_at, created_at) VALUES (?, ?, ?, ?)",
        )
        .bind(user_id)
        .bind(token)
        .bind(expires_at)
        .bind(Utc::now())
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::Database(format!("Failed to store refresh token: {e}")))?;

        Ok(())
    }

    async fn find_refresh_token(&self, token: &str) -> Result<Option<RefreshTokenRecord>> {
        sqlx::query_as(
            r#"
            SELECT id, user_id, token, expires_at, created_at
            FROM refresh_tokens
            WHERE token = ?
            ORDER BY id DESC
            LIMIT 1
            "#,
        )
        .bind(token)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| StoreError::Database(format!("Failed to get refresh token: {e}")))
    }

    async fn delete_refresh_token(&self, token: &str) -> Result<u64> {
        let result = sqlx::query("DELETE FROM refresh_tokens WHERE token = ?")
            .bind(token)
            .execute(&self.pool)
            .await
            .map_err(|e| StoreError::Database(format!("Failed to delete refresh token: {e}")))?;

        Ok(result.rows_affected())
    }

    async fn ping(&self) -> Result<()> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(|e| StoreError::Database(format!("Ping failed: {e}")))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    async fn store() -> SqliteCredentialStore {
        SqliteCredentialStore::connect_in_memory().await.unwrap()
    }

    fn new_user(username: &str, email: &str) -> NewUser {
        NewUser::new(username, email, "Test User", Role::User, "hash")
    }

    #[test]
    fn test_unique_violation_column() {
        assert_eq!(
            unique_violation_column("UNIQUE constraint failed: users.email"),
            Some("email".to_string())
        );
        assert_eq!(
            unique_violation_column("UNIQUE constraint failed: users.username"),
            Some("username".to_string())
        );
        assert_eq!(unique_violation_column("disk I/O error"), None);
    }

    #[tokio::test]
    async fn test_create_and_get_user() {
        let store = store().await;
        let created = store
            .create_user(&new_user("alice", "alice@example.com"))
            .await
            .unwrap();

        assert!(created.id > 0);
        assert_eq!(created.status, UserStatus::Active);
        assert_eq!(created.role, Role::User);

        let by_name = store
            .get_user_by_username("alice", true)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(by_name.id, created.id);
        assert_eq!(by_name.password_hash, "hash");

        let by_id = store.get_user_by_id(created.id).await.unwrap().unwrap();
        assert_eq!(by_id.email, "alice@example.com");
    }

    #[tokio::test]
    async fn test_duplicate_user_conflicts() {
        let store = store().await;
        store
            .create_user(&new_user("alice", "alice@example.com"))
            .await
            .unwrap();

        let err = store
            .create_user(&new_user("alice", "other@example.com"))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            StoreError::Conflict { field: Some(ref f) } if f == "username"
        ));

        let err = store
            .create_user(&new_user("bob", "alice@example.com"))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            StoreError::Conflict { field: Some(ref f) } if f == "email"
        ));
    }

    #[tokio::test]
    async fn test_active_only_lookup_hides_disabled_user() {
        let store = store().await;
        let user = store
            .create_user(&new_user("carol", "carol@example.com"))
            .await
            .unwrap();
        store
            .update_user(user.id, &UserChanges::status(UserStatus::Disabled))
            .await
            .unwrap();

        assert!(store
            .get_user_by_username("carol", true)
            .await
            .unwrap()
            .is_none());
        let found = store
            .get_user_by_username("carol", false)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(found.status, UserStatus::Disabled);
    }

    #[tokio::test]
    async fn test_update_user() {
        let store = store().await;
        let user = store
            .create_user(&new_user("dave", "dave@example.com"))
            .await
            .unwrap();

        let changes = UserChanges {
            name: Some("David".to_string()),
            role: Some(Role::Admin),
            ..Default::default()
        };
        let updated = store.update_user(user.id, &changes).await.unwrap();
        assert_eq!(updated.name, "David");
        assert_eq!(updated.role, Role::Admin);
        assert_eq!(updated.email, "dave@example.com");
        assert!(updated.updated_at >= user.updated_at);

        let err = store.update_user(9999, &changes).await.unwrap_err();
        assert!(matches!(err, StoreError::NotFound));

        let err = store
            .update_user(9999, &UserChanges::default())
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::NotFound));
    }

    #[tokio::test]
    async fn test_update_email_conflict() {
        let store = store().await;
        store
            .create_user(&new_user("erin", "erin@example.com"))
            .await
            .unwrap();
        let frank = store
            .create_user(&new_user("frank", "frank@example.com"))
            .await
            .unwrap();

        let changes = UserChanges {
            email: Some("erin@example.com".to_string()),
            ..Default::default()
        };
        let err = store.update_user(frank.id, &changes).await.unwrap_err();
        assert!(matches!(err, StoreError::Conflict { .. }));
    }

    #[tokio::test]
    async fn test_list_users_paginates() {
        let store = store().await;
        for i in 0..5 {
            store
                .create_user(&new_user(&format!("user{i}"), &format!("user{i}@example.com")))
                .await
                .unwrap();
        }

        let (page, total) = store.list_users(2, 0).await.unwrap();
        assert_eq!(total, 5);
        assert_eq!(page.len(), 2);
        assert_eq!(page[0].username, "user4");

        let (page, _) = store.list_users(10, 4).await.unwrap();
        assert_eq!(page.len(), 1);
        assert_eq!(page[0].username, "user0");
    }

    #[tokio::test]
    async fn test_delete_user_cascades_refresh_tokens() {
        let store = store().await;
        let user = store
            .create_user(&new_user("gina", "gina@example.com"))
            .await
            .unwrap();
        store
            .insert_refresh_token(user.id, "tok", Utc::now() + Duration::days(7))
            .await
            .unwrap();

        store.delete_user(user.id).await.unwrap();
        assert!(store.find_refresh_token("tok").await.unwrap().is_none());
        assert!(matches!(
            store.delete_user(user.id).await,
            Err(StoreError::NotFound)
        ));
    }

    #[tokio::test]
    async fn test_refresh_token_rows() {
        let store = store().await;
        let user = store
            .create_user(&new_user("hank", "hank@example.com"))
            .await
            .unwrap();
        let expires_at = Utc::now() + Duration::days(7);

        store
            .insert_refresh_token(user.id, "refresh-1", expires_at)
            .await
            .unwrap();

        let record = store.find_refresh_token("refresh-1").await.unwrap().unwrap();
        assert_eq!(record.user_id, user.id);
        assert_eq!(record.expires_at.timestamp(), expires_at.timestamp());

        assert_eq!(store.delete_refresh_token("refresh-1").await.unwrap(), 1);
        assert_eq!(store.delete_refresh_token("refresh-1").await.unwrap(), 0);
        assert!(store.find_refresh_token("refresh-1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_refresh_token_requires_existing_user() {
        let store = store().await;
        let result = store
            .insert_refresh_token(424242, "orphan", Utc::now() + Duration::days(1))
            .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_seed_default_admin_only_when_empty() {
        let store = store().await;
        let admin = NewUser::new("admin", "admin@example.com", "Administrator", Role::Admin, "h");

        assert!(store.seed_default_admin(&admin).await.unwrap());
        assert!(!store.seed_default_admin(&admin).await.unwrap());
        assert_eq!(store.count_users().await.unwrap(), 1);
        store.ping().await.unwrap();
    }
}
