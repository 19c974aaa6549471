//! Webadmin Configuration Management
//!
//! Handles configuration from environment variables, config files,
//! and command-line arguments with sensible defaults for development.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Signing secret compiled into the binary, used when no runtime secret is set
pub const BUILD_JWT_SECRET: &str = match option_env!("WEBADMIN_JWT_SECRET") {
    Some(secret) => secret,
    None => "webadmin-development-secret-change-me",
};

/// Longest accepted token lifetime (ten years)
pub const MAX_TOKEN_TTL_SECS: i64 = 10 * 365 * 24 * 60 * 60;

/// Main application configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    /// Server configuration
    pub server: ServerConfig,

    /// Credential store connection
    pub database: DatabaseConfig,

    /// Token lifetimes, signing secret and bootstrap account
    pub auth: AuthConfig,

    /// Logging configuration
    pub logging: LoggingConfig,
}

impl AppConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();

        // Server
        if let Ok(host) = std::env::var("API_HOST") {
            config.server.host = host;
        }
        if let Some((key, port)) = env_first(&["API_PORT", "PORT"]) {
            config.server.port = parse_var(key, port)?;
        }
        if let Ok(verbose) = std::env::var("verbose") {
            config.server.verbose = verbose == "true";
        }

        // CORS origins from environment variable (comma-separated)
        if let Ok(origins) = std::env::var("CORS_ORIGINS") {
            config.server.cors_origins = origins
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect();
        }

        // SQLite
        if let Ok(url) = std::env::var("DATABASE_URL") {
            config.database.url = url;
        }

        // Tokens
        if let Ok(secret) = std::env::var("JWT_SECRET") {
            if !secret.is_empty() {
                config.auth.jwt_secret = secret;
            }
        }
        if let Ok(ttl) = std::env::var("JWT_ACCESS_EXPIRATION_SECS") {
            config.auth.access_token_ttl_secs = parse_var("JWT_ACCESS_EXPIRATION_SECS", ttl)?;
        }
        if let Ok(ttl) = std::env::var("JWT_REFRESH_EXPIRATION_SECS") {
            config.auth.refresh_token_ttl_secs = parse_var("JWT_REFRESH_EXPIRATION_SECS", ttl)?;
        }

        // Bootstrap admin
        if let Ok(username) = std::env::var("DEFAULT_ADMIN_USERNAME") {
            config.auth.default_admin_username = username;
        }
        if let Ok(password) = std::env::var("DEFAULT_ADMIN_PASSWORD") {
            config.auth.default_admin_password = password;
        }
        if let Ok(email) = std::env::var("DEFAULT_ADMIN_EMAIL") {
            config.auth.default_admin_email = email;
        }

        // Logging
        if let Ok(level) = std::env::var("LOG_LEVEL") {
            config.logging.level = level;
        }
        if let Ok(json) = std::env::var("LOG_JSON") {
            config.logging.json_format = matches!(json.as_str(), "1" | "true" | "yes");
        }

        config.validate()?;
        Ok(config)
    }

    /// Load from a TOML file
    pub fn from_file(path: impl Into<PathBuf>) -> Result<Self, ConfigError> {
        let path = path.into();
        let content = std::fs::read_to_string(&path).map_err(|e| ConfigError::FileReadError {
            path: path.clone(),
            source: e,
        })?;

        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path,
            message: e.to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Merge with environment variables (env takes precedence)
    pub fn with_env_override(self) -> Result<Self, ConfigError> {
        let env_config = Self::from_env()?;
        self.merge_env(env_config, |key| std::env::var(key).is_ok_and(|v| !v.is_empty()))
    }

    /// Apply values loaded from the environment on top of `self`
    ///
    /// `is_set` reports whether a variable was present, for values whose
    /// default cannot be told apart from an explicit setting.
    fn merge_env(
        mut self,
        env_config: Self,
        is_set: impl Fn(&str) -> bool,
    ) -> Result<Self, ConfigError> {
        let server_defaults = ServerConfig::default();
        let auth_defaults = AuthConfig::default();

        // Only override if env values differ from defaults
        if env_config.server.host != server_defaults.host {
            self.server.host = env_config.server.host;
        }
        if env_config.server.port != server_defaults.port {
            self.server.port = env_config.server.port;
        }
        if env_config.server.verbose {
            self.server.verbose = true;
        }
        if !env_config.server.cors_origins.is_empty() {
            self.server.cors_origins = env_config.server.cors_origins;
        }
        if env_config.database.url != DatabaseConfig::default().url {
            self.database.url = env_config.database.url;
        }
        if env_config.auth.access_token_ttl_secs != auth_defaults.access_token_ttl_secs {
            self.auth.access_token_ttl_secs = env_config.auth.access_token_ttl_secs;
        }
        if env_config.auth.refresh_token_ttl_secs != auth_defaults.refresh_token_ttl_secs {
            self.auth.refresh_token_ttl_secs = env_config.auth.refresh_token_ttl_secs;
        }
        if env_config.logging.level != LoggingConfig::default().level {
            self.logging.level = env_config.logging.level;
        }
        if env_config.logging.json_format {
            self.logging.json_format = true;
        }

        // Secrets and the bootstrap account always follow the environment
        if is_set("JWT_SECRET") {
            self.auth.jwt_secret = env_config.auth.jwt_secret;
        }
        if is_set("DEFAULT_ADMIN_USERNAME") {
            self.auth.default_admin_username = env_config.auth.default_admin_username;
        }
        if is_set("DEFAULT_ADMIN_PASSWORD") {
            self.auth.default_admin_password = env_config.auth.default_admin_password;
        }
        if is_set("DEFAULT_ADMIN_EMAIL") {
            self.auth.default_admin_email = env_config.auth.default_admin_email;
        }

        self.validate()?;
        Ok(self)
    }

    /// Reject values that would make the service unusable
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.auth.jwt_secret.is_empty() {
            return Err(ConfigError::MissingRequired("auth.jwt_secret".to_string()));
        }
        for (key, ttl) in [
            ("auth.access_token_ttl_secs", self.auth.access_token_ttl_secs),
            ("auth.refresh_token_ttl_secs", self.auth.refresh_token_ttl_secs),
        ] {
            if !(1..=MAX_TOKEN_TTL_SECS).contains(&ttl) {
                return Err(ConfigError::InvalidValue {
                    key: key.to_string(),
                    value: ttl.to_string(),
                });
            }
        }
        if self.database.max_connections == 0 {
            return Err(ConfigError::InvalidValue {
                key: "database.max_connections".to_string(),
                value: "0".to_string(),
            });
        }
        Ok(())
    }
}

fn env_first(keys: &[&'static str]) -> Option<(&'static str, String)> {
    keys.iter()
        .find_map(|key| std::env::var(key).ok().map(|value| (*key, value)))
}

fn parse_var<T: std::str::FromStr>(key: &str, value: String) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::InvalidValue {
        key: key.to_string(),
        value,
    })
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Host to bind to
    pub host: String,

    /// Port to listen on
    pub port: u16,

    /// Allowed origins for CORS
    pub cors_origins: Vec<String>,

    /// Log every request and response
    pub verbose: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            // Empty by default - set via CORS_ORIGINS env var
            cors_origins: vec![],
            verbose: false,
        }
    }
}

/// Database connection configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// SQLite connection URL (`sqlite://path` or `sqlite::memory:`)
    pub url: String,

    /// Connection pool size
    pub max_connections: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "sqlite://webadmin.db".to_string(),
            max_connections: 5,
        }
    }
}

/// Authentication configuration
#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    /// HS256 signing secret shared by access and refresh tokens
    pub jwt_secret: String,

    /// Access token lifetime in seconds
    pub access_token_ttl_secs: i64,

    /// Refresh token lifetime in seconds
    pub refresh_token_ttl_secs: i64,

    /// Account created when the users table is empty
    pub default_admin_username: String,
    pub default_admin_password: String,
    pub default_admin_email: String,
    pub default_admin_name: String,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            jwt_secret: BUILD_JWT_SECRET.to_string(),
            access_token_ttl_secs: 24 * 60 * 60,
            refresh_token_ttl_secs: 7 * 24 * 60 * 60,
            default_admin_username: "admin".to_string(),
            default_admin_password: "adminpwd".to_string(),
            default_admin_email: "admin@webadmin.local".to_string(),
            default_admin_name: "Administrator".to_string(),
        }
    }
}

// Keep secrets out of debug output
impl std::fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthConfig")
            .field("jwt_secret", &"<redacted>")
            .field("access_token_ttl_secs", &self.access_token_ttl_secs)
            .field("refresh_token_ttl_secs", &self.refresh_token_ttl_secs)
            .field("default_admin_username", &self.default_admin_username)
            .field("default_admin_password", &"<redacted>")
            .field("default_admin_email", &self.default_admin_email)
            .field("default_admin_name", &self.default_admin_name)
            .finish()
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,

    /// JSON format for logs
    pub json_format: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json_format: false,
        }
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    FileReadError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config file {path}: {message}")]
    ParseError { path: PathBuf, message: String },

    #[error("Invalid value for {key}: {value}")]
    InvalidValue { key: String, value: String },

    #[error("Missing required configuration: {0}")]
    MissingRequired(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.auth.access_token_ttl_secs, 86400);
        assert_eq!(config.auth.refresh_token_ttl_secs, 604800);
        assert_eq!(config.auth.default_admin_username, "admin");
        assert!(!config.auth.jwt_secret.is_empty());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config: AppConfig = toml::from_str(
            r#"
            [server]
            port = 9000

            [auth]
            jwt_secret = "from-file"
            "#,
        )
        .unwrap();

        assert_eq!(config.server.port, 9000);
        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.auth.jwt_secret, "from-file");
        assert_eq!(config.auth.access_token_ttl_secs, 86400);
        assert_eq!(config.database.url, "sqlite://webadmin.db");
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = AppConfig::default();
        config.auth.jwt_secret.clear();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::MissingRequired(_))
        ));

        let mut config = AppConfig::default();
        config.auth.access_token_ttl_secs = 0;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidValue { .. })
        ));
    }

    #[test]
    fn test_validate_bounds_token_lifetimes() {
        let mut config = AppConfig::default();
        config.auth.access_token_ttl_secs = MAX_TOKEN_TTL_SECS;
        assert!(config.validate().is_ok());

        config.auth.access_token_ttl_secs = MAX_TOKEN_TTL_SECS + 1;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidValue { ref key, .. }) if key == "auth.access_token_ttl_secs"
        ));

        let mut config = AppConfig::default();
        config.auth.refresh_token_ttl_secs = i64::MAX;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidValue { ref key, .. }) if key == "auth.refresh_token_ttl_secs"
        ));
    }

    #[test]
    fn test_env_override_applies_bootstrap_account() {
        let file = AppConfig::default();
        let mut env = AppConfig::default();
        env.auth.default_admin_username = "root".to_string();
        env.auth.default_admin_email = "root@example.com".to_string();
        env.auth.default_admin_password = "from-env".to_string();

        let set = ["DEFAULT_ADMIN_USERNAME", "DEFAULT_ADMIN_EMAIL", "DEFAULT_ADMIN_PASSWORD"];
        let merged = file.merge_env(env, |key| set.contains(&key)).unwrap();

        assert_eq!(merged.auth.default_admin_username, "root");
        assert_eq!(merged.auth.default_admin_email, "root@example.com");
        assert_eq!(merged.auth.default_admin_password, "from-env");
    }

    #[test]
    fn test_env_override_keeps_file_values_when_unset() {
        let mut file = AppConfig::default();
        file.auth.default_admin_username = "owner".to_string();
        file.auth.jwt_secret = "from-file".to_string();

        let mut env = AppConfig::default();
        env.auth.default_admin_username = "ignored".to_string();

        let merged = file.merge_env(env, |_| false).unwrap();
        assert_eq!(merged.auth.default_admin_username, "owner");
        assert_eq!(merged.auth.jwt_secret, "from-file");
    }

    #[test]
    fn test_debug_redacts_secrets() {
        let config = AuthConfig {
            jwt_secret: "super-secret-value".to_string(),
            ..Default::default()
        };
        let debug = format!("{:?}", config);
        assert!(!debug.contains("super-secret-value"));
        assert!(!debug.contains("adminpwd"));
    }

    #[test]
    fn test_parse_var_reports_key() {
        let err = parse_var::<u16>("API_PORT", "not-a-port".to_string()).unwrap_err();
        assert_eq!(err.to_string(), "Invalid value for API_PORT: not-a-port");
    }
}
