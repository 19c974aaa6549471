//! Security audit logging for authentication events
//!
//! Events are emitted through `tracing` with the `audit` target so they can
//! be filtered (`RUST_LOG=audit=info`) and routed apart from application
//! logs. Each record carries the serialized event plus a few flat fields
//! for log aggregators that do not parse nested JSON.
//!
//! Author: hephaex@gmail.com

use axum::http::{header, HeaderMap};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

/// Client details taken from request headers
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AuditContext {
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
}

impl AuditContext {
    pub fn from_headers(headers: &HeaderMap) -> Self {
        Self {
            ip_address: extract_ip_address(headers),
            user_agent: extract_user_agent(headers),
        }
    }
}

/// Security audit events
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event_type", rename_all = "snake_case")]
pub enum AuditEvent {
    LoginSuccess {
        user_id: i64,
        username: String,
        remember_me: bool,
        #[serde(flatten)]
        context: AuditContext,
    },

    /// `reason` is for the log only; callers always see "Invalid credentials"
    LoginFailure {
        username: String,
        reason: String,
        #[serde(flatten)]
        context: AuditContext,
    },

    /// A refresh token was issued but could not be stored
    RefreshTokenNotPersisted {
        user_id: i64,
        reason: String,
    },

    TokenRefresh {
        user_id: i64,
        username: String,
        #[serde(flatten)]
        context: AuditContext,
    },

    TokenRefreshFailure {
        reason: String,
        #[serde(flatten)]
        context: AuditContext,
    },

    Logout {
        refresh_token_revoked: bool,
        #[serde(flatten)]
        context: AuditContext,
    },

    InvalidToken {
        reason: String,
        path: String,
        #[serde(flatten)]
        context: AuditContext,
    },

    AccessDenied {
        user_id: Option<i64>,
        username: Option<String>,
        path: String,
        #[serde(flatten)]
        context: AuditContext,
    },
}

impl AuditEvent {
    fn summary(&self) -> &'static str {
        match self {
            AuditEvent::LoginSuccess { .. } => "Login successful",
            AuditEvent::LoginFailure { .. } => "Login failed",
            AuditEvent::RefreshTokenNotPersisted { .. } => "Refresh token not persisted",
            AuditEvent::TokenRefresh { .. } => "Access token refreshed",
            AuditEvent::TokenRefreshFailure { .. } => "Token refresh rejected",
            AuditEvent::Logout { .. } => "User logout",
            AuditEvent::InvalidToken { .. } => "Invalid token",
            AuditEvent::AccessDenied { .. } => "Access denied",
        }
    }

    fn user_id(&self) -> Option<i64> {
        match self {
            AuditEvent::LoginSuccess { user_id, .. }
            | AuditEvent::RefreshTokenNotPersisted { user_id, .. }
            | AuditEvent::TokenRefresh { user_id, .. } => Some(*user_id),
            AuditEvent::AccessDenied { user_id, .. } => *user_id,
            _ => None,
        }
    }

    fn context(&self) -> Option<&AuditContext> {
        match self {
            AuditEvent::LoginSuccess { context, .. }
            | AuditEvent::LoginFailure { context, .. }
            | AuditEvent::TokenRefresh { context, .. }
            | AuditEvent::TokenRefreshFailure { context, .. }
            | AuditEvent::Logout { context, .. }
            | AuditEvent::InvalidToken { context, .. }
            | AuditEvent::AccessDenied { context, .. } => Some(context),
            AuditEvent::RefreshTokenNotPersisted { .. } => None,
        }
    }
}

/// Log a security audit event with structured fields
///
/// Persistence failures are logged at WARN, everything else at INFO.
pub fn audit_log(event: &AuditEvent) {
    let timestamp = Utc::now();
    let event_json = serde_json::to_string(event)
        .unwrap_or_else(|e| format!("{{\"error\":\"Failed to serialize audit event: {e}\"}}"));
    let ip_address = event.context().and_then(|c| c.ip_address.as_deref());
    let user_id = event.user_id();

    match event {
        AuditEvent::RefreshTokenNotPersisted { reason, .. } => {
            warn!(
                target: "audit",
                timestamp = %timestamp,
                event = %event_json,
                user_id = ?user_id,
                reason = %reason,
                "{}",
                event.summary()
            );
        }
        _ => {
            info!(
                target: "audit",
                timestamp = %timestamp,
                event = %event_json,
                user_id = ?user_id,
                ip_address = ?ip_address,
                "{}",
                event.summary()
            );
        }
    }
}

/// Extract the client IP from proxy headers
///
/// Takes the first hop of `X-Forwarded-For`, then `X-Real-IP`.
pub fn extract_ip_address(headers: &HeaderMap) -> Option<String> {
    let forwarded = headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|ip| !ip.is_empty());

    forwarded
        .or_else(|| {
            headers
                .get("x-real-ip")
                .and_then(|v| v.to_str().ok())
                .map(str::trim)
        })
        .map(str::to_string)
}

/// Extract the user agent header
pub fn extract_user_agent(headers: &HeaderMap) -> Option<String> {
    headers
        .get(header::USER_AGENT)
        .and_then(|ua| ua.to_str().ok())
        .map(|s| s.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_audit_event_serialization() {
        let event = AuditEvent::LoginFailure {
            username: "mallory".to_string(),
            reason: "unknown user".to_string(),
            context: AuditContext {
                ip_address: Some("192.168.1.1".to_string()),
                user_agent: None,
            },
        };

        let json: serde_json::Value = serde_json::to_value(&event).unwrap();
        assert_eq!(json["event_type"], "login_failure");
        assert_eq!(json["username"], "mallory");
        assert_eq!(json["ip_address"], "192.168.1.1");
    }

    #[test]
    fn test_audit_log_does_not_panic() {
        audit_log(&AuditEvent::LoginSuccess {
            user_id: 1,
            username: "admin".to_string(),
            remember_me: true,
            context: AuditContext::default(),
        });
        audit_log(&AuditEvent::RefreshTokenNotPersisted {
            user_id: 1,
            reason: "database is locked".to_string(),
        });
    }

    #[test]
    fn test_extract_ip_from_x_forwarded_for() {
        let mut headers = HeaderMap::new();
        headers.insert(
            "x-forwarded-for",
            "203.0.113.1, 198.51.100.1".parse().unwrap(),
        );

        assert_eq!(extract_ip_address(&headers), Some("203.0.113.1".to_string()));
    }

    #[test]
    fn test_extract_ip_from_x_real_ip() {
        let mut headers = HeaderMap::new();
        headers.insert("x-real-ip", "203.0.113.7".parse().unwrap());

        assert_eq!(extract_ip_address(&headers), Some("203.0.113.7".to_string()));
    }

    #[test]
    fn test_context_from_headers() {
        let mut headers = HeaderMap::new();
        headers.insert(header::USER_AGENT, "curl/8.0".parse().unwrap());

        let context = AuditContext::from_headers(&headers);
        assert_eq!(context.ip_address, None);
        assert_eq!(context.user_agent, Some("curl/8.0".to_string()));
    }
}
