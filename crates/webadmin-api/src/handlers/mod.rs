//! API handlers
//!
//! Author: hephaex@gmail.com

pub mod auth;
pub mod health;
pub mod users;

use crate::error::AppError;
use axum::body::Bytes;
use serde::de::DeserializeOwned;

/// Decode a JSON request body
///
/// Any decoding failure becomes 400 "Invalid request body", keeping the
/// error shape uniform with the rest of the API.
pub(crate) fn parse_json<T: DeserializeOwned>(body: &Bytes) -> Result<T, AppError> {
    serde_json::from_slice(body).map_err(|e| {
        tracing::debug!(error = %e, "Rejected request body");
        AppError::bad_request("Invalid request body")
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::service::LoginRequest;

    #[test]
    fn test_parse_json() {
        let body = Bytes::from_static(br#"{"username":"admin","password":"x"}"#);
        let request: LoginRequest = parse_json(&body).unwrap();
        assert_eq!(request.username, "admin");

        let err = parse_json::<LoginRequest>(&Bytes::from_static(b"{not json")).unwrap_err();
        assert_eq!(err.to_string(), "Invalid request body");

        let err = parse_json::<LoginRequest>(&Bytes::new()).unwrap_err();
        assert_eq!(err.to_string(), "Invalid request body");
    }
}
