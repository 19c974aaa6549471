//! Authentication and authorization module
//!
//! - Token issuance and validation (HS256 JWT)
//! - Password hashing with Argon2, bcrypt verification for older hashes
//! - Refresh token persistence
//! - Authentication and admin authorization gates
//! - Login, refresh and logout service

pub mod jwt;
pub mod middleware;
pub mod password;
pub mod refresh;
pub mod service;

pub use jwt::{Claims, JwtConfig, JwtError};
pub use middleware::{auth_middleware, require_admin, AuthError, AuthenticatedUser};
pub use password::{hash_password, verify_password, PasswordConfig, PasswordError};
pub use refresh::{RefreshTokenError, RefreshTokenManager};
pub use service::{AuthService, LoginRequest, LogoutRequest, RefreshRequest, TokenResponse};
