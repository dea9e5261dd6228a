//! Auth-related types and configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

// Re-export shared types for convenience
pub use shared_types::{
    AuthUrlResponse, LoginRequest, ProfileResponse, RegisterRequest, Role, TokenResponse,
    UserResponse,
};

/// Access token claims
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessClaims {
    /// Subject (user id)
    pub sub: Uuid,
    pub email: String,
    pub role: Role,
    /// Issued at timestamp
    pub iat: i64,
    /// Expiration timestamp
    pub exp: i64,
}

/// Refresh token claims
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefreshClaims {
    pub sub: Uuid,
    /// Unique per issued token
    pub jti: Uuid,
    pub iat: i64,
    pub exp: i64,
}

/// Validated user from an access token, injected into request extensions
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthUser {
    pub id: Uuid,
    pub email: String,
    pub role: Role,
}

impl From<AccessClaims> for AuthUser {
    fn from(claims: AccessClaims) -> Self {
        AuthUser {
            id: claims.sub,
            email: claims.email,
            role: claims.role,
        }
    }
}

/// Token signing configuration
#[derive(Clone)]
pub struct TokenConfig {
    pub jwt_secret: String,
    pub access_token_ttl: Duration,
    pub refresh_token_ttl: Duration,
}

/// Google OAuth client configuration
#[derive(Clone)]
pub struct GoogleConfig {
    pub client_id: String,
    pub client_secret: String,
    pub redirect_uri: String,
    /// How long an issued `state` stays redeemable
    pub state_ttl: chrono::Duration,
    /// Upper bound on each call to Google
    pub request_timeout: Duration,
}
