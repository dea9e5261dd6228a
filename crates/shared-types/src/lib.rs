use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

pub mod validation;

pub use validation::{describe_errors, FieldOrder};
use validation::{validate_name, validate_password};

/// Token type reported alongside every issued token pair.
pub const TOKEN_TYPE_BEARER: &str = "Bearer";

/// Account role, stored as lowercase text.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    #[default]
    User,
    Admin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Admin => "admin",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownRole(pub String);

impl fmt::Display for UnknownRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown role: {}", self.0)
    }
}

impl std::error::Error for UnknownRole {}

impl FromStr for Role {
    type Err = UnknownRole;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user" => Ok(Role::User),
            "admin" => Ok(Role::Admin),
            other => Err(UnknownRole(other.to_string())),
        }
    }
}

// ============================================================================
// Auth API Types
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct RegisterRequest {
    #[validate(email(message = "email must be a valid email address"))]
    pub email: String,

    #[validate(custom = "validate_password")]
    pub password: String,

    #[validate(custom = "validate_name")]
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct LoginRequest {
    #[validate(email(message = "email must be a valid email address"))]
    pub email: String,

    #[validate(length(min = 1, message = "password is required"))]
    pub password: String,
}

impl FieldOrder for RegisterRequest {
    const FIELDS: &'static [&'static str] = &["email", "password", "name"];
}

impl FieldOrder for LoginRequest {
    const FIELDS: &'static [&'static str] = &["email", "password"];
}

/// Public projection of a user returned by registration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserResponse {
    pub email: String,
    pub name: String,
    pub role: Role,
}

/// Access/refresh token pair returned by every successful login.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub refresh_token: String,
    pub token_type: String,
    pub expires_in: i64,
}

/// Response for starting the Google login flow.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthUrlResponse {
    pub url: String,
}

/// Identity resolved from a verified access token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfileResponse {
    pub user_id: Uuid,
    pub email: String,
    pub role: Role,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_round_trips_through_text() {
        assert_eq!("user".parse::<Role>(), Ok(Role::User));
        assert_eq!("admin".parse::<Role>(), Ok(Role::Admin));
        assert_eq!(Role::Admin.to_string(), "admin");
        assert!("root".parse::<Role>().is_err());
    }

    #[test]
    fn test_role_serializes_lowercase() {
        let body = serde_json::to_value(UserResponse {
            email: "a@b.com".to_string(),
            name: "Ann Lee".to_string(),
            role: Role::default(),
        })
        .unwrap();

        assert_eq!(
            body,
            serde_json::json!({"email": "a@b.com", "name": "Ann Lee", "role": "user"})
        );
    }
}
