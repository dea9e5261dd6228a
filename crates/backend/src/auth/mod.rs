//! Authentication module for JWT-based auth with local and Google login.
//!
//! This module provides:
//! - Argon2id password hashing
//! - JWT access/refresh token creation and access-token validation
//! - Email/password registration and login
//! - Google OAuth flow with single-use state
//! - `require_auth` middleware for protecting routes

pub mod google;
mod handlers;
pub mod jwt;
mod middleware;
pub mod password;
pub mod service;
pub mod types;

pub use google::{GoogleAuthService, GoogleProfile, GoogleProvider, OAuthProvider, ProviderError};
pub use handlers::{google_callback, google_login, login, profile, register};
pub use jwt::{TokenError, TokenIssuer};
pub use middleware::{extract_token_from_header, require_auth, OAUTH_STATE_COOKIE};
pub use service::AuthService;
