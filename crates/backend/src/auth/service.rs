//! Email/password registration and login.

use std::sync::Arc;

use anyhow::Context;
use chrono::Utc;

use super::jwt::TokenIssuer;
use super::password::{hash_password, verify_against_dummy, verify_password};
use super::types::{LoginRequest, RegisterRequest, TokenResponse, UserResponse};
use crate::error::{ApiError, ApiResult};
use crate::models::{normalize_email, NewUser, User};
use crate::store::{StoreError, UserStore};

/// Issue a token pair for `user` and persist the new refresh token and login time.
///
/// Shared by the local and Google flows.
pub(crate) async fn start_session(
    store: &dyn UserStore,
    tokens: &TokenIssuer,
    user: &User,
) -> ApiResult<TokenResponse> {
    let pair = tokens
        .issue_pair(user)
        .context("Failed to create tokens")?;

    store
        .record_login(user.id, &pair.refresh_token, Utc::now())
        .await?;

    Ok(pair)
}

/// Local account workflow
pub struct AuthService {
    store: Arc<dyn UserStore>,
    tokens: TokenIssuer,
}

impl AuthService {
    pub fn new(store: Arc<dyn UserStore>, tokens: TokenIssuer) -> Self {
        Self { store, tokens }
    }

    /// Create an account with role `user`. Expects an already validated request.
    pub async fn register(&self, request: RegisterRequest) -> ApiResult<UserResponse> {
        let email = normalize_email(&request.email);

        if self.store.find_by_email(&email).await?.is_some() {
            tracing::info!("Registration rejected, email already registered: {}", email);
            return Err(already_exists());
        }

        let password = request.password;
        let password_hash = tokio::task::spawn_blocking(move || hash_password(&password))
            .await
            .context("Password hashing task failed")?
            .context("Failed to hash password")?;

        let user = self
            .store
            .create(NewUser::local(email, request.name, password_hash))
            .await
            .map_err(|e| match e {
                // Lost a race with a concurrent registration
                StoreError::Duplicate => already_exists(),
                other => other.into(),
            })?;

        tracing::info!("Registered user {} ({})", user.id, user.email);
        Ok(user.to_response())
    }

    /// Verify credentials and start a session. Unknown email and wrong
    /// password both yield [`ApiError::InvalidCredentials`].
    pub async fn login(&self, request: LoginRequest) -> ApiResult<TokenResponse> {
        let email = normalize_email(&request.email);
        let user = self.store.find_by_email(&email).await?;

        let stored_hash = user.as_ref().and_then(|u| u.password_hash.clone());
        let password = request.password;
        let verified = tokio::task::spawn_blocking(move || match stored_hash {
            Some(hash) => verify_password(&hash, &password),
            None => {
                verify_against_dummy(&password);
                false
            }
        })
        .await
        .context("Password verification task failed")?;

        let user = match user {
            Some(user) if verified => user,
            _ => {
                tracing::warn!("Failed login attempt for: {}", email);
                return Err(ApiError::InvalidCredentials);
            }
        };

        let pair = start_session(self.store.as_ref(), &self.tokens, &user).await?;

        tracing::info!("Successful login for: {}", user.email);
        Ok(pair)
    }
}

fn already_exists() -> ApiError {
    ApiError::Conflict("user already exists".to_string())
}
