//! JWT token creation and validation.

use chrono::{DateTime, Utc};
use jsonwebtoken::{
    decode, encode, errors::ErrorKind, Algorithm, DecodingKey, EncodingKey, Header, Validation,
};
use shared_types::{TokenResponse, TOKEN_TYPE_BEARER};
use thiserror::Error;
use uuid::Uuid;

use super::types::{AccessClaims, RefreshClaims, TokenConfig};
use crate::models::User;

#[derive(Debug, Error)]
pub enum TokenError {
    #[error("token expired")]
    Expired,

    #[error("invalid token: {0}")]
    Invalid(#[source] jsonwebtoken::errors::Error),

    #[error("failed to sign token: {0}")]
    Signing(#[source] jsonwebtoken::errors::Error),
}

/// Signs and verifies HS256 tokens with one shared secret.
#[derive(Clone)]
pub struct TokenIssuer {
    config: TokenConfig,
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
}

impl TokenIssuer {
    pub fn new(config: TokenConfig) -> Self {
        let encoding_key = EncodingKey::from_secret(config.jwt_secret.as_bytes());
        let decoding_key = DecodingKey::from_secret(config.jwt_secret.as_bytes());
        Self {
            config,
            encoding_key,
            decoding_key,
        }
    }

    /// Lifetime of an access token in whole seconds.
    pub fn access_ttl_secs(&self) -> i64 {
        whole_secs(self.config.access_token_ttl)
    }

    fn refresh_ttl_secs(&self) -> i64 {
        whole_secs(self.config.refresh_token_ttl)
    }

    /// Create an access token for a user. Returns the token and its lifetime in seconds.
    pub fn issue_access(&self, user: &User) -> Result<(String, i64), TokenError> {
        self.issue_access_at(user, Utc::now())
    }

    pub fn issue_access_at(
        &self,
        user: &User,
        now: DateTime<Utc>,
    ) -> Result<(String, i64), TokenError> {
        let expires_in = self.access_ttl_secs();
        let claims = AccessClaims {
            sub: user.id,
            email: user.email.clone(),
            role: user.role,
            iat: now.timestamp(),
            exp: now.timestamp().saturating_add(expires_in),
        };

        let token = self.sign(&claims)?;
        Ok((token, expires_in))
    }

    /// Create a refresh token. Carries only the user id.
    pub fn issue_refresh(&self, user: &User) -> Result<String, TokenError> {
        self.issue_refresh_at(user, Utc::now())
    }

    pub fn issue_refresh_at(&self, user: &User, now: DateTime<Utc>) -> Result<String, TokenError> {
        let claims = RefreshClaims {
            sub: user.id,
            jti: Uuid::new_v4(),
            iat: now.timestamp(),
            exp: now.timestamp().saturating_add(self.refresh_ttl_secs()),
        };

        self.sign(&claims)
    }

    /// Access and refresh token for one login.
    pub fn issue_pair(&self, user: &User) -> Result<TokenResponse, TokenError> {
        let now = Utc::now();
        let (access_token, expires_in) = self.issue_access_at(user, now)?;
        let refresh_token = self.issue_refresh_at(user, now)?;

        Ok(TokenResponse {
            access_token,
            refresh_token,
            token_type: TOKEN_TYPE_BEARER.to_string(),
            expires_in,
        })
    }

    /// Validate an access token and return its claims.
    pub fn verify(&self, token: &str) -> Result<AccessClaims, TokenError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;
        validation.set_required_spec_claims(&["exp", "sub"]);

        decode::<AccessClaims>(token, &self.decoding_key, &validation)
            .map(|data| data.claims)
            .map_err(|e| {
                if matches!(e.kind(), ErrorKind::ExpiredSignature) {
                    TokenError::Expired
                } else {
                    TokenError::Invalid(e)
                }
            })
    }

    fn sign<T: serde::Serialize>(&self, claims: &T) -> Result<String, TokenError> {
        encode(&Header::new(Algorithm::HS256), claims, &self.encoding_key)
            .map_err(TokenError::Signing)
    }
}

/// Saturates instead of wrapping; `Config::validate` keeps real values far below.
fn whole_secs(ttl: std::time::Duration) -> i64 {
    i64::try_from(ttl.as_secs()).unwrap_or(i64::MAX)
}
