//! Credential and OAuth state persistence.
//!
//! The workflows only see the [`UserStore`] and [`OAuthStateStore`] traits.
//! [`PgStore`] backs them with Postgres; [`MemoryStore`] keeps everything in
//! process and is used by the tests and when no database is configured.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;
use uuid::Uuid;

use crate::models::{NewUser, User};

mod memory;
mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

#[derive(Debug, Error)]
pub enum StoreError {
    /// A unique column (email, Google id) already holds this value
    #[error("record already exists")]
    Duplicate,

    #[error("record not found")]
    NotFound,

    /// The backing store could not be reached
    #[error("store unavailable: {0}")]
    Unavailable(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Persistence for user accounts.
#[async_trait]
pub trait UserStore: Send + Sync {
    async fn find_by_email(&self, email: &str) -> StoreResult<Option<User>>;

    async fn find_by_google_id(&self, google_id: &str) -> StoreResult<Option<User>>;

    /// Insert a new account. Fails with [`StoreError::Duplicate`] when the
    /// email or Google id is taken.
    async fn create(&self, user: NewUser) -> StoreResult<User>;

    /// Replace the refresh token and stamp the last login time.
    async fn record_login(
        &self,
        user_id: Uuid,
        refresh_token: &str,
        at: DateTime<Utc>,
    ) -> StoreResult<User>;
}

/// Short-lived, single-use anti-forgery tokens for the OAuth redirect.
#[async_trait]
pub trait OAuthStateStore: Send + Sync {
    async fn save(&self, state: &str, expires_at: DateTime<Utc>) -> StoreResult<()>;

    /// Remove `state`, returning whether it existed and had not expired at `now`.
    async fn consume(&self, state: &str, now: DateTime<Utc>) -> StoreResult<bool>;
}
