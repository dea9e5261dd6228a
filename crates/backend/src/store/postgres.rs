use async_trait::async_trait;
use chrono::{DateTime, Utc};
use diesel::result::{DatabaseErrorKind, Error as DieselError};
use diesel_async::pooled_connection::deadpool::PoolError;
use uuid::Uuid;

use super::{OAuthStateStore, StoreError, StoreResult, UserStore};
use crate::db::{self, DbConn, DbPool};
use crate::models::{NewUser, NewUserRow, User, UserRow};

impl From<DieselError> for StoreError {
    fn from(err: DieselError) -> Self {
        match err {
            DieselError::DatabaseError(DatabaseErrorKind::UniqueViolation, _) => {
                StoreError::Duplicate
            }
            DieselError::NotFound => StoreError::NotFound,
            other => StoreError::Other(other.into()),
        }
    }
}

impl From<PoolError> for StoreError {
    fn from(err: PoolError) -> Self {
        tracing::error!("Connection pool error: {:?}", err);
        StoreError::Unavailable(err.to_string())
    }
}

fn into_user(row: UserRow) -> StoreResult<User> {
    User::try_from(row).map_err(|e| StoreError::Other(e.into()))
}

/// Postgres-backed store over a deadpool connection pool.
#[derive(Clone)]
pub struct PgStore {
    pool: DbPool,
}

impl PgStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    async fn conn(&self) -> StoreResult<DbConn> {
        Ok(db::get_conn(&self.pool).await?)
    }
}

#[async_trait]
impl UserStore for PgStore {
    async fn find_by_email(&self, email: &str) -> StoreResult<Option<User>> {
        let mut conn = self.conn().await?;
        db::users::get_by_email(&mut conn, email)
            .await?
            .map(into_user)
            .transpose()
    }

    async fn find_by_google_id(&self, google_id: &str) -> StoreResult<Option<User>> {
        let mut conn = self.conn().await?;
        db::users::get_by_google_id(&mut conn, google_id)
            .await?
            .map(into_user)
            .transpose()
    }

    async fn create(&self, user: NewUser) -> StoreResult<User> {
        let mut conn = self.conn().await?;
        let row = db::users::create(&mut conn, NewUserRow::from(&user)).await?;
        into_user(row)
    }

    async fn record_login(
        &self,
        user_id: Uuid,
        refresh_token: &str,
        at: DateTime<Utc>,
    ) -> StoreResult<User> {
        let mut conn = self.conn().await?;
        let row = db::users::record_login(&mut conn, user_id, refresh_token, at).await?;
        into_user(row)
    }
}

#[async_trait]
impl OAuthStateStore for PgStore {
    async fn save(&self, state: &str, expires_at: DateTime<Utc>) -> StoreResult<()> {
        let mut conn = self.conn().await?;

        let pruned = db::oauth_states::prune_expired(&mut conn, Utc::now()).await?;
        if pruned > 0 {
            tracing::debug!("Pruned {} expired OAuth states", pruned);
        }

        db::oauth_states::insert(&mut conn, state, expires_at).await?;
        Ok(())
    }

    async fn consume(&self, state: &str, now: DateTime<Utc>) -> StoreResult<bool> {
        let mut conn = self.conn().await?;
        let removed = db::oauth_states::take(&mut conn, state, now).await?;
        Ok(removed == 1)
    }
}
