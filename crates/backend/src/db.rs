use chrono::{DateTime, Utc};
use diesel::prelude::*;
use diesel_async::{
    pooled_connection::{
        deadpool::{Object, Pool, PoolError},
        AsyncDieselConnectionManager, ManagerConfig,
    },
    AsyncPgConnection, RunQueryDsl,
};
use uuid::Uuid;

use crate::models::{NewUserRow, UserRow};

pub type DbPool = Pool<AsyncPgConnection>;
pub type DbConn = Object<AsyncPgConnection>;

async fn establish_tls_connection(config: String) -> diesel::ConnectionResult<AsyncPgConnection> {
    // Set up rustls TLS configuration
    let root_store =
        rustls::RootCertStore::from_iter(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
    let tls_config = rustls::ClientConfig::builder()
        .with_root_certificates(root_store)
        .with_no_client_auth();
    let tls = tokio_postgres_rustls::MakeRustlsConnect::new(tls_config);

    // Parse the connection string and connect with TLS
    let (client, connection) = tokio_postgres::connect(&config, tls)
        .await
        .map_err(|e| diesel::ConnectionError::BadConnection(e.to_string()))?;

    // Spawn the connection task
    tokio::spawn(async move {
        if let Err(e) = connection.await {
            tracing::error!("Connection error: {}", e);
        }
    });

    // Build the async connection from the tokio-postgres client
    AsyncPgConnection::try_from(client).await
}

/// Build the connection pool. Connections use TLS unless the URL asks for
/// `sslmode=disable` (local development databases).
pub fn establish_connection_pool(database_url: &str) -> anyhow::Result<DbPool> {
    let config = if database_url.contains("sslmode=disable") {
        tracing::warn!("Database TLS disabled by connection string");
        AsyncDieselConnectionManager::<AsyncPgConnection>::new(database_url)
    } else {
        let mut manager_config = ManagerConfig::default();
        manager_config.custom_setup =
            Box::new(|url| Box::pin(establish_tls_connection(url.to_string())));
        AsyncDieselConnectionManager::<AsyncPgConnection>::new_with_config(
            database_url,
            manager_config,
        )
    };

    let pool = Pool::builder(config).build()?;

    Ok(pool)
}

pub async fn get_conn(pool: &DbPool) -> Result<DbConn, PoolError> {
    pool.get().await
}

// User database operations
pub mod users {
    use super::*;

    pub async fn get_by_email(
        conn: &mut AsyncPgConnection,
        email_addr: &str,
    ) -> QueryResult<Option<UserRow>> {
        use crate::schema::users::dsl::*;

        users
            .filter(email.eq(email_addr))
            .select(UserRow::as_select())
            .first(conn)
            .await
            .optional()
    }

    pub async fn get_by_google_id(
        conn: &mut AsyncPgConnection,
        external_id: &str,
    ) -> QueryResult<Option<UserRow>> {
        use crate::schema::users::dsl::*;

        users
            .filter(google_id.eq(external_id))
            .select(UserRow::as_select())
            .first(conn)
            .await
            .optional()
    }

    pub async fn create(
        conn: &mut AsyncPgConnection,
        new_user: NewUserRow<'_>,
    ) -> QueryResult<UserRow> {
        use crate::schema::users::dsl::*;

        diesel::insert_into(users)
            .values(&new_user)
            .returning(UserRow::as_returning())
            .get_result(conn)
            .await
    }

    pub async fn record_login(
        conn: &mut AsyncPgConnection,
        user_id: Uuid,
        token: &str,
        at: DateTime<Utc>,
    ) -> QueryResult<UserRow> {
        use crate::schema::users::dsl::*;

        diesel::update(users.filter(id.eq(user_id)))
            .set((
                refresh_token.eq(Some(token)),
                last_login_at.eq(Some(at)),
                updated_at.eq(Utc::now()),
            ))
            .returning(UserRow::as_returning())
            .get_result(conn)
            .await
    }
}

// OAuth state database operations
pub mod oauth_states {
    use super::*;

    pub async fn insert(
        conn: &mut AsyncPgConnection,
        state_val: &str,
        expires: DateTime<Utc>,
    ) -> QueryResult<()> {
        use crate::schema::oauth_states::dsl::*;

        diesel::insert_into(oauth_states)
            .values((state.eq(state_val), expires_at.eq(expires)))
            .execute(conn)
            .await?;

        Ok(())
    }

    /// Delete expired rows, returning how many were removed.
    pub async fn prune_expired(
        conn: &mut AsyncPgConnection,
        now: DateTime<Utc>,
    ) -> QueryResult<usize> {
        use crate::schema::oauth_states::dsl::*;

        diesel::delete(oauth_states.filter(expires_at.le(now)))
            .execute(conn)
            .await
    }

    /// Delete the row if it is still valid; the returned count is 1 on success.
    pub async fn take(
        conn: &mut AsyncPgConnection,
        state_val: &str,
        now: DateTime<Utc>,
    ) -> QueryResult<usize> {
        use crate::schema::oauth_states::dsl::*;

        diesel::delete(
            oauth_states
                .filter(state.eq(state_val))
                .filter(expires_at.gt(now)),
        )
        .execute(conn)
        .await
    }
}
