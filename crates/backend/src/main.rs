use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use axum::http::{header, Method};
use clap::Parser;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tracing_subscriber::EnvFilter;

use backend::auth::GoogleProvider;
use backend::config::Config;
use backend::store::{MemoryStore, OAuthStateStore, PgStore, UserStore};
use backend::{db, router, AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,tower_http=info")),
        )
        .init();

    let config = Config::parse();
    config.validate()?;

    let (users, states) = build_stores(config.database_url.as_deref())?;

    let provider = GoogleProvider::new(config.google_config()?)
        .context("Failed to build Google OAuth client")?;

    let state = AppState::new(&config, users, states, Arc::new(provider))?;
    let app = router(state).layer(build_cors_layer(config.cors_allowed_origins.as_deref()));

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    tracing::info!("Server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    axum::serve(listener, app).await?;

    Ok(())
}

fn build_stores(
    database_url: Option<&str>,
) -> anyhow::Result<(Arc<dyn UserStore>, Arc<dyn OAuthStateStore>)> {
    match database_url {
        Some(database_url) => {
            let pool = db::establish_connection_pool(database_url)
                .context("Failed to create database pool")?;
            let store = Arc::new(PgStore::new(pool));
            let users: Arc<dyn UserStore> = store.clone();
            let states: Arc<dyn OAuthStateStore> = store;
            Ok((users, states))
        }
        None => {
            tracing::warn!(
                "DATABASE_URL not set, using in-memory store (accounts are lost on restart)"
            );
            let store = Arc::new(MemoryStore::new());
            let users: Arc<dyn UserStore> = store.clone();
            let states: Arc<dyn OAuthStateStore> = store;
            Ok((users, states))
        }
    }
}

/// Build CORS layer from the configured origin list.
///
/// If no origins are configured, defaults to permissive CORS (for development only).
fn build_cors_layer(allowed_origins: Option<&str>) -> CorsLayer {
    match allowed_origins {
        Some(origins) => {
            let origins: Vec<_> = origins
                .split(',')
                .filter_map(|s| s.trim().parse().ok())
                .collect();

            if origins.is_empty() {
                tracing::warn!(
                    "CORS_ALLOWED_ORIGINS is set but empty, using permissive CORS (not recommended for production)"
                );
                CorsLayer::permissive()
            } else {
                tracing::info!("CORS configured for origins: {:?}", origins);
                CorsLayer::new()
                    .allow_origin(AllowOrigin::list(origins))
                    .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
                    .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
                    .allow_credentials(true)
            }
        }
        None => {
            tracing::warn!(
                "CORS_ALLOWED_ORIGINS not set, using permissive CORS (not recommended for production)"
            );
            CorsLayer::permissive()
        }
    }
}
