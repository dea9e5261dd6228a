//! Authentication API: local accounts, Google login, and JWT sessions.

use std::sync::Arc;

use axum::{
    http::StatusCode,
    middleware,
    routing::{get, post},
    Router,
};
use tower_http::{catch_panic::CatchPanicLayer, trace::TraceLayer};

pub mod auth;
pub mod config;
pub mod db;
pub mod error;
pub mod models;
mod schema;
pub mod store;

use auth::{AuthService, GoogleAuthService, OAuthProvider, TokenIssuer};
use config::Config;
use store::{OAuthStateStore, UserStore};

/// Shared handler state.
#[derive(Clone)]
pub struct AppState {
    pub auth: Arc<AuthService>,
    pub google: Arc<GoogleAuthService>,
    pub tokens: TokenIssuer,
    pub secure_cookies: bool,
}

impl AppState {
    pub fn new(
        config: &Config,
        users: Arc<dyn UserStore>,
        states: Arc<dyn OAuthStateStore>,
        provider: Arc<dyn OAuthProvider>,
    ) -> anyhow::Result<Self> {
        let tokens = TokenIssuer::new(config.token_config());
        let google_config = config.google_config()?;

        Ok(Self::from_parts(
            tokens,
            users,
            states,
            provider,
            google_config.state_ttl,
            config.secure_cookies,
        ))
    }

    fn from_parts(
        tokens: TokenIssuer,
        users: Arc<dyn UserStore>,
        states: Arc<dyn OAuthStateStore>,
        provider: Arc<dyn OAuthProvider>,
        state_ttl: chrono::Duration,
        secure_cookies: bool,
    ) -> Self {
        let auth = AuthService::new(users.clone(), tokens.clone());
        let google = GoogleAuthService::new(provider, users, states, tokens.clone(), state_ttl);

        AppState {
            auth: Arc::new(auth),
            google: Arc::new(google),
            tokens,
            secure_cookies,
        }
    }
}

/// All routes. CORS is left to the binary.
pub fn router(state: AppState) -> Router {
    let protected = Router::new()
        .route("/profile", get(auth::profile))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            auth::require_auth,
        ));

    Router::new()
        .route("/health", get(health_check))
        .route("/auth/register", post(auth::register))
        .route("/auth/login", post(auth::login))
        .route("/auth/google/login", get(auth::google_login))
        .route("/auth/google/callback", get(auth::google_callback))
        .merge(protected)
        .layer(CatchPanicLayer::new())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health_check() -> StatusCode {
    StatusCode::OK
}
