//! Google OAuth login.
//!
//! [`GoogleAuthService::begin`] issues a single-use `state` and the consent
//! URL. [`GoogleAuthService::handle_callback`] redeems the state, trades the
//! authorization code for a Google access token, reads the profile, and maps
//! it onto a local account.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{Duration, Utc};
use serde::Deserialize;
use thiserror::Error;

use super::jwt::TokenIssuer;
use super::service::start_session;
use super::types::{GoogleConfig, TokenResponse};
use crate::error::{ApiError, ApiResult};
use crate::models::{normalize_email, NewUser, User};
use crate::store::{OAuthStateStore, StoreError, UserStore};

const GOOGLE_AUTH_URL: &str = "https://accounts.google.com/o/oauth2/v2/auth";
const GOOGLE_TOKEN_URL: &str = "https://oauth2.googleapis.com/token";
const GOOGLE_USERINFO_URL: &str = "https://www.googleapis.com/oauth2/v2/userinfo";

const SCOPES: &str = "openid email profile";

/// Identity returned by the userinfo endpoint
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct GoogleProfile {
    pub id: String,
    pub email: String,
    #[serde(default)]
    pub name: Option<String>,
}

#[derive(Debug, Error)]
pub enum ProviderError {
    /// Network failure or timeout talking to the provider
    #[error("identity provider unreachable: {0}")]
    Unreachable(String),

    #[error("code exchange failed with status {status}: {body}")]
    Exchange { status: u16, body: String },

    #[error("profile request failed with status {0}")]
    Profile(u16),

    #[error("malformed provider response: {0}")]
    Malformed(String),
}

impl From<reqwest::Error> for ProviderError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            ProviderError::Malformed(e.to_string())
        } else {
            ProviderError::Unreachable(e.to_string())
        }
    }
}

impl From<ProviderError> for ApiError {
    fn from(e: ProviderError) -> Self {
        tracing::error!("Google OAuth failed: {}", e);
        match e {
            ProviderError::Unreachable(_) => {
                ApiError::Upstream("identity provider unavailable".to_string())
            }
            _ => ApiError::unauthorized("authentication failed"),
        }
    }
}

/// An OAuth2 authorization-code provider.
#[async_trait]
pub trait OAuthProvider: Send + Sync {
    /// Consent page URL carrying `state`.
    fn authorization_url(&self, state: &str) -> String;

    /// Trade an authorization code for a provider access token.
    async fn exchange_code(&self, code: &str) -> Result<String, ProviderError>;

    async fn fetch_profile(&self, access_token: &str) -> Result<GoogleProfile, ProviderError>;
}

#[derive(Debug, Deserialize)]
struct GoogleTokenResponse {
    access_token: String,
}

/// Talks to Google's OAuth endpoints over HTTPS.
pub struct GoogleProvider {
    config: GoogleConfig,
    client: reqwest::Client,
}

impl GoogleProvider {
    pub fn new(config: GoogleConfig) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()?;
        Ok(Self { config, client })
    }
}

#[async_trait]
impl OAuthProvider for GoogleProvider {
    fn authorization_url(&self, state: &str) -> String {
        format!(
            "{}?\
             client_id={}&\
             redirect_uri={}&\
             response_type=code&\
             scope={}&\
             access_type=online&\
             state={}",
            GOOGLE_AUTH_URL,
            urlencoding::encode(&self.config.client_id),
            urlencoding::encode(&self.config.redirect_uri),
            urlencoding::encode(SCOPES),
            urlencoding::encode(state)
        )
    }

    async fn exchange_code(&self, code: &str) -> Result<String, ProviderError> {
        #[derive(serde::Serialize)]
        struct TokenRequest<'a> {
            code: &'a str,
            client_id: &'a str,
            client_secret: &'a str,
            redirect_uri: &'a str,
            grant_type: &'a str,
        }

        let response = self
            .client
            .post(GOOGLE_TOKEN_URL)
            .form(&TokenRequest {
                code,
                client_id: &self.config.client_id,
                client_secret: &self.config.client_secret,
                redirect_uri: &self.config.redirect_uri,
                grant_type: "authorization_code",
            })
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::Exchange { status, body });
        }

        let tokens: GoogleTokenResponse = response.json().await?;
        Ok(tokens.access_token)
    }

    async fn fetch_profile(&self, access_token: &str) -> Result<GoogleProfile, ProviderError> {
        let response = self
            .client
            .get(GOOGLE_USERINFO_URL)
            .bearer_auth(access_token)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(ProviderError::Profile(response.status().as_u16()));
        }

        Ok(response.json().await?)
    }
}

/// Google login workflow
pub struct GoogleAuthService {
    provider: Arc<dyn OAuthProvider>,
    users: Arc<dyn UserStore>,
    states: Arc<dyn OAuthStateStore>,
    tokens: TokenIssuer,
    state_ttl: Duration,
}

impl GoogleAuthService {
    pub fn new(
        provider: Arc<dyn OAuthProvider>,
        users: Arc<dyn UserStore>,
        states: Arc<dyn OAuthStateStore>,
        tokens: TokenIssuer,
        state_ttl: Duration,
    ) -> Self {
        Self {
            provider,
            users,
            states,
            tokens,
            state_ttl,
        }
    }

    pub fn authorization_url(&self, state: &str) -> String {
        self.provider.authorization_url(state)
    }

    /// How long a state from [`Self::begin`] stays redeemable.
    pub fn state_ttl(&self) -> Duration {
        self.state_ttl
    }

    /// Start a login: store a fresh state and return `(url, state)`.
    pub async fn begin(&self) -> ApiResult<(String, String)> {
        let state = uuid::Uuid::new_v4().simple().to_string();
        self.states
            .save(&state, Utc::now() + self.state_ttl)
            .await?;

        Ok((self.authorization_url(&state), state))
    }

    /// Finish a login started by [`Self::begin`].
    pub async fn handle_callback(&self, code: &str, state: &str) -> ApiResult<TokenResponse> {
        if !self.states.consume(state, Utc::now()).await? {
            tracing::warn!("OAuth callback with unknown or expired state");
            return Err(ApiError::unauthorized("invalid or expired state"));
        }

        let access_token = self.provider.exchange_code(code).await?;
        let profile = self.provider.fetch_profile(&access_token).await?;

        if profile.id.is_empty() || profile.email.trim().is_empty() {
            tracing::error!("Google profile is missing id or email");
            return Err(ApiError::unauthorized("authentication failed"));
        }

        tracing::info!("OAuth login attempt from: {}", profile.email);

        let user = match self.users.find_by_google_id(&profile.id).await? {
            Some(user) => user,
            None => self.create_user(profile).await?,
        };

        let pair = start_session(self.users.as_ref(), &self.tokens, &user).await?;

        tracing::info!("Successful OAuth login for: {}", user.email);
        Ok(pair)
    }

    async fn create_user(&self, profile: GoogleProfile) -> ApiResult<User> {
        let email = normalize_email(&profile.email);
        let name = profile
            .name
            .filter(|n| !n.trim().is_empty())
            .unwrap_or_else(|| email.clone());
        let google_id = profile.id;

        tracing::info!("Creating account for Google user: {}", email);

        match self
            .users
            .create(NewUser::google(email.clone(), name, google_id.clone(), Utc::now()))
            .await
        {
            Ok(user) => Ok(user),
            Err(StoreError::Duplicate) => {
                // A concurrent callback may have created the same Google account
                if let Some(user) = self.users.find_by_google_id(&google_id).await? {
                    return Ok(user);
                }
                tracing::warn!("Google email already registered locally: {}", email);
                Err(ApiError::Conflict("user already exists".to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use crate::test_support::{
        google_config, token_config, FakeOutcome, FakeProvider, StaleReadStore,
    };
    use tokio_test::assert_ok;

    struct Fixture {
        service: GoogleAuthService,
        store: Arc<MemoryStore>,
        provider: Arc<FakeProvider>,
    }

    fn fixture(outcome: FakeOutcome) -> Fixture {
        let store = Arc::new(MemoryStore::new());
        let provider = Arc::new(FakeProvider::new(outcome));
        let service = GoogleAuthService::new(
            provider.clone(),
            store.clone(),
            store.clone(),
            TokenIssuer::new(token_config()),
            Duration::minutes(10),
        );
        Fixture {
            service,
            store,
            provider,
        }
    }

    fn profile(id: &str, email: &str) -> GoogleProfile {
        GoogleProfile {
            id: id.to_string(),
            email: email.to_string(),
            name: Some("Gail Doe".to_string()),
        }
    }

    #[test]
    fn test_authorization_url_parameters() {
        let provider = GoogleProvider::new(google_config()).unwrap();
        let url = provider.authorization_url("abc 123");

        assert!(url.starts_with("https://accounts.google.com/o/oauth2/v2/auth?"));
        assert!(url.contains("client_id=client-id"));
        assert!(url.contains("redirect_uri=http%3A%2F%2Flocalhost%3A8080%2Fauth%2Fgoogle%2Fcallback"));
        assert!(url.contains("response_type=code"));
        assert!(url.contains("scope=openid%20email%20profile"));
        assert!(url.contains("access_type=online"));
        assert!(url.contains("state=abc%20123"));
    }

    #[tokio::test]
    async fn test_begin_issues_unique_stored_states() {
        let f = fixture(FakeOutcome::Profile(profile("g-1", "g@b.com")));

        let (url, first) = assert_ok!(f.service.begin().await);
        let (_, second) = assert_ok!(f.service.begin().await);

        assert_ne!(first, second);
        assert_eq!(first.len(), 32);
        assert!(url.ends_with(&format!("state={}", first)));
        assert!(f.store.consume(&first, Utc::now()).await.unwrap());
    }

    #[tokio::test]
    async fn test_first_login_creates_user_then_reuses_it() {
        let f = fixture(FakeOutcome::Profile(profile("g-1", "G@B.com")));

        let (_, state) = f.service.begin().await.unwrap();
        let first = assert_ok!(f.service.handle_callback("code", &state).await);

        let created = f.store.find_by_google_id("g-1").await.unwrap().unwrap();
        assert_eq!(created.email, "g@b.com");
        assert_eq!(created.name, "Gail Doe");
        assert!(created.password_hash.is_none());
        assert_eq!(created.refresh_token.as_deref(), Some(first.refresh_token.as_str()));
        let first_login = created.last_login_at.unwrap();

        // Provider now reports a different name and email; the account keeps its own
        f.provider
            .set_outcome(FakeOutcome::Profile(GoogleProfile {
                id: "g-1".to_string(),
                email: "other@b.com".to_string(),
                name: Some("Renamed".to_string()),
            }));
        let (_, state) = f.service.begin().await.unwrap();
        let second = assert_ok!(f.service.handle_callback("code", &state).await);

        assert_eq!(f.store.user_count().await, 1);
        let reused = f.store.find_by_google_id("g-1").await.unwrap().unwrap();
        assert_eq!(reused.id, created.id);
        assert_eq!(reused.email, "g@b.com");
        assert_eq!(reused.name, "Gail Doe");
        assert_eq!(reused.refresh_token, Some(second.refresh_token));
        assert!(reused.last_login_at.unwrap() >= first_login);
    }

    #[tokio::test]
    async fn test_missing_name_falls_back_to_email() {
        let f = fixture(FakeOutcome::Profile(GoogleProfile {
            id: "g-2".to_string(),
            email: "n@b.com".to_string(),
            name: None,
        }));

        let (_, state) = f.service.begin().await.unwrap();
        f.service.handle_callback("code", &state).await.unwrap();

        let user = f.store.find_by_google_id("g-2").await.unwrap().unwrap();
        assert_eq!(user.name, "n@b.com");
    }

    #[tokio::test]
    async fn test_state_is_single_use() {
        let f = fixture(FakeOutcome::Profile(profile("g-1", "g@b.com")));

        let (_, state) = f.service.begin().await.unwrap();
        assert_ok!(f.service.handle_callback("code", &state).await);

        let replay = f.service.handle_callback("code", &state).await;
        assert!(matches!(replay, Err(ApiError::Unauthorized(_))));

        let forged = f.service.handle_callback("code", "forged").await;
        assert!(matches!(forged, Err(ApiError::Unauthorized(_))));
        assert_eq!(f.provider.exchange_count(), 1);
    }

    #[tokio::test]
    async fn test_provider_rejection_is_unauthorized() {
        let f = fixture(FakeOutcome::RejectCode);

        let (_, state) = f.service.begin().await.unwrap();
        let result = f.service.handle_callback("bad-code", &state).await;

        assert!(matches!(
            result,
            Err(ApiError::Unauthorized(ref msg)) if msg == "authentication failed"
        ));
        assert_eq!(f.store.user_count().await, 0);
    }

    #[tokio::test]
    async fn test_unreachable_provider_is_upstream_error() {
        let f = fixture(FakeOutcome::Unreachable);

        let (_, state) = f.service.begin().await.unwrap();
        let result = f.service.handle_callback("code", &state).await;

        assert!(matches!(result, Err(ApiError::Upstream(_))));
    }

    #[tokio::test]
    async fn test_profile_without_email_is_rejected() {
        let f = fixture(FakeOutcome::Profile(profile("g-1", "")));

        let (_, state) = f.service.begin().await.unwrap();
        let result = f.service.handle_callback("code", &state).await;

        assert!(matches!(result, Err(ApiError::Unauthorized(_))));
        assert_eq!(f.store.user_count().await, 0);
    }

    #[tokio::test]
    async fn test_email_owned_by_local_account_is_not_linked() {
        let f = fixture(FakeOutcome::Profile(profile("g-1", "a@b.com")));
        f.store
            .create(NewUser::local(
                "a@b.com".to_string(),
                "Ann Lee".to_string(),
                "hash".to_string(),
            ))
            .await
            .unwrap();

        let (_, state) = f.service.begin().await.unwrap();
        let result = f.service.handle_callback("code", &state).await;

        assert!(matches!(result, Err(ApiError::Conflict(_))));
        let local = f.store.find_by_email("a@b.com").await.unwrap().unwrap();
        assert!(local.google_id.is_none());
    }

    #[tokio::test]
    async fn test_profile_fetch_failure_is_unauthorized() {
        for outcome in [FakeOutcome::ProfileRejected, FakeOutcome::MalformedProfile] {
            let f = fixture(outcome);

            let (_, state) = f.service.begin().await.unwrap();
            let result = f.service.handle_callback("code", &state).await;

            assert!(matches!(
                result,
                Err(ApiError::Unauthorized(ref msg)) if msg == "authentication failed"
            ));
            assert_eq!(f.provider.exchange_count(), 1);
            assert_eq!(f.store.user_count().await, 0);
        }
    }

    #[tokio::test]
    async fn test_concurrent_first_login_reuses_winning_account() {
        let inner = MemoryStore::new();
        let winner = inner
            .create(NewUser::google(
                "g@b.com".to_string(),
                "Gail Doe".to_string(),
                "g-1".to_string(),
                Utc::now(),
            ))
            .await
            .unwrap();
        // The first lookup misses, so the callback tries to insert and loses
        let users = Arc::new(StaleReadStore::new(inner, 1));
        let states = Arc::new(MemoryStore::new());
        let service = GoogleAuthService::new(
            Arc::new(FakeProvider::new(FakeOutcome::Profile(profile("g-1", "g@b.com")))),
            users.clone(),
            states,
            TokenIssuer::new(token_config()),
            Duration::minutes(10),
        );

        let (_, state) = service.begin().await.unwrap();
        let pair = assert_ok!(service.handle_callback("code", &state).await);

        assert_eq!(users.inner.user_count().await, 1);
        let stored = users.inner.find_by_google_id("g-1").await.unwrap().unwrap();
        assert_eq!(stored.id, winner.id);
        assert_eq!(stored.refresh_token, Some(pair.refresh_token));
    }
}
