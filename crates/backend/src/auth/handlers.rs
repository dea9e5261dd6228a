//! Authentication HTTP handlers.

use axum::{
    extract::{rejection::JsonRejection, Query, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Extension, Json,
};
use serde::Deserialize;
use shared_types::{describe_errors, FieldOrder};
use validator::Validate;

use crate::error::{ApiError, ApiResult};
use crate::AppState;

use super::middleware::{build_state_cookie, clear_state_cookie, extract_cookie, OAUTH_STATE_COOKIE};
use super::types::{
    AuthUrlResponse, AuthUser, LoginRequest, ProfileResponse, RegisterRequest, TokenResponse,
    UserResponse,
};

/// Unwrap a JSON body and run its field validation.
fn validated<T: Validate + FieldOrder>(body: Result<Json<T>, JsonRejection>) -> ApiResult<T> {
    let Json(request) = body.map_err(|rejection| ApiError::InvalidBody(rejection.body_text()))?;
    request
        .validate()
        .map_err(|errors| ApiError::Validation(describe_errors(&errors, T::FIELDS)))?;
    Ok(request)
}

/// Register a new email/password account.
pub async fn register(
    State(state): State<AppState>,
    body: Result<Json<RegisterRequest>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<UserResponse>)> {
    let request = validated(body)?;
    let user = state.auth.register(request).await?;
    Ok((StatusCode::CREATED, Json(user)))
}

pub async fn login(
    State(state): State<AppState>,
    body: Result<Json<LoginRequest>, JsonRejection>,
) -> ApiResult<Json<TokenResponse>> {
    let request = validated(body)?;
    Ok(Json(state.auth.login(request).await?))
}

/// Start Google OAuth login flow.
///
/// Returns the consent URL and pins the issued state to the browser with a cookie.
pub async fn google_login(State(state): State<AppState>) -> ApiResult<Response> {
    let (url, oauth_state) = state.google.begin().await?;
    let cookie = build_state_cookie(
        &oauth_state,
        state.google.state_ttl().num_seconds(),
        state.secure_cookies,
    );

    Ok((
        [(header::SET_COOKIE, cookie)],
        Json(AuthUrlResponse { url }),
    )
        .into_response())
}

#[derive(Debug, Deserialize)]
pub struct GoogleCallbackParams {
    pub code: Option<String>,
    pub state: Option<String>,
    /// Set by Google when the user declines consent
    pub error: Option<String>,
}

/// Handle Google OAuth callback.
///
/// The state cookie is cleared whatever the outcome.
pub async fn google_callback(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(params): Query<GoogleCallbackParams>,
) -> Response {
    let cookie = clear_state_cookie(state.secure_cookies);
    let result = handle_callback_inner(&state, &headers, params).await;

    ([(header::SET_COOKIE, cookie)], result.map(Json)).into_response()
}

async fn handle_callback_inner(
    state: &AppState,
    headers: &HeaderMap,
    params: GoogleCallbackParams,
) -> ApiResult<TokenResponse> {
    if let Some(error) = &params.error {
        tracing::warn!("Google reported an OAuth error: {}", error);
    }

    let code = params
        .code
        .filter(|c| !c.is_empty())
        .ok_or_else(|| ApiError::bad_request("Code is required"))?;

    let oauth_state = params
        .state
        .filter(|s| !s.is_empty())
        .ok_or_else(|| ApiError::unauthorized("invalid or expired state"))?;

    if extract_cookie(headers, OAUTH_STATE_COOKIE).as_deref() != Some(oauth_state.as_str()) {
        tracing::warn!("OAuth callback state does not match the browser cookie");
        return Err(ApiError::unauthorized("invalid or expired state"));
    }

    state.google.handle_callback(&code, &oauth_state).await
}

/// Identity of the bearer of the access token.
pub async fn profile(Extension(user): Extension<AuthUser>) -> Json<ProfileResponse> {
    Json(ProfileResponse {
        user_id: user.id,
        email: user.email,
        role: user.role,
    })
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::{body::Body, http::Request, Router};
    use serde_json::{json, Value};
    use shared_types::Role;
    use tower::ServiceExt;

    use crate::auth::google::GoogleProfile;
    use crate::error::ErrorResponse;
    use crate::store::{MemoryStore, UserStore};
    use crate::test_support::{test_state, FakeOutcome};

    use super::*;

    fn app(outcome: FakeOutcome) -> (Router, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        let state = test_state(store.clone(), outcome);
        (crate::router(state), store)
    }

    fn google_profile() -> FakeOutcome {
        FakeOutcome::Profile(GoogleProfile {
            id: "g-1".to_string(),
            email: "g@b.com".to_string(),
            name: Some("Gail Doe".to_string()),
        })
    }

    fn post_json(uri: &str, body: Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    fn get(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    async fn json_body<T: serde::de::DeserializeOwned>(response: Response) -> T {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn set_cookie(response: &Response) -> String {
        response
            .headers()
            .get(header::SET_COOKIE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string()
    }

    fn register_body() -> Value {
        json!({"email": "a@b.com", "password": "Abcd123!", "name": "Ann Lee"})
    }

    #[tokio::test]
    async fn test_register_login_and_wrong_password() {
        let (app, _) = app(google_profile());

        let response = app
            .clone()
            .oneshot(post_json("/auth/register", register_body()))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);
        let user: UserResponse = json_body(response).await;
        assert_eq!(user.email, "a@b.com");
        assert_eq!(user.name, "Ann Lee");
        assert_eq!(user.role, Role::User);

        let response = app
            .clone()
            .oneshot(post_json(
                "/auth/login",
                json!({"email": "a@b.com", "password": "Abcd123!"}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let tokens: TokenResponse = json_body(response).await;
        assert_eq!(tokens.token_type, "Bearer");
        assert_eq!(tokens.expires_in, 3600);

        let response = app
            .oneshot(post_json(
                "/auth/login",
                json!({"email": "a@b.com", "password": "Abcd123!x"}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        let error: ErrorResponse = json_body(response).await;
        assert_eq!(error.error, "invalid credentials");
    }

    #[tokio::test]
    async fn test_register_duplicate_is_conflict() {
        let (app, store) = app(google_profile());

        let first = app
            .clone()
            .oneshot(post_json("/auth/register", register_body()))
            .await
            .unwrap();
        assert_eq!(first.status(), StatusCode::CREATED);

        let second = app
            .oneshot(post_json("/auth/register", register_body()))
            .await
            .unwrap();
        assert_eq!(second.status(), StatusCode::CONFLICT);
        assert_eq!(store.user_count().await, 1);
    }

    #[tokio::test]
    async fn test_register_validation_errors() {
        let (app, store) = app(google_profile());

        let response = app
            .oneshot(post_json(
                "/auth/register",
                json!({"email": "not-an-email", "password": "short", "name": "A"}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let error: ErrorResponse = json_body(response).await;
        let parts: Vec<&str> = error.error.split("; ").collect();
        assert_eq!(parts.len(), 3);
        assert_eq!(parts[0], "email must be a valid email address");
        assert!(parts[1].starts_with("password must be"));
        assert!(parts[2].starts_with("name must be"));
        assert_eq!(store.user_count().await, 0);
    }

    #[tokio::test]
    async fn test_unparseable_body_is_bad_request() {
        let (app, _) = app(google_profile());

        let response = app
            .oneshot(post_json("/auth/login", json!({"email": "a@b.com"})))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let error: ErrorResponse = json_body(response).await;
        assert_eq!(error.error, "Invalid request body");
        assert!(error.details.is_some());
    }

    #[tokio::test]
    async fn test_profile_requires_valid_bearer() {
        let (app, _) = app(google_profile());

        let response = app.clone().oneshot(get("/profile")).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .uri("/profile")
                    .header(header::AUTHORIZATION, "Bearer not-a-token")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        app.clone()
            .oneshot(post_json("/auth/register", register_body()))
            .await
            .unwrap();
        let login = app
            .clone()
            .oneshot(post_json(
                "/auth/login",
                json!({"email": "a@b.com", "password": "Abcd123!"}),
            ))
            .await
            .unwrap();
        let tokens: TokenResponse = json_body(login).await;

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/profile")
                    .header(
                        header::AUTHORIZATION,
                        format!("Bearer {}", tokens.access_token),
                    )
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let profile: ProfileResponse = json_body(response).await;
        assert_eq!(profile.email, "a@b.com");
        assert_eq!(profile.role, Role::User);
    }

    #[tokio::test]
    async fn test_google_round_trip_with_state_cookie() {
        let (app, store) = app(google_profile());

        let response = app.clone().oneshot(get("/auth/google/login")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let cookie = set_cookie(&response);
        assert!(cookie.starts_with("oauth_state="));
        assert!(cookie.contains("HttpOnly"));
        let oauth_state = cookie
            .trim_start_matches("oauth_state=")
            .split(';')
            .next()
            .unwrap()
            .to_string();
        let body: AuthUrlResponse = json_body(response).await;
        assert!(body.url.contains(&format!("state={}", oauth_state)));

        let response = app
            .oneshot(
                Request::builder()
                    .uri(format!("/auth/google/callback?code=abc&state={}", oauth_state))
                    .header(header::COOKIE, format!("oauth_state={}", oauth_state))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert!(set_cookie(&response).contains("Max-Age=0"));
        let tokens: TokenResponse = json_body(response).await;
        assert_eq!(tokens.token_type, "Bearer");

        let user = store.find_by_google_id("g-1").await.unwrap().unwrap();
        assert_eq!(user.refresh_token, Some(tokens.refresh_token));
    }

    #[tokio::test]
    async fn test_google_callback_requires_code() {
        let (app, _) = app(google_profile());

        let response = app
            .oneshot(get("/auth/google/callback?state=abc"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let error: ErrorResponse = json_body(response).await;
        assert_eq!(error.error, "Code is required");
    }

    #[tokio::test]
    async fn test_google_callback_rejects_mismatched_cookie() {
        let (app, store) = app(google_profile());

        let response = app.clone().oneshot(get("/auth/google/login")).await.unwrap();
        let body: AuthUrlResponse = json_body(response).await;
        let oauth_state = body.url.rsplit("state=").next().unwrap().to_string();

        let response = app
            .oneshot(
                Request::builder()
                    .uri(format!("/auth/google/callback?code=abc&state={}", oauth_state))
                    .header(header::COOKIE, "oauth_state=someone-else")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(store.user_count().await, 0);
    }

    #[tokio::test]
    async fn test_google_provider_down_is_bad_gateway() {
        let (app, _) = app(FakeOutcome::Unreachable);

        let response = app.clone().oneshot(get("/auth/google/login")).await.unwrap();
        let body: AuthUrlResponse = json_body(response).await;
        let oauth_state = body.url.rsplit("state=").next().unwrap().to_string();

        let response = app
            .oneshot(
                Request::builder()
                    .uri(format!("/auth/google/callback?code=abc&state={}", oauth_state))
                    .header(header::COOKIE, format!("oauth_state={}", oauth_state))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    }

    #[tokio::test]
    async fn test_health() {
        let (app, _) = app(google_profile());
        let response = app.oneshot(get("/health")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }
}
