//! Bearer authentication middleware and cookie helpers.

use axum::{
    body::Body,
    extract::State,
    http::{header, HeaderMap, Request},
    middleware::Next,
    response::Response,
};

use crate::error::{ApiError, ApiResult};
use crate::AppState;

use super::jwt::TokenError;
use super::types::AuthUser;

/// Cookie binding a browser to the `state` it was handed at login start.
pub const OAUTH_STATE_COOKIE: &str = "oauth_state";

const OAUTH_CALLBACK_PATH: &str = "/auth/google";

/// Middleware function that requires a valid access token.
///
/// Use with `axum::middleware::from_fn_with_state`. On success the caller's
/// [`AuthUser`] is available to handlers as an `Extension`.
pub async fn require_auth(
    State(state): State<AppState>,
    mut request: Request<Body>,
    next: Next,
) -> ApiResult<Response> {
    let token = extract_token_from_header(request.headers())
        .ok_or_else(|| ApiError::unauthorized("Missing authentication"))?;

    let claims = state.tokens.verify(&token).map_err(|e| {
        tracing::debug!("Rejected access token: {}", e);
        match e {
            TokenError::Expired => ApiError::unauthorized("Token expired"),
            _ => ApiError::unauthorized("Invalid token"),
        }
    })?;

    request.extensions_mut().insert(AuthUser::from(claims));
    Ok(next.run(request).await)
}

pub fn extract_token_from_header(headers: &HeaderMap) -> Option<String> {
    headers
        .get(header::AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| s.to_string())
}

pub fn extract_cookie(headers: &HeaderMap, cookie_name: &str) -> Option<String> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .filter_map(|cookie_str| cookie::Cookie::parse(cookie_str.trim()).ok())
        .find(|cookie| cookie.name() == cookie_name)
        .map(|cookie| cookie.value().to_string())
}

/// Build the `oauth_state` cookie string.
pub fn build_state_cookie(value: &str, max_age_secs: i64, secure: bool) -> String {
    let secure = if secure { "; Secure" } else { "" };
    format!(
        "{}={}; Path={}; HttpOnly; SameSite=Lax; Max-Age={}{}",
        OAUTH_STATE_COOKIE, value, OAUTH_CALLBACK_PATH, max_age_secs, secure
    )
}

pub fn clear_state_cookie(secure: bool) -> String {
    build_state_cookie("", 0, secure)
}
