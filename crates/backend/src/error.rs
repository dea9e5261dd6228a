//! Unified error handling for the auth API.
//!
//! This module provides a centralized error type that implements `IntoResponse`,
//! allowing handlers and services to use `?` naturally while returning
//! appropriate HTTP status codes and terse messages. Internal detail is logged,
//! never sent.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::store::StoreError;

/// API error response body
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

/// Unified error type for API handlers
#[derive(Debug, Error)]
pub enum ApiError {
    /// Required parameter is missing
    #[error("Invalid request: {0}")]
    BadRequest(String),

    /// JSON body could not be parsed; carries the parser's explanation
    #[error("Invalid request body: {0}")]
    InvalidBody(String),

    /// Request parsed but failed field validation
    #[error("Validation failed: {0}")]
    Validation(String),

    /// The resource already exists
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Unknown email or wrong password, deliberately indistinguishable
    #[error("invalid credentials")]
    InvalidCredentials,

    /// Authentication required but not provided or invalid
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// The identity provider could not be reached
    #[error("Upstream error: {0}")]
    Upstream(String),

    /// Credential store failure
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// Generic internal error
    #[error("{0}")]
    Internal(#[from] anyhow::Error),
}

impl ApiError {
    /// Create a bad request error
    pub fn bad_request(message: impl Into<String>) -> Self {
        ApiError::BadRequest(message.into())
    }

    /// Create an unauthorized error
    pub fn unauthorized(message: impl Into<String>) -> Self {
        ApiError::Unauthorized(message.into())
    }

    /// Status code this error is reported with
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) | ApiError::InvalidBody(_) | ApiError::Validation(_) => {
                StatusCode::BAD_REQUEST
            }
            ApiError::Conflict(_) | ApiError::Store(StoreError::Duplicate) => StatusCode::CONFLICT,
            ApiError::InvalidCredentials | ApiError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ApiError::Upstream(_) => StatusCode::BAD_GATEWAY,
            ApiError::Store(StoreError::Unavailable(_)) => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::Store(_) | ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let details = match &self {
            ApiError::InvalidBody(reason) => Some(reason.clone()),
            _ => None,
        };
        let error_message = match &self {
            ApiError::InvalidBody(_) => "Invalid request body".to_string(),
            ApiError::BadRequest(msg)
            | ApiError::Validation(msg)
            | ApiError::Conflict(msg)
            | ApiError::Unauthorized(msg)
            | ApiError::Upstream(msg) => msg.clone(),
            ApiError::InvalidCredentials => self.to_string(),
            ApiError::Store(StoreError::Duplicate) => "Resource already exists".to_string(),
            ApiError::Store(StoreError::Unavailable(e)) => {
                tracing::error!("Store unavailable: {}", e);
                "Database connection unavailable".to_string()
            }
            ApiError::Store(e) => {
                tracing::error!("Store error: {:?}", e);
                "Database operation failed".to_string()
            }
            ApiError::Internal(e) => {
                tracing::error!("Internal error: {:?}", e);
                "Internal server error".to_string()
            }
        };

        let body = Json(ErrorResponse {
            error: error_message,
            details,
        });

        (status, body).into_response()
    }
}

/// Result type alias for API handlers
pub type ApiResult<T> = Result<T, ApiError>;
