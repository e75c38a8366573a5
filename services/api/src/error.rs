//! Custom error types for the API service

use std::error::Error as _;

use auth::AuthError;
use axum::{
    Json,
    extract::rejection::{JsonRejection, PathRejection},
    http::{HeaderValue, StatusCode, header::RETRY_AFTER},
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;
use tracing::{error, warn};

use crate::query::QueryError;

const INTERNAL_MESSAGE: &str = "Internal Server Error";

/// Custom error type for the API service
#[derive(Error, Debug)]
pub enum ApiError {
    /// No credential supplied
    #[error("{0}")]
    Unauthorized(String),

    /// Credential supplied but rejected
    #[error("{0}")]
    Forbidden(String),

    /// Bad request with message
    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    NotFound(String),

    /// Known path, unsupported method
    #[error("Method not allowed")]
    MethodNotAllowed,

    /// Rate limit exceeded
    #[error("Too many requests, please try again later.")]
    TooManyRequests { retry_after: u64 },

    /// Internal server error; the detail is logged, never returned
    #[error("Internal error: {0}")]
    Internal(String),

    /// Database error
    #[error("Database error: {0}")]
    Database(#[from] common::error::DatabaseError),
}

/// What the response logger needs to know about an error response
///
/// Attached as a response extension and removed again before the response
/// leaves the server.
#[derive(Debug, Clone)]
pub struct ErrorContext {
    pub message: String,
    pub detail: Option<String>,
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden(_) => StatusCode::FORBIDDEN,
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::MethodNotAllowed => StatusCode::METHOD_NOT_ALLOWED,
            ApiError::TooManyRequests { .. } => StatusCode::TOO_MANY_REQUESTS,
            ApiError::Internal(_) | ApiError::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Message safe to show the client
    pub fn public_message(&self) -> String {
        match self {
            ApiError::Internal(_) | ApiError::Database(_) => INTERNAL_MESSAGE.to_string(),
            other => other.to_string(),
        }
    }

    fn detail(&self) -> Option<String> {
        match self {
            ApiError::Internal(detail) => Some(detail.clone()),
            ApiError::Database(e) => {
                let mut detail = e.to_string();
                let mut source = e.source();
                while let Some(cause) = source {
                    detail.push_str(": ");
                    detail.push_str(&cause.to_string());
                    source = cause.source();
                }
                Some(detail)
            }
            _ => None,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = self.public_message();
        let detail = self.detail();

        if status.is_server_error() {
            error!("Request failed: {}", detail.as_deref().unwrap_or(&message));
        }

        let body = Json(json!({
            "status": "error",
            "message": message,
            "error": message,
        }));

        let mut response = (status, body).into_response();

        if let ApiError::TooManyRequests { retry_after } = self {
            response
                .headers_mut()
                .insert(RETRY_AFTER, HeaderValue::from(retry_after));
        }

        response
            .extensions_mut()
            .insert(ErrorContext { message, detail });
        response
    }
}

impl From<AuthError> for ApiError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::NoApiKey | AuthError::MissingToken => ApiError::Unauthorized(err.to_string()),
            AuthError::InvalidApiKey | AuthError::InvalidToken => {
                ApiError::Forbidden(err.to_string())
            }
            AuthError::EmailTaken
            | AuthError::UsernameTaken
            | AuthError::InvalidCredentials
            | AuthError::Validation(_) => ApiError::BadRequest(err.to_string()),
            AuthError::Hashing(_) | AuthError::Token(_) => ApiError::Internal(err.to_string()),
            AuthError::Store(db) => ApiError::Database(db),
        }
    }
}

impl From<QueryError> for ApiError {
    fn from(err: QueryError) -> Self {
        ApiError::BadRequest(err.to_string())
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        warn!("Rejected request body: {}", rejection.body_text());
        ApiError::BadRequest(rejection.body_text())
    }
}

impl From<PathRejection> for ApiError {
    fn from(rejection: PathRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

/// Type alias for API results
pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;
    use common::error::DatabaseError;

    #[test]
    fn test_auth_errors_map_to_taxonomy() {
        assert_eq!(
            ApiError::from(AuthError::NoApiKey).status(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            ApiError::from(AuthError::MissingToken).status(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            ApiError::from(AuthError::InvalidApiKey).status(),
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            ApiError::from(AuthError::InvalidToken).status(),
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            ApiError::from(AuthError::EmailTaken).status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ApiError::from(AuthError::InvalidCredentials).status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ApiError::from(AuthError::Hashing("boom".to_string())).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_server_errors_hide_detail_from_client() {
        let err = ApiError::Database(DatabaseError::Configuration(
            "password authentication failed".to_string(),
        ));
        assert_eq!(err.public_message(), "Internal Server Error");

        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let context = response.extensions().get::<ErrorContext>().unwrap();
        assert_eq!(context.message, "Internal Server Error");
        assert!(
            context
                .detail
                .as_deref()
                .unwrap()
                .contains("password authentication failed")
        );
    }

    #[test]
    fn test_throttled_response_carries_retry_after() {
        let response = ApiError::TooManyRequests { retry_after: 42 }.into_response();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(response.headers()[RETRY_AFTER], "42");
    }

    #[tokio::test]
    async fn test_error_body_shape() {
        let response = ApiError::NotFound("Route not found".to_string()).into_response();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(
            body,
            json!({"status": "error", "message": "Route not found", "error": "Route not found"})
        );
    }
}
