//! HTTP error responses.
//!
//! `ApiError` is the single place where service outcomes become status codes.
//! Bodies are `{"message": ...}`; validation failures add an `errors` array
//! with one `{field, message}` entry per failing field. Internal details are
//! logged and never returned.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use quillpost_auth::{AuthError, VerifyError};
use quillpost_core::{FieldError, ValidationErrors};
use quillpost_storage::StorageError;
use serde::Serialize;

use crate::posts::PostError;
use crate::rate_limit::Quota;

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("{0}")]
    Validation(ValidationErrors),

    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    Conflict(String),

    #[error("{0}")]
    Unauthorized(String),

    #[error("{0}")]
    Forbidden(String),

    #[error("{0}")]
    NotFound(String),

    #[error("Rate limit exceeded: {0}")]
    RateLimited(Quota),

    #[error("Storage error: {0}")]
    Storage(StorageError),

    #[error("Internal error: {0}")]
    Internal(String),
}

#[derive(Serialize)]
struct ErrorBody<'a> {
    message: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    errors: Option<&'a [FieldError]>,
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Validation(_) | Self::BadRequest(_) | Self::Conflict(_) => {
                StatusCode::BAD_REQUEST
            }
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::RateLimited(_) => StatusCode::TOO_MANY_REQUESTS,
            Self::Storage(_) | Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn invalid_json() -> Self {
        Self::BadRequest("Invalid JSON data".into())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = match &self {
            Self::Validation(errors) => errors.summary.clone(),
            Self::Storage(err) => {
                tracing::error!(error = %err, category = %err.category(), "Storage failure");
                "Database error occurred".to_string()
            }
            Self::Internal(detail) => {
                tracing::error!(error = %detail, "Internal failure");
                "An unexpected error occurred".to_string()
            }
            other => other.to_string(),
        };
        let errors = match &self {
            Self::Validation(errors) => Some(errors.errors.as_slice()),
            _ => None,
        };

        (
            status,
            Json(ErrorBody {
                message: &message,
                errors,
            }),
        )
            .into_response()
    }
}

impl From<AuthError> for ApiError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::Invalid(errors) => Self::Validation(errors),
            AuthError::Conflict { message } => Self::Conflict(message),
            AuthError::InvalidCredentials => Self::Unauthorized("Invalid credentials".into()),
            AuthError::Storage(err) => Self::Storage(err),
            AuthError::Internal { message } => Self::Internal(message),
        }
    }
}

impl From<PostError> for ApiError {
    fn from(err: PostError) -> Self {
        match err {
            PostError::Forbidden => Self::Forbidden(err.to_string()),
            PostError::Invalid(errors) => Self::Validation(errors),
            PostError::Storage(err) => Self::Storage(err),
        }
    }
}

impl From<VerifyError> for ApiError {
    fn from(err: VerifyError) -> Self {
        Self::Unauthorized(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use axum::body::to_bytes;
    use serde_json::Value;

    use super::*;

    async fn body_json(err: ApiError) -> (StatusCode, Value) {
        let response = err.into_response();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn test_validation_body_lists_fields() {
        let errors = ValidationErrors::single("Title and body are required", "body", "body is required");
        let (status, body) = body_json(ApiError::Validation(errors)).await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["message"], "Title and body are required");
        assert_eq!(body["errors"][0]["field"], "body");
    }

    #[tokio::test]
    async fn test_internal_detail_not_exposed() {
        let (status, body) =
            body_json(ApiError::Storage(StorageError::internal("relation \"post\" does not exist"))).await;

        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["message"], "Database error occurred");
        assert!(body.get("errors").is_none());
    }

    #[tokio::test]
    async fn test_status_mapping() {
        assert_eq!(
            ApiError::from(PostError::Forbidden).status(),
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            ApiError::from(AuthError::InvalidCredentials).status(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            ApiError::from(AuthError::conflict("User already exists")).status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ApiError::from(VerifyError::Expired).status(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            ApiError::RateLimited(Quota::per_minute(5)).status(),
            StatusCode::TOO_MANY_REQUESTS
        );

        let (_, body) = body_json(ApiError::from(PostError::Forbidden)).await;
        assert_eq!(body["message"], "User not authorized to access this post");
    }
}
