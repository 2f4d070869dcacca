//! Error types for snapvault-server
//!
//! Every handler returns [`ApiResult`]; errors render as
//! `{"error": message}` plus `details` where a cause is worth reporting.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use crate::storage::StorageError;

/// API error type
#[derive(Debug, Error)]
pub enum ApiError {
    /// Missing or invalid bearer token (401)
    #[error("Not authenticated")]
    Unauthorized,

    /// Invalid request (400)
    #[error("{0}")]
    BadRequest(String),

    /// Resource not found, or owned by another user (404)
    #[error("{0}")]
    NotFound(String),

    /// Daily analysis cap reached (429)
    #[error("Daily analysis limit reached. Please try again tomorrow.")]
    RateLimited,

    /// Labeling stage of an analysis failed (500)
    #[error("AI analysis failed")]
    AnalysisFailed { details: String },

    /// Upstream service answered with an error (502)
    #[error("{0}")]
    Upstream(String),

    /// Internal server error (500)
    #[error("{0}")]
    Internal(String),

    /// Database error
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// snapvault-common error
    #[error("{0}")]
    Common(#[from] snapvault_common::Error),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Unauthorized => StatusCode::UNAUTHORIZED,
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            ApiError::Upstream(_) => StatusCode::BAD_GATEWAY,
            ApiError::Common(snapvault_common::Error::NotFound(_)) => StatusCode::NOT_FOUND,
            ApiError::Common(snapvault_common::Error::InvalidInput(_)) => StatusCode::BAD_REQUEST,
            ApiError::AnalysisFailed { .. }
            | ApiError::Internal(_)
            | ApiError::Database(_)
            | ApiError::Io(_)
            | ApiError::Common(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();

        if status.is_server_error() {
            tracing::error!(error = %self, "Request failed");
        }

        let body = match &self {
            ApiError::AnalysisFailed { details } => json!({
                "error": self.to_string(),
                "details": details,
            }),
            _ => json!({ "error": self.to_string() }),
        };

        (status, Json(body)).into_response()
    }
}

impl From<StorageError> for ApiError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::NotAnImage
            | StorageError::TooLarge(_)
            | StorageError::Empty
            | StorageError::Decode(_) => ApiError::BadRequest(err.to_string()),
            StorageError::Io(e) => ApiError::Io(e),
            StorageError::Task(msg) => ApiError::Internal(msg),
        }
    }
}

/// Result type for API handlers
pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(ApiError::Unauthorized.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(ApiError::RateLimited.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(ApiError::Upstream("x".into()).status(), StatusCode::BAD_GATEWAY);
        assert_eq!(
            ApiError::Common(snapvault_common::Error::NotFound("image".into())).status(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            ApiError::Common(snapvault_common::Error::Config("x".into())).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_storage_errors_are_client_errors() {
        assert_eq!(ApiError::from(StorageError::NotAnImage).status(), StatusCode::BAD_REQUEST);
        assert_eq!(ApiError::from(StorageError::TooLarge(10)).status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            ApiError::from(StorageError::Task("join".into())).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_messages_match_client_contract() {
        assert_eq!(ApiError::Unauthorized.to_string(), "Not authenticated");
        assert_eq!(
            ApiError::RateLimited.to_string(),
            "Daily analysis limit reached. Please try again tomorrow."
        );
        assert_eq!(
            ApiError::AnalysisFailed { details: "boom".into() }.to_string(),
            "AI analysis failed"
        );
    }
}
