// Mapping of domain failures onto HTTP responses.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use crate::metrics;
use crate::session::SessionError;
use crate::store::StoreError;

#[derive(Debug, Error)]
pub enum ApiError {
    /// Caller-supplied input is missing, malformed or out of range.
    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Conflict(String),

    #[error("persistence failure: {0}")]
    Persistence(#[from] StoreError),

    #[error("background task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

impl From<SessionError> for ApiError {
    fn from(e: SessionError) -> Self {
        match e {
            SessionError::NotFound(_) => ApiError::NotFound(e.to_string()),
            SessionError::AlreadyCompleted(_) => ApiError::Conflict(e.to_string()),
            SessionError::Store(e) => ApiError::Persistence(e),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            ApiError::Validation(msg) => {
                metrics::VALIDATION_FAILURES_TOTAL.inc();
                (StatusCode::BAD_REQUEST, msg.clone())
            }
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg.clone()),
            ApiError::Conflict(msg) => (StatusCode::CONFLICT, msg.clone()),
            ApiError::Persistence(e) => {
                metrics::PERSISTENCE_ERRORS_TOTAL.inc();
                tracing::error!("Storage error: {e}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                )
            }
            ApiError::Task(e) => {
                tracing::error!("Blocking task failed: {e}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                )
            }
        };
        (status, Json(json!({ "error": message }))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn test_status_codes() {
        let cases = [
            (ApiError::Validation("bad".into()), StatusCode::BAD_REQUEST),
            (
                ApiError::from(SessionError::NotFound(Uuid::nil())),
                StatusCode::NOT_FOUND,
            ),
            (
                ApiError::from(SessionError::AlreadyCompleted(Uuid::nil())),
                StatusCode::CONFLICT,
            ),
            (
                ApiError::Persistence(StoreError::Write {
                    location: "scores.json".into(),
                    source: std::io::Error::other("disk full"),
                }),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];
        for (err, status) in cases {
            assert_eq!(err.into_response().status(), status);
        }
    }
}
