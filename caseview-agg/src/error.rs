//! Error types for caseview-agg

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use crate::services::{CaseError, StoreError, TrackerError};

/// API error type
#[derive(Debug, Error)]
pub enum ApiError {
    /// Resource not found (404)
    #[error("Resource not found: {0}")]
    NotFound(String),

    /// Invalid request (400)
    #[error("Invalid request: {0}")]
    BadRequest(String),

    /// Conflict (409) - e.g., analysis already running
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Upstream API failure (502)
    #[error("Upstream error: {0}")]
    BadGateway(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_code, message) = match self {
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, "NOT_FOUND", msg),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "BAD_REQUEST", msg),
            ApiError::Conflict(msg) => (StatusCode::CONFLICT, "CONFLICT", msg),
            ApiError::BadGateway(msg) => (StatusCode::BAD_GATEWAY, "UPSTREAM_ERROR", msg),
        };

        let body = Json(json!({
            "error": {
                "code": error_code,
                "message": message,
            }
        }));

        (status, body).into_response()
    }
}

impl From<TrackerError> for ApiError {
    fn from(err: TrackerError) -> Self {
        match err {
            TrackerError::InvalidReportId(_) => ApiError::BadRequest(err.to_string()),
            TrackerError::JobAlreadyActive { .. } => ApiError::Conflict(err.to_string()),
            TrackerError::NotTracked(_) => ApiError::NotFound(err.to_string()),
            TrackerError::JobFailed { .. } | TrackerError::Upstream(_) => {
                ApiError::BadGateway(err.to_string())
            }
        }
    }
}

impl From<CaseError> for ApiError {
    fn from(err: CaseError) -> Self {
        match err {
            CaseError::InvalidUserId(_) => ApiError::BadRequest(err.to_string()),
            CaseError::PrimaryFetchFailed { .. } => ApiError::BadGateway(err.to_string()),
        }
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Case(e) => e.into(),
            StoreError::Superseded(_) => ApiError::Conflict(err.to_string()),
        }
    }
}

/// Result type for API handlers
pub type ApiResult<T> = Result<T, ApiError>;
