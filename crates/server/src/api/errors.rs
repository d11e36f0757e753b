//! API error types mapped to HTTP status codes.
//!
//! Each [`ApiError`] variant maps to a status code and produces a JSON body
//! `{"error": "message"}`. Engine errors convert via `From<CoreError>`:
//! - `NotFound` → 404
//! - `Invalid` → 400
//! - `Conflict`, `Degraded` → 409
//! - everything else → 500

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use corpusdb_core::error::CoreError;
use serde_json::json;

/// Application-level error type that implements `IntoResponse`.
#[derive(Debug)]
pub enum ApiError {
    /// Resource not found (404).
    NotFound(String),
    /// Invalid request parameters (400).
    BadRequest(String),
    /// Operation precondition unmet (409).
    Conflict(String),
    /// Unexpected server error (500).
    Internal(String),
}

impl From<CoreError> for ApiError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::NotFound(msg) => ApiError::NotFound(msg),
            CoreError::Invalid(msg) => ApiError::BadRequest(msg),
            CoreError::Conflict(msg) => ApiError::Conflict(msg),
            CoreError::Degraded(msg) => ApiError::Conflict(msg),
            CoreError::Io(e) => {
                tracing::error!("snapshot io failure: {e}");
                ApiError::Internal("storage failure".into())
            }
            CoreError::Corrupt(msg) => {
                tracing::error!("snapshot corrupt: {msg}");
                ApiError::Internal("storage failure".into())
            }
            CoreError::Internal(msg) => {
                tracing::error!("invariant violation: {msg}");
                ApiError::Internal("internal error".into())
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::Conflict(msg) => (StatusCode::CONFLICT, msg),
            ApiError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
        };
        (status, axum::Json(json!({ "error": message }))).into_response()
    }
}
