//! Error types for d2d-server
//!
//! Every handler failure collapses to the same HTTP 500 with a static
//! message; the detail goes to the log only.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use crate::services::ingest::IngestError;

/// Body message for every failed request
pub const INTERNAL_ERROR_MESSAGE: &str = "Internal server error";

/// API error type
#[derive(Debug, Error)]
pub enum ApiError {
    /// Missing or malformed request parameter or form field
    #[error("Invalid request: {0}")]
    BadRequest(String),

    /// Upload, classification or insert step of a submission failed
    #[error(transparent)]
    Ingest(#[from] IngestError),

    /// Multipart body could not be read
    #[error("Malformed multipart body: {0}")]
    Multipart(#[from] axum::extract::multipart::MultipartError),

    /// d2d-common error (database, serialization, ...)
    #[error(transparent)]
    Common(#[from] d2d_common::Error),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        tracing::error!(error = %self, "Request failed");

        let body = Json(json!({
            "message": INTERNAL_ERROR_MESSAGE,
        }));

        (StatusCode::INTERNAL_SERVER_ERROR, body).into_response()
    }
}

/// Result type for API handlers
pub type ApiResult<T> = Result<T, ApiError>;
