//! Error handling for the HTTP surface
//!
//! Library stages return their own typed errors; handlers convert them into
//! `AppError`, which renders the JSON error body.

use crate::pipeline::{CacheError, PipelineError};
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;
use tracing::error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Evidence cache error: {0}")]
    Cache(#[from] CacheError),

    #[error("Request cancelled")]
    Cancelled,

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<PipelineError> for AppError {
    fn from(err: PipelineError) -> Self {
        match err {
            PipelineError::Configuration(msg) => AppError::Validation(msg),
            PipelineError::InvalidOptions(e) => AppError::Validation(e.to_string()),
            PipelineError::Cache(e) => AppError::Cache(e),
            PipelineError::Cancelled => AppError::Cancelled,
        }
    }
}

impl From<validator::ValidationErrors> for AppError {
    fn from(err: validator::ValidationErrors) -> Self {
        AppError::Validation(err.to_string())
    }
}

/// Error response structure
#[derive(Serialize)]
pub struct ErrorResponse {
    pub success: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
}

impl AppError {
    fn parts(&self) -> (StatusCode, &'static str, String, Option<String>) {
        match self {
            AppError::Validation(msg) => (StatusCode::BAD_REQUEST, "VALIDATION_ERROR", msg.clone(), None),
            AppError::Cache(e @ CacheError::CorruptManifest { .. }) => (
                StatusCode::CONFLICT,
                "CACHE_CORRUPT",
                "The evidence cache entry is corrupt".to_string(),
                Some(e.to_string()),
            ),
            AppError::Cache(CacheError::Cancelled) | AppError::Cancelled => (
                StatusCode::SERVICE_UNAVAILABLE,
                "CANCELLED",
                "The request was cancelled".to_string(),
                None,
            ),
            AppError::Cache(e) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "CACHE_ERROR",
                "An evidence cache error occurred".to_string(),
                Some(e.to_string()),
            ),
            AppError::Internal(msg) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "INTERNAL_ERROR",
                "An internal error occurred".to_string(),
                Some(msg.clone()),
            ),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_code, message, details) = self.parts();
        if status.is_server_error() {
            error!("{}", self);
        }

        let body = Json(ErrorResponse {
            success: false,
            message,
            error: details,
            code: Some(error_code.to_string()),
        });

        (status, body).into_response()
    }
}

/// Result type alias for API handlers
pub type ApiResult<T> = Result<T, AppError>;

/// Helper function to create a validation error
pub fn validation_error(msg: impl Into<String>) -> AppError {
    AppError::Validation(msg.into())
}
