//! API error types.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;

use crate::models::ErrorResponse;

/// An error response carrying the request's correlation id.
#[derive(Debug, Error)]
#[error("{message}")]
pub struct ApiError {
    status: StatusCode,
    message: String,
    ray_id: String,
}

impl ApiError {
    pub fn new(status: StatusCode, message: impl Into<String>, ray_id: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
            ray_id: ray_id.into(),
        }
    }

    pub fn bad_request(message: impl Into<String>, ray_id: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message, ray_id)
    }

    pub fn not_found(message: impl Into<String>, ray_id: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, message, ray_id)
    }

    pub fn unauthorized(message: impl Into<String>, ray_id: impl Into<String>) -> Self {
        Self::new(StatusCode::UNAUTHORIZED, message, ray_id)
    }

    /// Internal error; the cause is exposed only when `expose` is set
    /// (development environments).
    pub fn internal(
        error: &dyn std::error::Error,
        expose: bool,
        ray_id: impl Into<String>,
    ) -> Self {
        let message = if expose {
            error.to_string()
        } else {
            "Internal Server Error".to_string()
        };
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, message, ray_id)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ErrorResponse {
            message: self.message,
            ray_id: self.ray_id,
        };
        (self.status, axum::Json(body)).into_response()
    }
}

/// Result type for API handlers.
pub type Result<T> = std::result::Result<T, ApiError>;
