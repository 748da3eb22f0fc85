//! Domain error types for server operations.
//!
//! Configuration errors stop startup. Handler errors render as the same JSON
//! envelope access denials use, without internal details.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use std::fmt;

/// Invalid server configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// Session duration must be between one minute and `max` minutes.
    InvalidSessionDuration { minutes: i64, max: i64 },
    /// Role ranks or permission defaults are invalid.
    InvalidAccess { details: String },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidSessionDuration { minutes, max } => {
                write!(
                    f,
                    "session duration must be between 1 and {max} minutes, got {minutes}"
                )
            }
            Self::InvalidAccess { details } => {
                write!(f, "invalid access configuration: {details}")
            }
        }
    }
}

impl std::error::Error for ConfigError {}

/// Errors raised by route handlers after authorization succeeded.
#[derive(Debug)]
pub enum ApiError {
    /// The request body or path was not usable.
    BadRequest { details: String },
    /// Nothing matched the request.
    NotFound { what: String },
    /// Database or other backend failure.
    Internal { details: String },
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::BadRequest { details } => write!(f, "bad request: {details}"),
            Self::NotFound { what } => write!(f, "{what} not found"),
            Self::Internal { details } => write!(f, "internal error: {details}"),
        }
    }
}

impl std::error::Error for ApiError {}

#[derive(Serialize)]
struct ErrorBody {
    success: bool,
    message: String,
    error_code: &'static str,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code, message) = match &self {
            Self::BadRequest { details } => {
                (StatusCode::BAD_REQUEST, "BAD_REQUEST", details.clone())
            }
            Self::NotFound { what } => (StatusCode::NOT_FOUND, "NOT_FOUND", format!("{what} not found")),
            Self::Internal { details } => {
                tracing::error!(error = %details, "request failed");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "INTERNAL_ERROR",
                    "internal server error".to_string(),
                )
            }
        };
        let body = ErrorBody {
            success: false,
            message,
            error_code: code,
        };
        (status, Json(body)).into_response()
    }
}
