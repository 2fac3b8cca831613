// HTTP error handling

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Result type for HTTP handlers
pub type AppResult<T> = Result<T, AppError>;

/// Application error with HTTP status code
#[derive(Debug)]
pub struct AppError {
    pub status: StatusCode,
    pub message: String,
}

impl AppError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(StatusCode::UNAUTHORIZED, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, message)
    }

    pub fn internal_server_error(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, message)
    }

    #[must_use]
    pub fn invalid_credentials() -> Self {
        Self::unauthorized("Invalid credentials")
    }

    #[must_use]
    pub fn service_unavailable() -> Self {
        Self::new(
            StatusCode::SERVICE_UNAVAILABLE,
            "Streaming service temporarily unavailable. Please try again in a few moments.",
        )
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.status, self.message)
    }
}

impl std::error::Error for AppError {}

/// Error response JSON structure
#[derive(Debug, Serialize, Deserialize)]
struct ErrorResponse {
    error: String,
    status: u16,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status;
        let body = Json(ErrorResponse {
            error: self.message,
            status: status.as_u16(),
        });

        (status, body).into_response()
    }
}

/// Convert `telecine_core` errors to HTTP errors
impl From<telecine_core::Error> for AppError {
    fn from(err: telecine_core::Error) -> Self {
        use telecine_core::Error;

        match err {
            Error::NotFound(msg) => Self::not_found(msg),
            Error::Authentication(msg) => Self::unauthorized(msg),
            Error::InvalidInput(msg) => Self::bad_request(msg),
            Error::Validation(msg) => Self::bad_request(msg),
            // Never discloses whether the file exists.
            Error::InvalidHash => Self::not_found("Not found"),
            Error::RangeNotSatisfiable { .. } => {
                Self::new(StatusCode::RANGE_NOT_SATISFIABLE, "Range not satisfiable")
            }
            Error::UpstreamUnavailable(msg) => {
                tracing::error!("Upstream unavailable: {}", msg);
                Self::service_unavailable()
            }
            Error::FloodWait(seconds) => {
                tracing::warn!("Upstream flood wait: {}s", seconds);
                Self::service_unavailable()
            }
            Error::Database(e) => {
                tracing::error!("Database error: {}", e);
                Self::internal_server_error("Database error")
            }
            Error::Serialization(e) => {
                tracing::error!("Serialization error: {}", e);
                Self::internal_server_error("Data processing error")
            }
            Error::Internal(msg) => {
                tracing::error!("Internal error: {}", msg);
                Self::internal_server_error("Internal server error")
            }
        }
    }
}

/// Convert `serde_json` errors to HTTP errors
impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        tracing::error!("JSON serialization/deserialization error: {}", err);
        Self::bad_request("Invalid request data format")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use telecine_core::Error;

    #[test]
    fn status_mapping_follows_the_taxonomy() {
        let cases: Vec<(Error, StatusCode)> = vec![
            (Error::NotFound("x".into()), StatusCode::NOT_FOUND),
            (Error::Authentication("x".into()), StatusCode::UNAUTHORIZED),
            (Error::InvalidInput("x".into()), StatusCode::BAD_REQUEST),
            (Error::Validation("x".into()), StatusCode::BAD_REQUEST),
            (Error::InvalidHash, StatusCode::NOT_FOUND),
            (
                Error::RangeNotSatisfiable { size: 10 },
                StatusCode::RANGE_NOT_SATISFIABLE,
            ),
            (
                Error::UpstreamUnavailable("x".into()),
                StatusCode::SERVICE_UNAVAILABLE,
            ),
            (Error::FloodWait(5), StatusCode::SERVICE_UNAVAILABLE),
            (
                Error::Internal("x".into()),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];
        for (err, status) in cases {
            assert_eq!(AppError::from(err).status, status);
        }
    }

    #[test]
    fn hash_mismatch_does_not_leak_details() {
        let err = AppError::from(Error::InvalidHash);
        assert_eq!(err.message, "Not found");
    }
}
