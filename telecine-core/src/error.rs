use thiserror::Error;

use crate::upstream::wire::WireError;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Database error: {0}")]
    Database(sqlx::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Authentication error: {0}")]
    Authentication(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Range not satisfiable for size {size}")]
    RangeNotSatisfiable { size: u64 },

    #[error("Upstream unavailable: {0}")]
    UpstreamUnavailable(String),

    #[error("Invalid hash")]
    InvalidHash,

    #[error("Flood wait for {0} seconds")]
    FloodWait(u64),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<sqlx::Error> for Error {
    fn from(err: sqlx::Error) -> Self {
        match &err {
            // Map "no rows" to NotFound
            sqlx::Error::RowNotFound => Error::NotFound("Resource not found".to_string()),
            sqlx::Error::Database(db_err) => {
                let code = db_err.code().unwrap_or_default();
                match code.as_ref() {
                    // PostgreSQL unique_violation
                    "23505" => Error::InvalidInput("Resource already exists".to_string()),
                    // PostgreSQL not_null_violation
                    "23502" => Error::InvalidInput("Required field is missing".to_string()),
                    _ => Error::Database(err),
                }
            }
            _ => Error::Database(err),
        }
    }
}

impl From<WireError> for Error {
    fn from(err: WireError) -> Self {
        match err {
            WireError::FloodWait(seconds) => Error::FloodWait(seconds),
            WireError::NotFound(msg) => Error::NotFound(msg),
            WireError::Timeout => {
                Error::UpstreamUnavailable("upstream request timed out".to_string())
            }
            WireError::AuthBytesInvalid => {
                Error::UpstreamUnavailable("media session authorization failed".to_string())
            }
            WireError::Disconnected => {
                Error::UpstreamUnavailable("upstream connection lost".to_string())
            }
            WireError::Rpc(msg) => Error::UpstreamUnavailable(msg),
            WireError::Io(msg) => Error::UpstreamUnavailable(msg),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
