//! Client error types.

use investpro_core::AuthError;
use investpro_core::storage::StorageError;
use thiserror::Error;

/// Errors returned by [`crate::ApiClient`].
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Request failed: {0}")]
    Transport(#[from] reqwest::Error),

    /// 401 that could not be recovered by a refresh.
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("HTTP {status}: {message}")]
    Status { status: u16, message: String },

    #[error("Invalid response body: {0}")]
    Decode(String),

    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("Token storage: {0}")]
    Storage(#[from] StorageError),
}

impl ApiError {
    pub fn status(&self) -> Option<u16> {
        match self {
            ApiError::Unauthorized(_) => Some(401),
            ApiError::Status { status, .. } => Some(*status),
            ApiError::Transport(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }

    /// Server-provided message, without the status prefix.
    pub fn message(&self) -> String {
        match self {
            ApiError::Unauthorized(m) | ApiError::Status { message: m, .. } => m.clone(),
            other => other.to_string(),
        }
    }
}

impl From<ApiError> for AuthError {
    fn from(e: ApiError) -> Self {
        match e {
            ApiError::Transport(e) => AuthError::Network(e.to_string()),
            ApiError::Unauthorized(m) => AuthError::Unauthorized(m),
            // Gateway and upstream failures are as transient as a dropped connection.
            ApiError::Status { status, message } if status >= 500 => {
                AuthError::Network(format!("HTTP {status}: {message}"))
            }
            ApiError::Status { status, message } => {
                AuthError::Protocol(format!("HTTP {status}: {message}"))
            }
            ApiError::Decode(m) => AuthError::Protocol(m),
            ApiError::InvalidUrl(e) => AuthError::Protocol(e.to_string()),
            ApiError::Storage(e) => AuthError::StorageUnavailable(e),
        }
    }
}
