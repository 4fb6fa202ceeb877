//! Error types for the Dropbox provider

use bridge_traits::error::BridgeError;
use thiserror::Error;

/// Dropbox provider errors
#[derive(Error, Debug)]
pub enum DropboxError {
    /// The access token is missing, expired or revoked
    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    /// Endpoint-specific failure reported with status 409
    #[error("Dropbox API error (status {status_code}): {message}")]
    ApiError { status_code: u16, message: String },

    #[error("Rate limit exceeded, retry after {retry_after_seconds} seconds")]
    RateLimitExceeded { retry_after_seconds: u64 },

    #[error("Path not found: {path}")]
    NotFound { path: String },

    #[error("Failed to parse API response: {0}")]
    ParseError(String),

    #[error(transparent)]
    BridgeError(#[from] BridgeError),
}

/// Result type for Dropbox operations
pub type Result<T> = std::result::Result<T, DropboxError>;

impl From<DropboxError> for BridgeError {
    fn from(error: DropboxError) -> Self {
        match error {
            DropboxError::AuthenticationFailed(message) => BridgeError::Http {
                status: 401,
                message,
            },
            DropboxError::ApiError {
                status_code,
                message,
            } => BridgeError::Http {
                status: status_code,
                message,
            },
            DropboxError::RateLimitExceeded {
                retry_after_seconds,
            } => BridgeError::Http {
                status: 429,
                message: format!("retry after {} seconds", retry_after_seconds),
            },
            DropboxError::NotFound { path } => BridgeError::Http {
                status: 404,
                message: format!("not found: {}", path),
            },
            DropboxError::ParseError(msg) => {
                BridgeError::OperationFailed(format!("Parse error: {}", msg))
            }
            DropboxError::BridgeError(e) => e,
        }
    }
}
