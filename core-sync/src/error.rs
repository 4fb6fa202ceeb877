use bridge_traits::error::BridgeError;
use core_library::LibraryError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SyncError {
    /// The document root cannot be read or written
    #[error("Local storage unavailable: {0}")]
    StorageUnavailable(String),

    /// The provider refused the credentials
    #[error("Credentials rejected: {0}")]
    AuthRejected(String),

    #[error("Remote entry not found: {path}")]
    RemoteNotFound { path: String },

    /// Transient network or server failure; a partial file may be resumed
    #[error("Transfer interrupted: {0}")]
    TransferInterrupted(String),

    #[error("Transfer failed: {0}")]
    TransferFailed(String),

    #[error("Library error: {0}")]
    Library(#[from] LibraryError),

    #[error("Provider error: {0}")]
    Provider(String),

    #[error("Invalid input: {field} - {message}")]
    InvalidInput { field: String, message: String },

    #[error("A purge is already running")]
    PurgeInProgress,
}

impl SyncError {
    /// Classify a failure of a remote call or transfer touching `path`.
    pub fn from_remote(error: BridgeError, path: &str) -> Self {
        match error {
            BridgeError::Http { status: 401, message } => SyncError::AuthRejected(message),
            BridgeError::Http { status: 404, .. } => SyncError::RemoteNotFound {
                path: path.to_string(),
            },
            // Raw content endpoints report a missing path as a 409 endpoint error
            BridgeError::Http { status: 409, message } if message.contains("not_found") => {
                SyncError::RemoteNotFound {
                    path: path.to_string(),
                }
            }
            BridgeError::Http { status, message } if status == 429 || status >= 500 => {
                SyncError::TransferInterrupted(format!("HTTP {}: {}", status, message))
            }
            BridgeError::Http { status, message } => {
                SyncError::TransferFailed(format!("HTTP {}: {}", status, message))
            }
            BridgeError::Network(message) | BridgeError::Interrupted(message) => {
                SyncError::TransferInterrupted(message)
            }
            BridgeError::Io(e) => SyncError::StorageUnavailable(e.to_string()),
            BridgeError::NotAvailable(message) => SyncError::Provider(message),
            BridgeError::OperationFailed(message) => SyncError::TransferFailed(message),
        }
    }

    /// Classify a failure of the local file system.
    pub fn from_storage(error: BridgeError) -> Self {
        SyncError::StorageUnavailable(error.to_string())
    }

    /// Only interrupted transfers keep their partial file and status.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, SyncError::TransferInterrupted(_))
    }
}

pub type Result<T> = std::result::Result<T, SyncError>;
