use thiserror::Error;

#[derive(Error, Debug)]
pub enum BridgeError {
    #[error("Bridge capability not available: {0}")]
    NotAvailable(String),

    #[error("Bridge operation failed: {0}")]
    OperationFailed(String),

    /// A remote endpoint answered with a non-success status.
    #[error("HTTP {status}: {message}")]
    Http { status: u16, message: String },

    /// The remote host could not be reached or timed out.
    #[error("Network unavailable: {0}")]
    Network(String),

    /// The byte stream stopped before the transfer completed.
    #[error("Transfer interrupted: {0}")]
    Interrupted(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl BridgeError {
    /// HTTP status carried by the error, if any.
    pub fn status(&self) -> Option<u16> {
        match self {
            BridgeError::Http { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Whether the underlying filesystem reported a missing path.
    pub fn is_not_found(&self) -> bool {
        match self {
            BridgeError::Io(err) => err.kind() == std::io::ErrorKind::NotFound,
            BridgeError::Http { status, .. } => *status == 404,
            _ => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, BridgeError>;
