use bridge_traits::error::BridgeError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum LibraryError {
    #[error("Bridge error: {0}")]
    Bridge(#[from] BridgeError),

    #[error("Entity not found: {entity_type} with id {id}")]
    NotFound { entity_type: String, id: String },

    #[error("Invalid input: {field} - {message}")]
    InvalidInput { field: String, message: String },

    #[error("Malformed playlist file {file}: {message}")]
    Malformed { file: String, message: String },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl LibraryError {
    pub fn playlist_not_found(path: impl Into<String>) -> Self {
        LibraryError::NotFound {
            entity_type: "Playlist".to_string(),
            id: path.into(),
        }
    }

    pub fn track_not_found(id: impl Into<String>) -> Self {
        LibraryError::NotFound {
            entity_type: "Track".to_string(),
            id: id.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, LibraryError>;
