//! # Playback Error Types

use bridge_traits::error::BridgeError;
use thiserror::Error;

/// Errors that can occur during playback operations.
#[derive(Error, Debug)]
pub enum PlaybackError {
    // ========================================================================
    // Queue Errors
    // ========================================================================
    /// Index outside the current queue.
    #[error("Track index {index} out of range for a queue of {len}")]
    InvalidIndex { index: usize, len: usize },

    /// Attempted operation when no track is loaded.
    #[error("No track loaded")]
    NoTrackLoaded,

    /// The engine has not reported a duration for the loaded track yet.
    #[error("Track duration unknown")]
    DurationUnknown,

    // ========================================================================
    // Engine Errors
    // ========================================================================
    /// The host audio engine rejected an operation.
    #[error("Audio engine error: {0}")]
    Engine(#[from] BridgeError),

    /// Fault reported asynchronously by the host audio engine.
    #[error("Audio engine fault: {0}")]
    EngineFault(String),
}

impl PlaybackError {
    /// Engine faults end the playback session.
    pub fn is_engine_fault(&self) -> bool {
        matches!(self, PlaybackError::Engine(_) | PlaybackError::EngineFault(_))
    }
}

/// Result type for playback operations.
pub type Result<T> = std::result::Result<T, PlaybackError>;
