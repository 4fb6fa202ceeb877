//! Playback bridge traits and supporting audio types.
//!
//! The core never decodes audio itself. Hosts provide an [`AudioEngine`] that
//! loads a source into a handle and exposes transport primitives on it; the
//! core owns the policy of which handle is live and when to switch.

use async_trait::async_trait;
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;
use uuid::Uuid;

use crate::error::Result;

/// Audio source descriptor provided to the engine.
#[derive(Debug, Clone, PartialEq)]
pub enum AudioSource {
    /// Local file accessible to the host runtime.
    LocalFile { path: PathBuf },
    /// Remote HTTP(S) stream to be fetched by the host.
    RemoteStream {
        url: String,
        headers: HashMap<String, String>,
    },
}

impl AudioSource {
    /// Determine whether the source represents remote content.
    pub fn is_remote(&self) -> bool {
        matches!(self, AudioSource::RemoteStream { .. })
    }
}

/// Opaque identifier for a sound loaded into the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AudioHandle(Uuid);

impl AudioHandle {
    /// Generate a new handle identifier.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Borrow the underlying UUID.
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for AudioHandle {
    fn default() -> Self {
        Self::new()
    }
}

/// Snapshot of a loaded sound, as reported by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct EngineStatus {
    pub position: Duration,
    pub duration: Option<Duration>,
    pub is_playing: bool,
    /// True exactly once, on the update where playback reached the end.
    pub did_just_finish: bool,
}

/// Host audio engine.
///
/// Status changes are pushed by the host into the core; `status` is the pull
/// variant used when the core needs a fresh reading (e.g. before seeking).
#[async_trait]
pub trait AudioEngine: Send + Sync {
    /// Load a source and return a handle to it. Loading does not start playback.
    async fn load(&self, source: AudioSource) -> Result<AudioHandle>;

    async fn play(&self, handle: AudioHandle) -> Result<()>;

    async fn pause(&self, handle: AudioHandle) -> Result<()>;

    /// Move the playhead to an absolute position.
    async fn seek(&self, handle: AudioHandle, position: Duration) -> Result<()>;

    async fn status(&self, handle: AudioHandle) -> Result<EngineStatus>;

    /// Release every resource held by `handle`.
    async fn unload(&self, handle: AudioHandle) -> Result<()>;
}
