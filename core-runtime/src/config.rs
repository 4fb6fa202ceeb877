//! # Core Configuration Module
//!
//! Provides configuration management for the mixtape core.
//!
//! ## Overview
//!
//! The configuration system uses a builder to construct a [`CoreConfig`] that
//! holds every capability and setting the core needs. It fails fast when a
//! required bridge is missing so hosts find wiring mistakes at startup rather
//! than on the first download.
//!
//! ## Required Capabilities
//!
//! - `HttpClient` - API calls and file transfers (desktop default: reqwest)
//! - `FileSystemAccess` - Playlist and track files (desktop default: tokio fs)
//!
//! ## Optional Capabilities
//!
//! - `AudioEngine` - Needed only when the host wants the core to drive playback
//! - `Clock` - Defaults to the system clock
//!
//! When the `desktop-shims` feature is enabled, desktop implementations of the
//! required capabilities are injected automatically if not provided.
//!
//! ## Usage
//!
//! ```ignore
//! use core_runtime::config::CoreConfig;
//! use std::sync::Arc;
//!
//! let config = CoreConfig::builder()
//!     .document_root("/var/mobile/Documents")
//!     .playlists_folder("/playlists")
//!     .http_client(Arc::new(MyHttpClient))
//!     .file_system(Arc::new(MyFileSystem))
//!     .audio_engine(Arc::new(MyAudioEngine))
//!     .build()?;
//! ```

use crate::error::{Error, Result};
use crate::events::DEFAULT_EVENT_BUFFER_SIZE;
use crate::logging::LoggingConfig;
use bridge_traits::{AudioEngine, Clock, FileSystemAccess, HttpClient, SystemClock};
use std::path::PathBuf;
use std::sync::Arc;

/// Core configuration for the mixtape core.
///
/// Use [`CoreConfigBuilder`] to construct instances.
#[derive(Clone)]
pub struct CoreConfig {
    /// Directory holding playlist and track files. When `None`, the
    /// file system's own document directory is used.
    pub document_root: Option<PathBuf>,

    /// Remote folder scanned for playlist files (`""` is the provider root).
    pub playlists_folder: String,

    pub http_client: Arc<dyn HttpClient>,

    pub file_system: Arc<dyn FileSystemAccess>,

    pub audio_engine: Option<Arc<dyn AudioEngine>>,

    pub clock: Arc<dyn Clock>,

    /// Broadcast buffer per event subscriber
    pub event_buffer_size: usize,

    pub features: FeatureFlags,

    pub logging: LoggingConfig,
}

impl std::fmt::Debug for CoreConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CoreConfig")
            .field("document_root", &self.document_root)
            .field("playlists_folder", &self.playlists_folder)
            .field("http_client", &"HttpClient { ... }")
            .field("file_system", &"FileSystemAccess { ... }")
            .field(
                "audio_engine",
                &self.audio_engine.as_ref().map(|_| "AudioEngine { ... }"),
            )
            .field("event_buffer_size", &self.event_buffer_size)
            .field("features", &self.features)
            .field("logging", &self.logging)
            .finish()
    }
}

/// Feature flags control optional behaviour.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeatureFlags {
    /// Run a garbage-collection pass whenever the set of playlists changes
    pub purge_on_change: bool,

    /// Serve the cached playlist snapshot when the remote is unreachable
    pub offline_fallback: bool,
}

impl Default for FeatureFlags {
    fn default() -> Self {
        Self {
            purge_on_change: true,
            offline_fallback: true,
        }
    }
}

impl CoreConfig {
    pub fn builder() -> CoreConfigBuilder {
        CoreConfigBuilder::default()
    }

    /// Validates the configuration.
    ///
    /// This checks:
    /// - The document root, when given, is an absolute path
    /// - The playlists folder is empty or starts with `/`
    /// - The event buffer can hold at least one event
    pub fn validate(&self) -> Result<()> {
        if let Some(root) = &self.document_root {
            if root.as_os_str().is_empty() || !root.is_absolute() {
                return Err(Error::Config(format!(
                    "Document root must be an absolute path, got {:?}",
                    root
                )));
            }
        }

        if !self.playlists_folder.is_empty() && !self.playlists_folder.starts_with('/') {
            return Err(Error::Config(format!(
                "Playlists folder must start with '/', got {:?}",
                self.playlists_folder
            )));
        }

        if self.event_buffer_size == 0 {
            return Err(Error::Config(
                "Event buffer size must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }
}

#[cfg(not(feature = "desktop-shims"))]
fn http_client_missing_error() -> Error {
    Error::CapabilityMissing {
        capability: "HttpClient".to_string(),
        message: "No HTTP client implementation provided. \
                 Desktop: enable the 'desktop-shims' feature to use ReqwestHttpClient. \
                 Mobile: inject the platform-native adapter."
            .to_string(),
    }
}

#[cfg(not(feature = "desktop-shims"))]
fn file_system_missing_error() -> Error {
    Error::CapabilityMissing {
        capability: "FileSystemAccess".to_string(),
        message: "No file system implementation provided. \
                 Desktop: enable the 'desktop-shims' feature to use TokioFileSystem. \
                 Mobile: inject an adapter rooted at the app's document directory."
            .to_string(),
    }
}

#[cfg(feature = "desktop-shims")]
fn provide_default_http_client() -> Result<Arc<dyn HttpClient>> {
    Ok(Arc::new(bridge_desktop::ReqwestHttpClient::new()))
}

#[cfg(not(feature = "desktop-shims"))]
fn provide_default_http_client() -> Result<Arc<dyn HttpClient>> {
    Err(http_client_missing_error())
}

#[cfg(feature = "desktop-shims")]
fn provide_default_file_system(document_root: Option<&PathBuf>) -> Result<Arc<dyn FileSystemAccess>> {
    use bridge_desktop::TokioFileSystem;

    let fs = match document_root {
        Some(root) => TokioFileSystem::with_root(root.clone()),
        None => TokioFileSystem::new(),
    };
    Ok(Arc::new(fs))
}

#[cfg(not(feature = "desktop-shims"))]
fn provide_default_file_system(_document_root: Option<&PathBuf>) -> Result<Arc<dyn FileSystemAccess>> {
    Err(file_system_missing_error())
}

/// Builder for constructing [`CoreConfig`] instances.
#[derive(Default)]
pub struct CoreConfigBuilder {
    document_root: Option<PathBuf>,
    playlists_folder: Option<String>,
    http_client: Option<Arc<dyn HttpClient>>,
    file_system: Option<Arc<dyn FileSystemAccess>>,
    audio_engine: Option<Arc<dyn AudioEngine>>,
    clock: Option<Arc<dyn Clock>>,
    event_buffer_size: Option<usize>,
    features: FeatureFlags,
    logging: Option<LoggingConfig>,
}

impl CoreConfigBuilder {
    pub fn document_root<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.document_root = Some(path.into());
        self
    }

    /// Remote folder that holds playlist files. Default: provider root.
    pub fn playlists_folder(mut self, folder: impl Into<String>) -> Self {
        self.playlists_folder = Some(folder.into());
        self
    }

    /// Sets the HTTP client implementation.
    ///
    /// If not provided, the reqwest-based client is used when the
    /// `desktop-shims` feature is enabled.
    pub fn http_client(mut self, client: Arc<dyn HttpClient>) -> Self {
        self.http_client = Some(client);
        self
    }

    /// Sets the file system implementation.
    ///
    /// If not provided, `TokioFileSystem` is used when the `desktop-shims`
    /// feature is enabled.
    pub fn file_system(mut self, fs: Arc<dyn FileSystemAccess>) -> Self {
        self.file_system = Some(fs);
        self
    }

    pub fn audio_engine(mut self, engine: Arc<dyn AudioEngine>) -> Self {
        self.audio_engine = Some(engine);
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    pub fn event_buffer_size(mut self, size: usize) -> Self {
        self.event_buffer_size = Some(size);
        self
    }

    pub fn purge_on_change(mut self, enabled: bool) -> Self {
        self.features.purge_on_change = enabled;
        self
    }

    pub fn offline_fallback(mut self, enabled: bool) -> Self {
        self.features.offline_fallback = enabled;
        self
    }

    pub fn logging(mut self, logging: LoggingConfig) -> Self {
        self.logging = Some(logging);
        self
    }

    /// Builds the configuration, injecting platform defaults where allowed.
    ///
    /// # Errors
    ///
    /// - [`Error::CapabilityMissing`] when a required bridge is absent and no
    ///   default is available
    /// - [`Error::Config`] when validation fails
    pub fn build(self) -> Result<CoreConfig> {
        let http_client = match self.http_client {
            Some(client) => client,
            None => provide_default_http_client()?,
        };

        let file_system = match self.file_system {
            Some(fs) => fs,
            None => provide_default_file_system(self.document_root.as_ref())?,
        };

        let config = CoreConfig {
            document_root: self.document_root,
            playlists_folder: self.playlists_folder.unwrap_or_default(),
            http_client,
            file_system,
            audio_engine: self.audio_engine,
            clock: self.clock.unwrap_or_else(|| Arc::new(SystemClock)),
            event_buffer_size: self.event_buffer_size.unwrap_or(DEFAULT_EVENT_BUFFER_SIZE),
            features: self.features,
            logging: self.logging.unwrap_or_default(),
        };

        config.validate()?;
        Ok(config)
    }
}
