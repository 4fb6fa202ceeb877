//! # Host Capabilities
//!
//! Everything the mixtape core needs from its host, expressed as traits so
//! desktop, iOS and Android can each plug in native implementations.
//!
//! | Module | Capability |
//! |--------|------------|
//! | [`http`] | [`HttpClient`]: JSON calls and resumable file transfers |
//! | [`storage`] | [`FileSystemAccess`] for the document directory, [`StorageProvider`] for the cloud account |
//! | [`playback`] | [`AudioEngine`]: load, play, pause, seek, unload |
//! | [`time`] | [`Clock`] and [`LoggerSink`] |
//!
//! `bridge-desktop` implements `HttpClient` and `FileSystemAccess` for
//! desktop targets; `provider-dropbox` implements `StorageProvider`.
//!
//! Every fallible method returns [`BridgeError`]. Implementations keep the
//! HTTP status in [`BridgeError::Http`] and report a broken body stream as
//! [`BridgeError::Interrupted`], so the core can tell a resumable transfer
//! from a permanent failure without parsing messages.

pub mod error;
pub mod http;
pub mod playback;
pub mod storage;
pub mod time;

pub use error::BridgeError;

pub use http::{
    HttpClient, HttpMethod, HttpRequest, HttpResponse, ProgressCallback, RetryPolicy,
    TransferProgress,
};
pub use playback::{AudioEngine, AudioHandle, AudioSource, EngineStatus};
pub use storage::{
    Credentials, EntryTag, FileMetadata, FileSystemAccess, RemoteFile, StorageProvider,
    UploadMode,
};
pub use time::{Clock, LogEntry, LogLevel, LoggerSink, SystemClock};
