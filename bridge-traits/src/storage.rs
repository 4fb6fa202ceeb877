//! Local file access and the remote storage provider.
//!
//! The core keeps every playlist and track in one flat document directory
//! ([`FileSystemAccess`]) and mirrors a folder of a cloud account
//! ([`StorageProvider`]).

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};

use crate::error::Result;
use crate::http::HttpRequest;

#[derive(Debug, Clone)]
pub struct FileMetadata {
    pub size: u64,
    /// Seconds since the Unix epoch.
    pub modified_at: Option<i64>,
    pub is_directory: bool,
}

/// Sandboxed local storage.
///
/// Paths are absolute. Callers join file names onto
/// [`get_document_directory`](Self::get_document_directory) themselves.
/// Missing files surface as [`BridgeError::Io`](crate::BridgeError::Io) with
/// kind `NotFound`.
#[async_trait]
pub trait FileSystemAccess: Send + Sync {
    /// Directory holding playlist and track files, created if absent.
    async fn get_document_directory(&self) -> Result<PathBuf>;

    async fn exists(&self, path: &Path) -> Result<bool>;

    async fn metadata(&self, path: &Path) -> Result<FileMetadata>;

    async fn create_dir_all(&self, path: &Path) -> Result<()>;

    async fn read_file(&self, path: &Path) -> Result<Bytes>;

    /// Create or truncate `path`, creating missing parents.
    async fn write_file(&self, path: &Path, data: Bytes) -> Result<()>;

    async fn delete_file(&self, path: &Path) -> Result<()>;

    /// Move `from` to `to`, replacing an existing `to`.
    async fn rename(&self, from: &Path, to: &Path) -> Result<()>;

    /// Full paths of the direct children of `path`, in no particular order.
    async fn list_directory(&self, path: &Path) -> Result<Vec<PathBuf>>;
}

/// Bearer credentials for one remote call.
///
/// Produced from the auth state at call time and passed explicitly to every
/// provider operation.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub access_token: String,
    pub account_id: Option<String>,
}

impl Credentials {
    pub fn new(access_token: impl Into<String>) -> Self {
        Self {
            access_token: access_token.into(),
            account_id: None,
        }
    }

    pub fn with_account(mut self, account_id: impl Into<String>) -> Self {
        self.account_id = Some(account_id.into());
        self
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("access_token", &"[REDACTED]")
            .field("account_id", &self.account_id)
            .finish()
    }
}

/// Provider-native entry kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryTag {
    File,
    Folder,
    Deleted,
}

/// Raw entry returned by a remote listing.
///
/// Only `tag` and `name` are guaranteed; everything else depends on the
/// entry kind and on what the provider chose to include.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteFile {
    pub tag: EntryTag,
    pub name: String,
    pub id: Option<String>,
    pub path_lower: Option<String>,
    pub path_display: Option<String>,
    pub rev: Option<String>,
    pub server_modified: Option<DateTime<Utc>>,
    pub size: Option<u64>,
    pub modified_by: Option<String>,
}

impl RemoteFile {
    pub fn new(tag: EntryTag, name: impl Into<String>) -> Self {
        Self {
            tag,
            name: name.into(),
            id: None,
            path_lower: None,
            path_display: None,
            rev: None,
            server_modified: None,
            size: None,
            modified_by: None,
        }
    }
}

/// Write conflict behaviour for uploads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UploadMode {
    /// Replace an existing file instead of failing or adding a copy.
    pub overwrite: bool,
    /// Suppress the provider's change notification to other clients.
    pub mute: bool,
    /// Let the provider pick a different name on conflict.
    pub autorename: bool,
}

impl Default for UploadMode {
    fn default() -> Self {
        Self {
            overwrite: true,
            mute: true,
            autorename: false,
        }
    }
}

/// A cloud backend.
/// Paths are provider paths such as
/// `/playlists/road trip.mix`; an empty string is the provider root.
#[async_trait]
pub trait StorageProvider: Send + Sync {
    /// List every entry directly under `path`, following pagination.
    async fn list_folder(&self, credentials: &Credentials, path: &str) -> Result<Vec<RemoteFile>>;

    /// Fetch metadata for a single entry.
    async fn get_metadata(&self, credentials: &Credentials, path: &str) -> Result<RemoteFile>;

    /// Download a small file fully into memory.
    async fn download(&self, credentials: &Credentials, path: &str) -> Result<Bytes>;

    /// Build the authenticated request used to stream `path` to disk.
    fn download_request(&self, credentials: &Credentials, path: &str) -> Result<HttpRequest>;

    /// Upload `contents` to `path`, returning the stored entry.
    async fn upload(
        &self,
        credentials: &Credentials,
        path: &str,
        contents: Bytes,
        mode: UploadMode,
    ) -> Result<RemoteFile>;

    /// Resolve account ids to display names.
    ///
    /// Ids the provider does not know are absent from the returned map.
    async fn account_display_names(
        &self,
        credentials: &Credentials,
        account_ids: &[String],
    ) -> Result<HashMap<String, String>>;
}
