//! On-disk playlist files
//!
//! Each known playlist is persisted as one JSON file named by
//! [`Playlist::file_name`] directly under the document root.

use bridge_traits::storage::FileSystemAccess;
use bytes::Bytes;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, instrument, warn};

use crate::error::{LibraryError, Result};
use crate::library::PlaylistLibrary;
use crate::models::{FileKind, Playlist, PlaylistData};
use crate::naming::{self, PathResolver};

/// Reads and writes playlist snapshots through [`FileSystemAccess`].
///
/// Writes are serialized. Playlists whose titles normalize to the same name
/// share one file, and the last write wins.
pub struct PlaylistStore {
    fs: Arc<dyn FileSystemAccess>,
    resolver: PathResolver,
    write_lock: Mutex<()>,
}

impl PlaylistStore {
    pub fn new(fs: Arc<dyn FileSystemAccess>, resolver: PathResolver) -> Self {
        Self {
            fs,
            resolver,
            write_lock: Mutex::new(()),
        }
    }

    pub fn resolver(&self) -> &PathResolver {
        &self.resolver
    }

    /// Write `playlist` to its canonical file, replacing older contents.
    #[instrument(skip(self, playlist), fields(path = %playlist.meta.path))]
    pub async fn save(&self, playlist: &Playlist) -> Result<PathBuf> {
        let _guard = self.write_lock.lock().await;
        self.write(playlist).await
    }

    /// Write the library's copy of the playlist at `path`, if it has one.
    ///
    /// The copy is taken after the write lock is acquired, so the last
    /// write always carries the newest state.
    #[instrument(skip(self, library))]
    pub async fn save_current(
        &self,
        library: &PlaylistLibrary,
        path: &str,
    ) -> Result<Option<PathBuf>> {
        let _guard = self.write_lock.lock().await;
        match library.get(path) {
            Some(playlist) => self.write(&playlist).await.map(Some),
            None => Ok(None),
        }
    }

    async fn write(&self, playlist: &Playlist) -> Result<PathBuf> {
        playlist
            .validate()
            .map_err(|message| LibraryError::InvalidInput {
                field: "playlist".to_string(),
                message,
            })?;

        let json = serde_json::to_vec_pretty(playlist)?;
        let path = self.resolver.playlist_path(playlist);

        self.fs.create_dir_all(self.resolver.root()).await?;
        self.fs.write_file(&path, Bytes::from(json)).await?;

        debug!(file = %playlist.file_name(), "Saved playlist file");
        Ok(path)
    }

    /// Read one playlist file by its canonical name.
    pub async fn load(&self, file_name: &str) -> Result<Playlist> {
        let path = self.resolver.resolve(file_name);
        let bytes = self.fs.read_file(&path).await?;

        serde_json::from_slice(&bytes).map_err(|e| LibraryError::Malformed {
            file: file_name.to_string(),
            message: e.to_string(),
        })
    }

    /// Load every playlist file under the document root.
    ///
    /// Files that cannot be read or parsed are skipped with a warning.
    #[instrument(skip(self))]
    pub async fn load_all(&self) -> Result<Vec<Playlist>> {
        let root = self.resolver.root();
        if !self.fs.exists(root).await? {
            return Ok(Vec::new());
        }

        let mut names: Vec<String> = self
            .fs
            .list_directory(root)
            .await?
            .iter()
            .filter_map(|path| path.file_name()?.to_str().map(str::to_string))
            .filter(|name| naming::classify(name) == FileKind::Playlist)
            .collect();
        names.sort();

        let mut playlists = Vec::with_capacity(names.len());
        for name in names {
            match self.load(&name).await {
                Ok(playlist) => playlists.push(playlist),
                Err(e) => warn!(file = %name, error = %e, "Skipping unreadable playlist file"),
            }
        }

        debug!(count = playlists.len(), "Loaded playlist files");
        Ok(playlists)
    }

    /// Remove the playlist's file. A file that is already gone is not an error.
    pub async fn delete(&self, playlist: &Playlist) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        let path = self.resolver.playlist_path(playlist);
        match self.fs.delete_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.is_not_found() => {
                debug!(file = %playlist.file_name(), "Playlist file already absent");
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }
}

/// Decode the remote body of a playlist file (title and tracks only).
pub fn decode_remote(name: &str, bytes: &[u8]) -> Result<PlaylistData> {
    serde_json::from_slice(bytes).map_err(|e| LibraryError::Malformed {
        file: name.to_string(),
        message: e.to_string(),
    })
}

/// Encode the remote body of a playlist file.
pub fn encode_remote(data: &PlaylistData) -> Result<Bytes> {
    Ok(Bytes::from(serde_json::to_vec(data)?))
}
