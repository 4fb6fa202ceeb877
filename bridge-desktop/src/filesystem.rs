//! `FileSystemAccess` backed by `tokio::fs`.

use async_trait::async_trait;
use bridge_traits::{
    error::Result,
    storage::{FileMetadata, FileSystemAccess},
};
use bytes::Bytes;
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;
use tokio::fs;
use tracing::trace;

/// Paths handed to this type are used as given; only
/// [`get_document_directory`](FileSystemAccess::get_document_directory)
/// knows about the root, which it creates on first use.
pub struct TokioFileSystem {
    document_dir: PathBuf,
}

fn platform_document_dir() -> PathBuf {
    let base = dirs::data_dir()
        .or_else(|| dirs::home_dir().map(|home| home.join(".local").join("share")))
        .unwrap_or_else(|| PathBuf::from("."));
    base.join("mixtape")
}

impl TokioFileSystem {
    pub fn new() -> Self {
        Self::with_root(platform_document_dir())
    }

    pub fn with_root(document_dir: PathBuf) -> Self {
        Self { document_dir }
    }
}

impl Default for TokioFileSystem {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl FileSystemAccess for TokioFileSystem {
    async fn get_document_directory(&self) -> Result<PathBuf> {
        fs::create_dir_all(&self.document_dir).await?;
        Ok(self.document_dir.clone())
    }

    async fn exists(&self, path: &Path) -> Result<bool> {
        Ok(fs::try_exists(path).await?)
    }

    async fn metadata(&self, path: &Path) -> Result<FileMetadata> {
        let stat = fs::metadata(path).await?;
        let modified_at = stat
            .modified()
            .ok()
            .and_then(|time| time.duration_since(UNIX_EPOCH).ok())
            .and_then(|since| i64::try_from(since.as_secs()).ok());

        Ok(FileMetadata {
            size: stat.len(),
            modified_at,
            is_directory: stat.is_dir(),
        })
    }

    async fn create_dir_all(&self, path: &Path) -> Result<()> {
        Ok(fs::create_dir_all(path).await?)
    }

    async fn read_file(&self, path: &Path) -> Result<Bytes> {
        Ok(fs::read(path).await.map(Bytes::from)?)
    }

    async fn write_file(&self, path: &Path, data: Bytes) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }
        fs::write(path, &data).await?;
        trace!(path = ?path, bytes = data.len(), "File written");
        Ok(())
    }

    async fn delete_file(&self, path: &Path) -> Result<()> {
        fs::remove_file(path).await?;
        trace!(path = ?path, "File removed");
        Ok(())
    }

    async fn rename(&self, from: &Path, to: &Path) -> Result<()> {
        Ok(fs::rename(from, to).await?)
    }

    async fn list_directory(&self, path: &Path) -> Result<Vec<PathBuf>> {
        let mut dir = fs::read_dir(path).await?;
        let mut paths = Vec::new();
        while let Some(entry) = dir.next_entry().await? {
            paths.push(entry.path());
        }
        Ok(paths)
    }
}
