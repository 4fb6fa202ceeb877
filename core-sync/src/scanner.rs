//! Local Store Scanner
//!
//! Enumerates the document root and classifies each file by extension.

use bridge_traits::storage::FileSystemAccess;
use core_library::{LocalFile, PathResolver};
use std::sync::Arc;
use tracing::{debug, instrument, warn};

use crate::error::{Result, SyncError};

/// Reads the document root on every call; nothing is cached between scans.
#[derive(Clone)]
pub struct LocalScanner {
    fs: Arc<dyn FileSystemAccess>,
    resolver: PathResolver,
}

impl LocalScanner {
    pub fn new(fs: Arc<dyn FileSystemAccess>, resolver: PathResolver) -> Self {
        Self { fs, resolver }
    }

    /// List and classify every file directly under the document root,
    /// sorted by name.
    ///
    /// # Errors
    ///
    /// [`SyncError::StorageUnavailable`] when the directory cannot be read.
    #[instrument(skip(self), fields(root = %self.resolver.root().display()))]
    pub async fn scan(&self) -> Result<Vec<LocalFile>> {
        let paths = self
            .fs
            .list_directory(self.resolver.root())
            .await
            .map_err(|e| {
                warn!(error = %e, "Document root is not readable");
                SyncError::from_storage(e)
            })?;

        let mut files: Vec<LocalFile> = paths
            .iter()
            .filter_map(|path| path.file_name()?.to_str().map(LocalFile::new))
            .collect();
        files.sort_by(|a, b| a.name.cmp(&b.name));

        debug!(count = files.len(), "Scanned document root");
        Ok(files)
    }
}
