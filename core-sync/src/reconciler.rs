//! # Reconciliation / GC
//!
//! Deletes playlist and audio files that no known playlist references.
//!
//! The active set holds, for every playlist, its canonical file name plus the
//! canonical and `.part` names of each of its tracks. A scanned file is
//! deleted only when it is a playlist or audio file and is not in the active
//! set; unrelated files are never touched. Deletion is best-effort per file.

use bridge_traits::storage::FileSystemAccess;
use core_library::{naming, PathResolver, Playlist};
use core_runtime::events::{CoreEvent, EventBus, SyncEvent};
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, instrument, warn};

use crate::error::{Result, SyncError};
use crate::scanner::LocalScanner;

/// Files removed (and not removed) by one purge pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PurgeReport {
    pub purged: Vec<String>,
    pub failed: Vec<String>,
}

impl PurgeReport {
    pub fn is_empty(&self) -> bool {
        self.purged.is_empty() && self.failed.is_empty()
    }
}

/// Names that must survive a purge for the given playlists.
pub fn active_set(playlists: &[Playlist]) -> HashSet<String> {
    let mut active = HashSet::new();
    for playlist in playlists {
        active.insert(playlist.file_name());
        for track in playlist.tracks() {
            let file_name = track.file_name();
            active.insert(naming::partial_file_name(&file_name));
            active.insert(file_name);
        }
    }
    active
}

pub struct Reconciler {
    fs: Arc<dyn FileSystemAccess>,
    resolver: PathResolver,
    scanner: LocalScanner,
    event_bus: EventBus,
    running: Mutex<()>,
}

impl Reconciler {
    pub fn new(fs: Arc<dyn FileSystemAccess>, resolver: PathResolver, event_bus: EventBus) -> Self {
        Self {
            scanner: LocalScanner::new(fs.clone(), resolver.clone()),
            fs,
            resolver,
            event_bus,
            running: Mutex::new(()),
        }
    }

    /// Purge every managed file outside the active set of `playlists`.
    ///
    /// # Errors
    ///
    /// - [`SyncError::PurgeInProgress`] when another purge is running; the
    ///   request is dropped rather than queued
    /// - [`SyncError::StorageUnavailable`] when the document root cannot be
    ///   scanned
    ///
    /// Individual delete failures are logged and reported in
    /// [`PurgeReport::failed`].
    #[instrument(skip(self, playlists), fields(playlists = playlists.len()))]
    pub async fn reconcile_and_purge(&self, playlists: &[Playlist]) -> Result<PurgeReport> {
        let _running = self.running.try_lock().map_err(|_| {
            debug!("Purge requested while another is running");
            SyncError::PurgeInProgress
        })?;

        let active = active_set(playlists);
        let candidates: Vec<String> = self
            .scanner
            .scan()
            .await?
            .into_iter()
            .filter(|file| file.kind.is_managed() && !active.contains(&file.name))
            .map(|file| file.name)
            .collect();

        let mut report = PurgeReport::default();
        for name in candidates {
            match self.fs.delete_file(&self.resolver.resolve(&name)).await {
                Ok(()) => {
                    debug!(file = %name, "Purged");
                    report.purged.push(name);
                }
                Err(e) if e.is_not_found() => {
                    debug!(file = %name, "Already gone");
                }
                Err(e) => {
                    warn!(file = %name, error = %e, "Failed to purge file");
                    report.failed.push(name);
                }
            }
        }

        if !report.is_empty() {
            info!(
                purged = report.purged.len(),
                failed = report.failed.len(),
                "Purge finished"
            );
        }
        self.event_bus
            .emit(CoreEvent::Sync(SyncEvent::Purged {
                purged: report.purged.clone(),
                failed: report.failed.len(),
            }))
            .ok();

        Ok(report)
    }
}
