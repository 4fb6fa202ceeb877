//! # Sync Coordinator
//!
//! Keeps remote playlist state, local playlist files and track download
//! status in agreement.
//!
//! ## Overview
//!
//! The `SyncCoordinator` ties together:
//! - the remote listing normalizer, to discover playlist files
//! - the `PlaylistStore`, for offline copies of every playlist
//! - the `DownloadManager`, for per-track transfers
//! - the `Reconciler`, to purge files no playlist references
//!
//! ## Workflow
//!
//! ### Startup
//! 1. `load_local` reads every playlist file under the document root
//! 2. Track statuses are re-derived from the files present on disk
//!
//! ### Refresh
//! 1. List the remote playlist folder and normalize the entries
//! 2. Resolve `modified_by` ids to owner names
//! 3. Fetch the body of every playlist whose revision changed
//! 4. Persist and upsert; purge if anything changed
//!
//! ### Select
//! 1. Fetch the playlist's remote metadata
//! 2. Re-fetch the body only when the revision differs from the cached copy
//! 3. Fall back to the cached copy when the provider is unreachable
//! 4. Seed every track's status from the local file system
//!
//! Credentials are passed into every call that reaches the provider; the
//! coordinator never stores them.

use bridge_traits::http::HttpClient;
use bridge_traits::storage::{Credentials, FileSystemAccess, StorageProvider, UploadMode};
use core_library::store::{decode_remote, encode_remote};
use core_library::{
    naming, LibraryError, PathResolver, Playlist, PlaylistData, PlaylistLibrary, PlaylistMeta,
    PlaylistStore, RemoteEntry, Track, UpsertOutcome,
};
use core_runtime::events::{CoreEvent, EventBus, LibraryEvent, SyncEvent};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, error, info, instrument, warn};

use crate::download::{ActivityMark, DownloadManager, DownloadSession};
use crate::error::{Result, SyncError};
use crate::listing;
use crate::reconciler::{PurgeReport, Reconciler};

/// Sync coordinator configuration
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Remote folder holding playlist files; empty for the provider root
    pub playlists_folder: String,

    /// Purge unreferenced files whenever the playlist set changes
    pub purge_on_change: bool,

    /// Serve the cached copy from `select_playlist` when offline
    pub offline_fallback: bool,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            playlists_folder: String::new(),
            purge_on_change: true,
            offline_fallback: true,
        }
    }
}

/// Summary of one `refresh_playlists` pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RefreshReport {
    /// Playlist files found remotely
    pub playlists: usize,
    /// Playlists inserted or updated locally
    pub changed: usize,
    /// Purge triggered by the change, if one ran
    pub purge: Option<PurgeReport>,
}

pub struct SyncCoordinator {
    config: SyncConfig,
    provider: Arc<dyn StorageProvider>,
    library: PlaylistLibrary,
    store: Arc<PlaylistStore>,
    downloads: DownloadManager,
    reconciler: Reconciler,
    event_bus: EventBus,
    /// Account id to display name
    owners: RwLock<HashMap<String, String>>,
}

impl SyncCoordinator {
    /// Create a coordinator rooted at `document_root`.
    ///
    /// # Example
    ///
    /// ```rust,ignore
    /// use core_sync::{SyncConfig, SyncCoordinator};
    ///
    /// let coordinator = SyncCoordinator::new(
    ///     SyncConfig::default(),
    ///     provider,
    ///     http_client,
    ///     file_system,
    ///     document_root,
    ///     event_bus,
    /// );
    /// coordinator.load_local().await?;
    /// coordinator.refresh_playlists(&credentials).await?;
    /// ```
    pub fn new(
        config: SyncConfig,
        provider: Arc<dyn StorageProvider>,
        http_client: Arc<dyn HttpClient>,
        file_system: Arc<dyn FileSystemAccess>,
        document_root: PathBuf,
        event_bus: EventBus,
    ) -> Self {
        let resolver = PathResolver::new(document_root);
        let library = PlaylistLibrary::new();
        let store = Arc::new(PlaylistStore::new(file_system.clone(), resolver.clone()));

        let downloads = DownloadManager::new(
            provider.clone(),
            http_client,
            file_system.clone(),
            resolver.clone(),
            library.clone(),
            store.clone(),
            event_bus.clone(),
        );
        let reconciler = Reconciler::new(file_system, resolver, event_bus.clone());

        Self {
            config,
            provider,
            library,
            store,
            downloads,
            reconciler,
            event_bus,
            owners: RwLock::new(HashMap::new()),
        }
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    pub fn library(&self) -> &PlaylistLibrary {
        &self.library
    }

    pub fn downloads(&self) -> &DownloadManager {
        &self.downloads
    }

    /// Display name of an account seen in a listing.
    pub fn owner_name(&self, account_id: &str) -> Option<String> {
        self.owners.read().get(account_id).cloned()
    }

    // =========================================================================
    // Playlists
    // =========================================================================

    /// Load every playlist file from the document root into the library.
    #[instrument(skip(self))]
    pub async fn load_local(&self) -> Result<usize> {
        let playlists = self.store.load_all().await?;
        let count = playlists.len();

        for mut playlist in playlists {
            let mark = self.seed_statuses(&mut playlist).await?;
            self.downloads.upsert_playlist(playlist, &mark);
        }

        info!(count, "Loaded local playlists");
        self.event_bus
            .emit(CoreEvent::Library(LibraryEvent::PlaylistsLoaded { count }))
            .ok();
        Ok(count)
    }

    /// List the remote playlist folder and pull every changed playlist.
    #[instrument(skip(self, credentials), fields(folder = %self.config.playlists_folder))]
    pub async fn refresh_playlists(&self, credentials: &Credentials) -> Result<RefreshReport> {
        let folder = self.config.playlists_folder.clone();
        self.event_bus
            .emit(CoreEvent::Sync(SyncEvent::RefreshStarted {
                folder: folder.clone(),
            }))
            .ok();

        let entries = match self.provider.list_folder(credentials, &folder).await {
            Ok(files) => listing::normalize(files),
            Err(e) => return Err(self.report_failure(SyncError::from_remote(e, &folder))),
        };
        self.refresh_owners(credentials, &entries).await;

        let mut report = RefreshReport::default();
        for entry in entries.iter().filter(|e| e.is_playlist) {
            let Some(path) = entry.path.clone() else {
                warn!(name = %entry.name, "Playlist entry without a path");
                continue;
            };
            report.playlists += 1;

            let meta = PlaylistMeta::from_entry(entry);
            if let Some(cached) = self.library.get(&path) {
                if !cached.meta.differs_from(&meta) {
                    debug!(path = %path, "Playlist unchanged");
                    continue;
                }
            }

            match self.fetch_playlist(credentials, meta).await {
                Ok(mut playlist) => {
                    let rev = playlist.meta.rev.clone();
                    let mark = self.seed_statuses(&mut playlist).await?;
                    let (_, outcome) = self.commit(playlist, &mark).await?;
                    if outcome.is_change() {
                        report.changed += 1;
                        self.event_bus
                            .emit(CoreEvent::Sync(SyncEvent::PlaylistChanged { path, rev }))
                            .ok();
                    }
                }
                Err(e @ SyncError::AuthRejected(_)) => return Err(self.report_failure(e)),
                Err(e) => {
                    warn!(path = %path, error = %e, "Skipping playlist that could not be fetched");
                }
            }
        }

        info!(
            playlists = report.playlists,
            changed = report.changed,
            "Refresh completed"
        );
        self.event_bus
            .emit(CoreEvent::Sync(SyncEvent::RefreshCompleted {
                playlists: report.playlists,
                changed: report.changed,
            }))
            .ok();

        if report.changed > 0 {
            report.purge = self.purge_if_enabled().await;
        }
        Ok(report)
    }

    /// Bring one playlist up to date and seed its tracks' statuses.
    ///
    /// Download is not started for any track.
    #[instrument(skip(self, credentials))]
    pub async fn select_playlist(
        &self,
        credentials: &Credentials,
        remote_path: &str,
    ) -> Result<Playlist> {
        let cached = self.library.get(remote_path);

        let (mut playlist, remote_changed) =
            match self.provider.get_metadata(credentials, remote_path).await {
                Ok(file) => {
                    let meta = PlaylistMeta::from_entry(&listing::normalize_entry(file));
                    match cached {
                        Some(cached) if !cached.meta.differs_from(&meta) => (cached, false),
                        _ => {
                            let playlist = self
                                .fetch_playlist(credentials, meta)
                                .await
                                .map_err(|e| self.report_failure(e))?;
                            (playlist, true)
                        }
                    }
                }
                Err(e) => {
                    let error = SyncError::from_remote(e, remote_path);
                    match cached {
                        Some(cached) if error.is_recoverable() && self.config.offline_fallback => {
                            warn!(error = %error, "Provider unreachable, using cached playlist");
                            (cached, false)
                        }
                        _ => return Err(self.report_failure(error)),
                    }
                }
            };

        let mark = self.seed_statuses(&mut playlist).await?;
        let (playlist, _) = self.commit(playlist, &mark).await?;

        if remote_changed {
            self.event_bus
                .emit(CoreEvent::Sync(SyncEvent::PlaylistChanged {
                    path: playlist.meta.path.clone(),
                    rev: playlist.meta.rev.clone(),
                }))
                .ok();
            self.purge_if_enabled().await;
        }

        Ok(playlist)
    }

    /// Upload a playlist under the remote folder and keep a local copy.
    ///
    /// Download statuses are local state and are stripped from the upload.
    #[instrument(skip(self, credentials, tracks), fields(tracks = tracks.len()))]
    pub async fn save_playlist(
        &self,
        credentials: &Credentials,
        title: &str,
        tracks: Vec<Track>,
    ) -> Result<Playlist> {
        let title = title.trim();
        if title.is_empty() {
            return Err(SyncError::InvalidInput {
                field: "title".to_string(),
                message: "Playlist title cannot be empty".to_string(),
            });
        }

        let data = PlaylistData {
            title: title.to_string(),
            tracks: tracks
                .into_iter()
                .map(|mut track| {
                    track.download_status = None;
                    track
                })
                .collect(),
        };
        data.tracks
            .iter()
            .try_for_each(Track::validate)
            .map_err(|message| SyncError::InvalidInput {
                field: "tracks".to_string(),
                message,
            })?;

        let remote_path = remote_file_path(
            &self.config.playlists_folder,
            &naming::playlist_file_name(title),
        );
        let file = self
            .provider
            .upload(
                credentials,
                &remote_path,
                encode_remote(&data)?,
                UploadMode::default(),
            )
            .await
            .map_err(|e| self.report_failure(SyncError::from_remote(e, &remote_path)))?;

        let meta = PlaylistMeta::from_entry(&listing::normalize_entry(file));
        let mut playlist = Playlist::new(meta, data);
        let mark = self.seed_statuses(&mut playlist).await?;
        let (playlist, _) = self.commit(playlist, &mark).await?;

        info!(path = %playlist.meta.path, "Playlist saved");
        self.event_bus
            .emit(CoreEvent::Library(LibraryEvent::PlaylistSaved {
                path: playlist.meta.path.clone(),
                title: playlist.data.title.clone(),
            }))
            .ok();

        self.purge_if_enabled().await;
        Ok(playlist)
    }

    /// Forget a playlist locally and purge the files only it referenced.
    ///
    /// The playlist file stays when another playlist still uses the same
    /// file name.
    #[instrument(skip(self))]
    pub async fn delete_playlist(&self, remote_path: &str) -> Result<PurgeReport> {
        let playlist = self
            .library
            .get(remote_path)
            .ok_or_else(|| LibraryError::playlist_not_found(remote_path))?;

        match self.file_name_sharer(&playlist) {
            Some(other) => {
                debug!(shared_with = %other, "Keeping playlist file used by another playlist");
                self.library.remove(remote_path);
                // Rewrite the file from the survivor in case it held the deleted copy
                self.store.save_current(&self.library, &other).await?;
            }
            None => {
                self.store.delete(&playlist).await?;
                self.library.remove(remote_path);
            }
        }

        info!(title = %playlist.data.title, "Playlist deleted");
        self.event_bus
            .emit(CoreEvent::Library(LibraryEvent::PlaylistDeleted {
                path: remote_path.to_string(),
            }))
            .ok();

        match self.purge().await {
            Err(SyncError::PurgeInProgress) => Ok(PurgeReport::default()),
            other => other,
        }
    }

    /// Normalized listing of any remote folder.
    #[instrument(skip(self, credentials))]
    pub async fn browse(&self, credentials: &Credentials, path: &str) -> Result<Vec<RemoteEntry>> {
        let files = self
            .provider
            .list_folder(credentials, path)
            .await
            .map_err(|e| self.report_failure(SyncError::from_remote(e, path)))?;
        Ok(listing::normalize(files))
    }

    // =========================================================================
    // Downloads
    // =========================================================================

    pub fn request_download(
        &self,
        credentials: &Credentials,
        track_id: &str,
    ) -> Result<DownloadSession> {
        let track = self
            .library
            .track(track_id)
            .ok_or_else(|| LibraryError::track_not_found(track_id))?;
        self.downloads.download(credentials, &track)
    }

    pub fn cancel_download(&self, track_id: &str) -> bool {
        self.downloads.cancel(track_id)
    }

    pub async fn is_downloaded(&self, track: &Track) -> Result<Track> {
        self.downloads.is_downloaded(track).await
    }

    // =========================================================================
    // Purge
    // =========================================================================

    /// Purge against the current library contents.
    pub async fn purge(&self) -> Result<PurgeReport> {
        self.reconciler
            .reconcile_and_purge(&self.library.list())
            .await
    }

    async fn purge_if_enabled(&self) -> Option<PurgeReport> {
        if !self.config.purge_on_change {
            return None;
        }

        match self.purge().await {
            Ok(report) => Some(report),
            Err(SyncError::PurgeInProgress) => None,
            Err(e) => {
                warn!(error = %e, "Purge after playlist change failed");
                None
            }
        }
    }

    // =========================================================================
    // Helpers
    // =========================================================================

    async fn fetch_playlist(&self, credentials: &Credentials, meta: PlaylistMeta) -> Result<Playlist> {
        let bytes = self
            .provider
            .download(credentials, &meta.path)
            .await
            .map_err(|e| SyncError::from_remote(e, &meta.path))?;
        let data = decode_remote(&meta.name, &bytes)?;

        Ok(Playlist::new(meta, data))
    }

    /// Status of every track from disk, except tracks with a running session.
    ///
    /// The returned mark lets [`commit`](Self::commit) keep any status a
    /// download changed while the file system was being checked.
    async fn seed_statuses(&self, playlist: &mut Playlist) -> Result<ActivityMark> {
        let mark = self.downloads.mark();
        for track in playlist.data.tracks.iter_mut() {
            if self.downloads.is_active(&track.id) {
                track.download_status = self
                    .library
                    .track(&track.id)
                    .and_then(|t| t.download_status);
                continue;
            }
            track.download_status = self.downloads.is_downloaded(track).await?.download_status;
        }
        Ok(mark)
    }

    /// Upsert into the library and rewrite the local file when it changed.
    ///
    /// Returns the library's copy after the merge.
    async fn commit(
        &self,
        playlist: Playlist,
        mark: &ActivityMark,
    ) -> Result<(Playlist, UpsertOutcome)> {
        let path = playlist.meta.path.clone();
        let outcome = self.downloads.upsert_playlist(playlist, mark);

        let merged = self
            .library
            .get(&path)
            .ok_or_else(|| LibraryError::playlist_not_found(&path))?;
        if let Some(other) = self.file_name_sharer(&merged) {
            warn!(
                path = %path,
                shared_with = %other,
                file = %merged.file_name(),
                "Playlists share a local file; only the last one written survives a restart"
            );
        }
        if outcome.is_change() {
            self.store.save_current(&self.library, &path).await?;
        }
        Ok((merged, outcome))
    }

    /// Path of another library playlist stored under the same file name.
    fn file_name_sharer(&self, playlist: &Playlist) -> Option<String> {
        let file_name = playlist.file_name();
        self.library
            .list()
            .into_iter()
            .find(|p| p.meta.path != playlist.meta.path && p.file_name() == file_name)
            .map(|p| p.meta.path)
    }

    async fn refresh_owners(&self, credentials: &Credentials, entries: &[RemoteEntry]) {
        let ids: Vec<String> = listing::modified_users(entries)
            .into_iter()
            .filter(|id| !self.owners.read().contains_key(id))
            .collect();
        if ids.is_empty() {
            return;
        }

        match self.provider.account_display_names(credentials, &ids).await {
            Ok(names) => self.owners.write().extend(names),
            Err(e) => warn!(error = %e, "Could not resolve playlist owners"),
        }
    }

    /// Log a failure in full and announce it before returning it.
    fn report_failure(&self, error: SyncError) -> SyncError {
        error!(error = ?error, "Sync operation failed");
        self.event_bus
            .emit(CoreEvent::Sync(SyncEvent::Failed {
                message: error.to_string(),
                recoverable: error.is_recoverable(),
            }))
            .ok();
        error
    }
}

fn remote_file_path(folder: &str, file_name: &str) -> String {
    format!("{}/{}", folder.trim_end_matches('/'), file_name)
}
