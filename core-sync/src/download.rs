//! # Download Manager
//!
//! Per-track resumable downloads with progress tracking and supersession.
//!
//! ## Overview
//!
//! - Every call to [`DownloadManager::download`] opens a new session with a
//!   fresh generation number and cancels the previous session of the same
//!   track. Progress from a session is applied only while its generation is
//!   still the active one for the track, so late callbacks are discarded.
//! - Bytes are written to `<canonical>.part` and renamed to the canonical
//!   name on success. A later session resumes the partial file with a
//!   ranged request.
//! - `download_status` follows `floor(written / total * 100)` clamped to
//!   `0..=99` while bytes arrive and becomes `100` once the file is in place.
//! - Interrupted transfers keep their partial file and last status. Any other
//!   failure resets the status to `None`.
//!
//! There is no overall timeout: a session runs until it completes, is
//! cancelled or fails.

use bridge_traits::error::BridgeError;
use bridge_traits::http::{HttpClient, HttpRequest, ProgressCallback, TransferProgress};
use bridge_traits::storage::{Credentials, FileSystemAccess, StorageProvider};
use core_library::{
    PathResolver, Playlist, PlaylistLibrary, PlaylistStore, Track, UpsertOutcome,
    DOWNLOAD_COMPLETE, DOWNLOAD_IN_PROGRESS_MAX,
};
use core_runtime::events::{CoreEvent, DownloadEvent, EventBus};
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, info_span, instrument, warn, Instrument};

use crate::error::{Result, SyncError};

const RANGE_NOT_SATISFIABLE: u16 = 416;

/// Percentage for an in-flight transfer, `None` while the size is unknown.
pub fn progress_percent(progress: TransferProgress) -> Option<u8> {
    let total = progress.total_bytes.filter(|total| *total > 0)?;
    let percent = u128::from(progress.bytes_written) * 100 / u128::from(total);
    Some(percent.min(u128::from(DOWNLOAD_IN_PROGRESS_MAX)) as u8)
}

/// How a session ended when it did not fail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DownloadOutcome {
    /// The canonical file is in place
    Completed { file_name: String },
    /// Cancelled on request; the partial file is kept
    Cancelled,
    /// A newer session for the same track took over
    Superseded,
}

struct ActiveSession {
    generation: u64,
    token: CancellationToken,
}

#[derive(Default)]
struct SessionTable {
    active: HashMap<String, ActiveSession>,
    /// Generation of the newest session ever started per track
    started: HashMap<String, u64>,
}

impl SessionTable {
    fn current(&self, track_id: &str) -> Option<u64> {
        self.active.get(track_id).map(|s| s.generation)
    }
}

/// Download activity at one point in time, see [`DownloadManager::mark`].
#[derive(Debug, Clone, Default)]
pub struct ActivityMark {
    generation: u64,
    active: HashSet<String>,
}

/// Handle to one in-flight transfer.
pub struct DownloadSession {
    track_id: String,
    generation: u64,
    token: CancellationToken,
    handle: JoinHandle<Result<DownloadOutcome>>,
}

impl DownloadSession {
    pub fn track_id(&self) -> &str {
        &self.track_id
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Stop the transfer, keeping the partial file for a later resume.
    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Wait for the session to end.
    pub async fn wait(self) -> Result<DownloadOutcome> {
        match self.handle.await {
            Ok(result) => result,
            Err(e) => Err(SyncError::TransferFailed(format!(
                "download task ended abnormally: {}",
                e
            ))),
        }
    }
}

/// State shared between the manager and its transfer tasks.
#[derive(Clone)]
struct TransferContext {
    http: Arc<dyn HttpClient>,
    fs: Arc<dyn FileSystemAccess>,
    resolver: PathResolver,
    library: PlaylistLibrary,
    store: Arc<PlaylistStore>,
    event_bus: EventBus,
    sessions: Arc<Mutex<SessionTable>>,
    /// Serializes access to a track's partial file across sessions
    file_locks: Arc<Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>>,
}

/// Starts, supersedes and cancels track downloads.
pub struct DownloadManager {
    provider: Arc<dyn StorageProvider>,
    ctx: TransferContext,
    next_generation: AtomicU64,
}

impl DownloadManager {
    pub fn new(
        provider: Arc<dyn StorageProvider>,
        http: Arc<dyn HttpClient>,
        fs: Arc<dyn FileSystemAccess>,
        resolver: PathResolver,
        library: PlaylistLibrary,
        store: Arc<PlaylistStore>,
        event_bus: EventBus,
    ) -> Self {
        Self {
            provider,
            ctx: TransferContext {
                http,
                fs,
                resolver,
                library,
                store,
                event_bus,
                sessions: Arc::new(Mutex::new(SessionTable::default())),
                file_locks: Arc::new(Mutex::new(HashMap::new())),
            },
            next_generation: AtomicU64::new(0),
        }
    }

    /// Start downloading `track`, superseding any session already running
    /// for it. Must be called from within a Tokio runtime.
    ///
    /// # Errors
    ///
    /// - [`SyncError::InvalidInput`] when the track has no remote path
    /// - any error building the provider request
    #[instrument(skip(self, credentials, track), fields(track_id = %track.id))]
    pub fn download(&self, credentials: &Credentials, track: &Track) -> Result<DownloadSession> {
        track.validate().map_err(|message| SyncError::InvalidInput {
            field: "track".to_string(),
            message,
        })?;
        let remote_path = track
            .path
            .clone()
            .ok_or_else(|| SyncError::InvalidInput {
                field: "path".to_string(),
                message: format!("track {} has no remote path", track.id),
            })?;

        let request = self
            .provider
            .download_request(credentials, &remote_path)
            .map_err(|e| SyncError::from_remote(e, &remote_path))?;

        let token = CancellationToken::new();

        let generation = {
            let mut sessions = self.ctx.sessions.lock();
            let generation = self.next_generation.fetch_add(1, Ordering::SeqCst) + 1;
            sessions.started.insert(track.id.clone(), generation);
            let previous = sessions.active.insert(
                track.id.clone(),
                ActiveSession {
                    generation,
                    token: token.clone(),
                },
            );
            if let Some(previous) = previous {
                debug!(
                    previous = previous.generation,
                    generation, "Superseding active download"
                );
                previous.token.cancel();
            }

            let current = self
                .ctx
                .library
                .track(&track.id)
                .and_then(|t| t.download_status);
            let initial = current
                .filter(|status| *status <= DOWNLOAD_IN_PROGRESS_MAX)
                .unwrap_or(0);
            self.ctx.library.set_track_status(&track.id, Some(initial));
            generation
        };

        info!(generation, path = %remote_path, "Download started");
        self.ctx
            .event_bus
            .emit(CoreEvent::Download(DownloadEvent::Started {
                track_id: track.id.clone(),
                generation,
            }))
            .ok();

        let span = info_span!("download", track_id = %track.id, generation);
        let ctx = self.ctx.clone();
        let task_track = track.clone();
        let task_token = token.clone();
        let handle = tokio::spawn(
            async move {
                ctx.run(task_track, remote_path, request, generation, task_token)
                    .await
            }
            .instrument(span),
        );

        Ok(DownloadSession {
            track_id: track.id.clone(),
            generation,
            token,
            handle,
        })
    }

    /// Cancel the active session of a track. Returns whether one existed.
    pub fn cancel(&self, track_id: &str) -> bool {
        match self.ctx.sessions.lock().active.get(track_id) {
            Some(session) => {
                debug!(track_id, generation = session.generation, "Cancelling download");
                session.token.cancel();
                true
            }
            None => false,
        }
    }

    pub fn is_active(&self, track_id: &str) -> bool {
        self.ctx.sessions.lock().active.contains_key(track_id)
    }

    pub fn active_generation(&self, track_id: &str) -> Option<u64> {
        self.ctx.sessions.lock().current(track_id)
    }

    /// Remember the current download activity.
    pub fn mark(&self) -> ActivityMark {
        let sessions = self.ctx.sessions.lock();
        ActivityMark {
            generation: self.next_generation.load(Ordering::SeqCst),
            active: sessions.active.keys().cloned().collect(),
        }
    }

    /// Upsert `playlist` into the library, keeping the library's status for
    /// every track a download has touched since `mark`.
    ///
    /// Holds the session table for the whole write, so no session starts or
    /// finishes between the check and the upsert.
    pub fn upsert_playlist(&self, playlist: Playlist, mark: &ActivityMark) -> UpsertOutcome {
        let sessions = self.ctx.sessions.lock();
        self.ctx.library.upsert_with(playlist, |track| {
            mark.active.contains(&track.id)
                || sessions.active.contains_key(&track.id)
                || sessions
                    .started
                    .get(&track.id)
                    .map_or(false, |started| *started > mark.generation)
        })
    }

    /// Copy of `track` with status `100` if its canonical file exists, else
    /// `None`.
    ///
    /// Only existence is checked. The canonical name embeds the revision, so
    /// a new revision never matches an older file.
    pub async fn is_downloaded(&self, track: &Track) -> Result<Track> {
        let exists = self
            .ctx
            .fs
            .exists(&self.ctx.resolver.track_path(track))
            .await
            .map_err(SyncError::from_storage)?;

        let mut track = track.clone();
        track.download_status = exists.then_some(DOWNLOAD_COMPLETE);
        Ok(track)
    }
}

impl TransferContext {
    async fn run(
        self,
        track: Track,
        remote_path: String,
        request: HttpRequest,
        generation: u64,
        token: CancellationToken,
    ) -> Result<DownloadOutcome> {
        let lock = self.file_lock(&track.id);

        let result = tokio::select! {
            biased;
            _ = token.cancelled() => None,
            result = async {
                let _guard = lock.lock().await;
                self.transfer(&track, &remote_path, request, generation).await
            } => Some(result),
        };

        match result {
            None => Ok(self.finish_cancelled(&track.id, generation)),
            Some(Ok(true)) => self.finish_completed(&track, generation).await,
            Some(Ok(false)) => Ok(DownloadOutcome::Superseded),
            Some(Err(e)) => self.finish_failed(&track.id, generation, e).await,
        }
    }

    /// Stream into the partial file and move it into place.
    ///
    /// Returns `false` when the session was superseded before the rename.
    async fn transfer(
        &self,
        track: &Track,
        remote_path: &str,
        request: HttpRequest,
        generation: u64,
    ) -> Result<bool> {
        let partial = self.resolver.partial_path(track);
        let destination = self.resolver.track_path(track);

        self.fs
            .create_dir_all(self.resolver.root())
            .await
            .map_err(SyncError::from_storage)?;
        let resume_from = self.partial_size(&partial).await?;
        if resume_from > 0 {
            debug!(resume_from, "Resuming partial download");
        }

        let callback = self.progress_callback(&track.id, generation);
        let size = match self
            .http
            .download_to_file(request, &partial, resume_from, callback)
            .await
        {
            Ok(size) => size,
            // The name pins the revision, so an unsatisfiable range means the
            // partial file already holds every byte.
            Err(BridgeError::Http {
                status: RANGE_NOT_SATISFIABLE,
                ..
            }) if resume_from > 0 => {
                debug!(resume_from, "Partial file is already complete");
                resume_from
            }
            Err(e) => return Err(SyncError::from_remote(e, remote_path)),
        };

        if !self.is_current(&track.id, generation) {
            return Ok(false);
        }

        self.fs
            .rename(&partial, &destination)
            .await
            .map_err(SyncError::from_storage)?;
        debug!(bytes = size, "Moved completed download into place");
        Ok(true)
    }

    async fn partial_size(&self, partial: &Path) -> Result<u64> {
        if !self
            .fs
            .exists(partial)
            .await
            .map_err(SyncError::from_storage)?
        {
            return Ok(0);
        }

        Ok(self
            .fs
            .metadata(partial)
            .await
            .map_err(SyncError::from_storage)?
            .size)
    }

    fn progress_callback(&self, track_id: &str, generation: u64) -> ProgressCallback {
        let ctx = self.clone();
        let track_id = track_id.to_string();
        let last = Mutex::new(
            self.library
                .track(&track_id)
                .and_then(|t| t.download_status)
                .filter(|status| *status <= DOWNLOAD_IN_PROGRESS_MAX),
        );

        Arc::new(move |progress: TransferProgress| {
            let Some(status) = progress_percent(progress) else {
                return;
            };

            let sessions = ctx.sessions.lock();
            if sessions.current(&track_id) != Some(generation) {
                return;
            }

            let mut last = last.lock();
            if last.map_or(false, |previous| status <= previous) {
                return;
            }
            *last = Some(status);

            ctx.library.set_track_status(&track_id, Some(status));
            ctx.event_bus
                .emit(CoreEvent::Download(DownloadEvent::Progress {
                    track_id: track_id.clone(),
                    status,
                }))
                .ok();
        })
    }

    fn file_lock(&self, track_id: &str) -> Arc<tokio::sync::Mutex<()>> {
        self.file_locks
            .lock()
            .entry(track_id.to_string())
            .or_default()
            .clone()
    }

    fn is_current(&self, track_id: &str, generation: u64) -> bool {
        self.sessions.lock().current(track_id) == Some(generation)
    }

    /// Remove the session if it is still the active one for the track.
    fn take_if_current(&self, track_id: &str, generation: u64, status: Option<Option<u8>>) -> bool {
        let mut sessions = self.sessions.lock();
        if sessions.current(track_id) != Some(generation) {
            return false;
        }

        sessions.active.remove(track_id);
        if let Some(status) = status {
            self.library.set_track_status(track_id, status);
        }
        true
    }

    fn finish_cancelled(&self, track_id: &str, generation: u64) -> DownloadOutcome {
        if !self.take_if_current(track_id, generation, None) {
            debug!("Superseded session stopped");
            return DownloadOutcome::Superseded;
        }

        info!("Download cancelled");
        self.event_bus
            .emit(CoreEvent::Download(DownloadEvent::Cancelled {
                track_id: track_id.to_string(),
            }))
            .ok();
        DownloadOutcome::Cancelled
    }

    async fn finish_completed(&self, track: &Track, generation: u64) -> Result<DownloadOutcome> {
        if !self.take_if_current(&track.id, generation, Some(Some(DOWNLOAD_COMPLETE))) {
            return Ok(DownloadOutcome::Superseded);
        }

        let file_name = track.file_name();
        info!(file = %file_name, "Download completed");
        self.event_bus
            .emit(CoreEvent::Download(DownloadEvent::Completed {
                track_id: track.id.clone(),
                file_name: file_name.clone(),
            }))
            .ok();

        self.persist(&track.id).await;
        Ok(DownloadOutcome::Completed { file_name })
    }

    async fn finish_failed(
        &self,
        track_id: &str,
        generation: u64,
        error: SyncError,
    ) -> Result<DownloadOutcome> {
        let recoverable = error.is_recoverable();
        error!(error = %error, recoverable, "Download failed");

        let reset = if recoverable { None } else { Some(None) };
        if !self.take_if_current(track_id, generation, reset) {
            return Ok(DownloadOutcome::Superseded);
        }

        let event = if recoverable {
            DownloadEvent::Interrupted {
                track_id: track_id.to_string(),
                status: self.library.track(track_id).and_then(|t| t.download_status),
                message: error.to_string(),
            }
        } else {
            DownloadEvent::Failed {
                track_id: track_id.to_string(),
                message: error.to_string(),
                credentials_rejected: matches!(error, SyncError::AuthRejected(_)),
            }
        };
        self.event_bus.emit(CoreEvent::Download(event)).ok();

        if !recoverable {
            self.persist(track_id).await;
        }
        Err(error)
    }

    /// Rewrite the playlist files that contain the track.
    async fn persist(&self, track_id: &str) {
        for playlist in self.library.playlists_with_track(track_id) {
            let path = playlist.meta.path;
            if let Err(e) = self.store.save_current(&self.library, &path).await {
                warn!(path = %path, error = %e, "Failed to persist playlist");
            }
        }
    }
}
