//! Core service façade and bootstrap helpers.
//!
//! This crate wires host-provided bridges (HTTP, file system, audio engine)
//! and a storage provider into the shared core, and exposes the operations
//! and view models the UI layer calls. Desktop hosts typically enable the
//! `desktop-shims` feature (which depends on `bridge-desktop` and
//! `provider-dropbox`) and call [`bootstrap_dropbox`].

pub mod error;
pub mod views;

pub use error::{CoreError, Result};
pub use views::{PlaybackView, PlaylistView, TrackView};

use bridge_traits::playback::{AudioHandle, AudioSource, EngineStatus};
use bridge_traits::storage::{Credentials, StorageProvider};
use core_auth::{AuthManager, AuthState, Session};
use core_library::{LibraryError, PathResolver, Playlist, RemoteEntry, Track};
use core_playback::{PlaybackController, PlaybackError};
use core_runtime::config::CoreConfig;
use core_runtime::events::{CoreEvent, DownloadEvent, EventBus};
use core_runtime::logging::init_logging;
use core_sync::{
    DownloadOutcome, DownloadSession, PurgeReport, RefreshReport, SyncConfig, SyncCoordinator,
    SyncError,
};
use parking_lot::Mutex;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::broadcast::Receiver;
use tokio::task::JoinHandle;
use tracing::{debug, info, info_span, instrument, warn, Instrument};

/// What the UI is looking at.
#[derive(Debug, Default)]
struct Selection {
    playlist: Option<String>,
    /// Track waiting for its download before it can start playing
    pending: Option<String>,
}

/// Result of [`CoreService::play_track`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlayOutcome {
    /// The local file was loaded and playback started
    Playing,
    /// A download was started; playback follows when it completes
    Downloading { generation: u64 },
}

/// Primary façade exposed to host applications.
pub struct CoreService {
    config: CoreConfig,
    event_bus: EventBus,
    auth: Arc<AuthManager>,
    sync: Arc<SyncCoordinator>,
    playback: Option<Arc<PlaybackController>>,
    resolver: PathResolver,
    selection: Arc<Mutex<Selection>>,
    auth_watcher: JoinHandle<()>,
}

impl CoreService {
    /// Wire the core from `config` and `provider`, create the document root
    /// and load the playlists already on disk.
    ///
    /// Logging is initialized from `config.logging` unless the host already
    /// installed a subscriber.
    pub async fn bootstrap(config: CoreConfig, provider: Arc<dyn StorageProvider>) -> Result<Self> {
        if let Err(e) = init_logging(config.logging.clone()) {
            debug!(error = %e, "Logging already initialized by host");
        }

        let fs = config.file_system.clone();
        let document_root = match &config.document_root {
            Some(root) => root.clone(),
            None => fs
                .get_document_directory()
                .await
                .map_err(core_runtime::Error::from)?,
        };
        fs.create_dir_all(&document_root)
            .await
            .map_err(core_runtime::Error::from)?;

        let event_bus = EventBus::new(config.event_buffer_size);
        let auth = Arc::new(AuthManager::new(event_bus.clone(), config.clock.clone()));
        let sync = Arc::new(SyncCoordinator::new(
            SyncConfig {
                playlists_folder: config.playlists_folder.clone(),
                purge_on_change: config.features.purge_on_change,
                offline_fallback: config.features.offline_fallback,
            },
            provider,
            config.http_client.clone(),
            fs,
            document_root.clone(),
            event_bus.clone(),
        ));
        let playback = config
            .audio_engine
            .clone()
            .map(|engine| Arc::new(PlaybackController::new(engine, event_bus.clone())));

        let loaded = sync.load_local().await?;
        let auth_watcher = watch_rejected_downloads(&event_bus, auth.clone());
        info!(
            root = %document_root.display(),
            playlists = loaded,
            playback = playback.is_some(),
            "Core ready"
        );

        Ok(Self {
            config,
            event_bus,
            auth,
            sync,
            playback,
            resolver: PathResolver::new(document_root),
            selection: Arc::new(Mutex::new(Selection::default())),
            auth_watcher,
        })
    }

    pub fn config(&self) -> &CoreConfig {
        &self.config
    }

    pub fn document_root(&self) -> &Path {
        self.resolver.root()
    }

    pub fn subscribe(&self) -> Receiver<CoreEvent> {
        self.event_bus.subscribe()
    }

    pub fn sync(&self) -> &SyncCoordinator {
        &self.sync
    }

    // =========================================================================
    // Session
    // =========================================================================

    pub async fn sign_in(&self, session: Session) {
        self.auth.sign_in(session).await;
    }

    pub async fn sign_out(&self) {
        self.auth.sign_out().await;
    }

    pub async fn auth_state(&self) -> AuthState {
        self.auth.state().await
    }

    // =========================================================================
    // Playlists
    // =========================================================================

    pub async fn refresh(&self) -> Result<RefreshReport> {
        let credentials = self.credentials().await?;
        let result = self.sync.refresh_playlists(&credentials).await;
        self.guard_auth(result).await
    }

    pub fn playlists(&self) -> Vec<PlaylistView> {
        self.sync
            .library()
            .list()
            .iter()
            .map(|playlist| self.playlist_view(playlist))
            .collect()
    }

    /// Bring a playlist up to date, make it the selection and queue its
    /// tracks for playback.
    #[instrument(skip(self))]
    pub async fn select_playlist(&self, path: &str) -> Result<Vec<TrackView>> {
        let credentials = self.credentials().await?;
        let result = self.sync.select_playlist(&credentials, path).await;
        let playlist = self.guard_auth(result).await?;

        self.selection.lock().playlist = Some(playlist.meta.path.clone());
        if let Some(playback) = &self.playback {
            playback.set_queue(track_ids(&playlist));
        }
        Ok(TrackView::list(&playlist))
    }

    /// Tracks of the selected playlist with their current statuses.
    pub fn tracks(&self) -> Result<Vec<TrackView>> {
        Ok(TrackView::list(&self.selected_playlist()?))
    }

    pub async fn save_playlist(&self, title: &str, tracks: Vec<Track>) -> Result<PlaylistView> {
        let credentials = self.credentials().await?;
        let result = self.sync.save_playlist(&credentials, title, tracks).await;
        let playlist = self.guard_auth(result).await?;
        Ok(self.playlist_view(&playlist))
    }

    /// Forget a playlist locally. Playback stops if it was selected.
    pub async fn delete_playlist(&self, path: &str) -> Result<PurgeReport> {
        let report = self.sync.delete_playlist(path).await?;

        let was_selected = {
            let mut selection = self.selection.lock();
            let was_selected = selection.playlist.as_deref() == Some(path);
            if was_selected {
                *selection = Selection::default();
            }
            was_selected
        };
        if was_selected {
            if let Some(playback) = &self.playback {
                playback.stop().await;
                playback.set_queue(Vec::new());
            }
        }
        Ok(report)
    }

    pub async fn browse(&self, path: &str) -> Result<Vec<RemoteEntry>> {
        let credentials = self.credentials().await?;
        let result = self.sync.browse(&credentials, path).await;
        self.guard_auth(result).await
    }

    // =========================================================================
    // Downloads
    // =========================================================================

    /// Start downloading a track of the library.
    ///
    /// Credentials refused mid-transfer expire the session once the session
    /// reports its failure.
    pub async fn request_download(&self, track_id: &str) -> Result<DownloadSession> {
        let credentials = self.credentials().await?;
        Ok(self.sync.request_download(&credentials, track_id)?)
    }

    pub fn cancel_download(&self, track_id: &str) -> bool {
        self.sync.cancel_download(track_id)
    }

    // =========================================================================
    // Playback
    // =========================================================================

    /// Play the selected playlist's track at `index`.
    ///
    /// A track that is not on disk yet is downloaded first and starts playing
    /// once its download completes, unless another track was chosen since.
    #[instrument(skip(self))]
    pub async fn play_track(&self, index: usize) -> Result<PlayOutcome> {
        let playback = self.playback()?;
        let playlist = self.selected_playlist()?;
        let track = playlist
            .tracks()
            .get(index)
            .cloned()
            .ok_or(PlaybackError::InvalidIndex {
                index,
                len: playlist.tracks().len(),
            })?;
        playback.set_queue(track_ids(&playlist));

        let track = self.sync.is_downloaded(&track).await?;
        if track.is_downloaded() {
            self.selection.lock().pending = None;
            load_and_play(&playback, index, self.local_source(&track)).await?;
            return Ok(PlayOutcome::Playing);
        }

        let session = self.request_download(&track.id).await?;
        let generation = session.generation();
        self.selection.lock().pending = Some(track.id.clone());

        let source = self.local_source(&track);
        let selection = self.selection.clone();
        let span = info_span!("play_after_download", track_id = %track.id, generation);
        tokio::spawn(
            async move {
                match session.wait().await {
                    Ok(DownloadOutcome::Completed { .. }) => {
                        let wanted = {
                            let mut selection = selection.lock();
                            let wanted = selection.pending.as_deref() == Some(track.id.as_str());
                            if wanted {
                                selection.pending = None;
                            }
                            wanted
                        };
                        let index = playback.queue().iter().position(|id| *id == track.id);
                        match (wanted, index) {
                            (true, Some(index)) => {
                                if let Err(e) = load_and_play(&playback, index, source).await {
                                    warn!(error = %e, "Could not start downloaded track");
                                }
                            }
                            _ => debug!("Selection moved on while downloading"),
                        }
                    }
                    Ok(outcome) => debug!(?outcome, "Download ended without a file"),
                    Err(e) => warn!(error = %e, "Download for playback failed"),
                }
            }
            .instrument(span),
        );

        Ok(PlayOutcome::Downloading { generation })
    }

    pub async fn set_playing(&self, playing: bool) -> Result<()> {
        Ok(self.playback()?.set_playing(playing).await?)
    }

    pub async fn seek_to(&self, fraction: f64) -> Result<()> {
        self.playback()?.seek_to(fraction).await?;
        Ok(())
    }

    /// Move one track forward or back, clamping at the ends.
    ///
    /// Returns the index now selected; at a boundary nothing is reloaded.
    pub async fn change_track(&self, forward: bool) -> Result<Option<usize>> {
        let playback = self.playback()?;
        let Some(target) = playback.change_track(forward) else {
            return Ok(None);
        };
        if playback.current_index() != Some(target) {
            self.play_track(target).await?;
        }
        Ok(Some(target))
    }

    /// Status pushed by the host engine for `handle`.
    ///
    /// On natural completion the next track is played, or playback stops at
    /// the end of the queue.
    pub async fn on_engine_status(&self, handle: AudioHandle, status: EngineStatus) -> Result<()> {
        let playback = self.playback()?;
        if !playback.on_engine_status(handle, status) {
            return Ok(());
        }

        if let Some(next) = playback.track_complete().await {
            self.play_track(next).await?;
        }
        Ok(())
    }

    /// Fault reported by the host engine. Playback stops; nothing is retried.
    pub async fn on_engine_error(&self, message: &str) -> Result<()> {
        let playback = self.playback()?;
        self.selection.lock().pending = None;
        Err(playback.on_engine_error(message).await.into())
    }

    pub fn playback_view(&self) -> PlaybackView {
        self.playback
            .as_ref()
            .map(|playback| PlaybackView::from(playback.snapshot()))
            .unwrap_or_default()
    }

    // =========================================================================
    // Helpers
    // =========================================================================

    async fn credentials(&self) -> Result<Credentials> {
        Ok(self.auth.credentials().await?)
    }

    /// Invalidate the session when the provider rejected it.
    async fn guard_auth<T>(&self, result: core_sync::Result<T>) -> Result<T> {
        if let Err(SyncError::AuthRejected(_)) = &result {
            self.auth.invalidate().await;
        }
        Ok(result?)
    }

    fn playback(&self) -> Result<Arc<PlaybackController>> {
        self.playback
            .clone()
            .ok_or_else(|| CoreError::CapabilityMissing {
                capability: "AudioEngine".to_string(),
                message: "No audio engine was configured".to_string(),
            })
    }

    fn selected_playlist(&self) -> Result<Playlist> {
        let path = self
            .selection
            .lock()
            .playlist
            .clone()
            .ok_or(CoreError::NoPlaylistSelected)?;
        self.sync
            .library()
            .get(&path)
            .ok_or_else(|| LibraryError::playlist_not_found(&path).into())
    }

    fn playlist_view(&self, playlist: &Playlist) -> PlaylistView {
        let owner = playlist
            .meta
            .modified_by
            .as_deref()
            .and_then(|account_id| self.sync.owner_name(account_id));
        PlaylistView::new(playlist, owner)
    }

    fn local_source(&self, track: &Track) -> AudioSource {
        AudioSource::LocalFile {
            path: self.resolver.track_path(track),
        }
    }
}

impl Drop for CoreService {
    fn drop(&mut self) {
        self.auth_watcher.abort();
    }
}

/// Expire the session when a background download is refused by the provider.
///
/// Downloads outlive the call that started them, so their failures reach
/// the auth manager through the event bus.
fn watch_rejected_downloads(event_bus: &EventBus, auth: Arc<AuthManager>) -> JoinHandle<()> {
    let mut rejected = event_bus.subscribe_where(|event| {
        matches!(
            event,
            CoreEvent::Download(DownloadEvent::Failed {
                credentials_rejected: true,
                ..
            })
        )
    });

    tokio::spawn(
        async move {
            loop {
                match rejected.recv().await {
                    Ok(event) => {
                        debug!(event = %event, "Download refused by provider");
                        auth.invalidate().await;
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(skipped, "Auth watcher fell behind the event bus");
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        }
        .instrument(info_span!("auth_watcher")),
    )
}

fn track_ids(playlist: &Playlist) -> Vec<String> {
    playlist.tracks().iter().map(|t| t.id.clone()).collect()
}

async fn load_and_play(
    playback: &PlaybackController,
    index: usize,
    source: AudioSource,
) -> core_playback::Result<()> {
    playback.load_track(index, source).await?;
    playback.play().await
}

/// Bootstrap against Dropbox with the configured HTTP client.
///
/// ```ignore
/// use core_runtime::config::CoreConfig;
///
/// let config = CoreConfig::builder()
///     .document_root("/home/me/.local/share/mixtape")
///     .playlists_folder("/playlists")
///     .build()?;
/// let core = core_service::bootstrap_dropbox(config).await?;
/// core.sign_in(session).await;
/// core.refresh().await?;
/// ```
#[cfg(feature = "desktop-shims")]
pub async fn bootstrap_dropbox(config: CoreConfig) -> Result<CoreService> {
    let provider = Arc::new(provider_dropbox::DropboxConnector::new(
        config.http_client.clone(),
    ));
    CoreService::bootstrap(config, provider).await
}
