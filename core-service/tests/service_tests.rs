//! End-to-end flows through the CoreService façade.

use async_trait::async_trait;
use bridge_desktop::TokioFileSystem;
use bridge_traits::error::{BridgeError, Result as BridgeResult};
use bridge_traits::http::{
    HttpClient, HttpMethod, HttpRequest, HttpResponse, ProgressCallback, TransferProgress,
};
use bridge_traits::playback::{AudioEngine, AudioHandle, AudioSource, EngineStatus};
use bridge_traits::storage::{Credentials, EntryTag, RemoteFile, StorageProvider, UploadMode};
use bytes::Bytes;
use core_auth::{AuthError, AuthState, Session};
use core_library::{PlaylistData, Track};
use core_runtime::config::CoreConfig;
use core_runtime::events::{CoreEvent, PlaybackEvent};
use core_service::{CoreError, CoreService, PlayOutcome};
use core_sync::SyncError;
use mockall::mock;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

// ============================================================================
// Mock Implementations
// ============================================================================

#[derive(Default)]
struct MemoryProvider {
    files: Mutex<HashMap<String, (RemoteFile, Bytes)>>,
    names: Mutex<HashMap<String, String>>,
    rejecting: AtomicBool,
}

impl MemoryProvider {
    fn put(&self, path: &str, rev: &str, body: Bytes, modified_by: Option<&str>) {
        let file = RemoteFile {
            id: Some(format!("id:{}", path)),
            path_lower: Some(path.to_lowercase()),
            path_display: Some(path.to_string()),
            rev: Some(rev.to_string()),
            size: Some(body.len() as u64),
            modified_by: modified_by.map(str::to_string),
            ..RemoteFile::new(EntryTag::File, path.rsplit('/').next().unwrap_or(path))
        };
        self.files.lock().insert(path.to_lowercase(), (file, body));
    }

    fn put_playlist(&self, path: &str, title: &str, tracks: Vec<Track>, modified_by: Option<&str>) {
        let data = PlaylistData {
            title: title.to_string(),
            tracks,
        };
        self.put(path, "1", Bytes::from(serde_json::to_vec(&data).unwrap()), modified_by);
    }

    fn content(&self, path: &str) -> Option<Bytes> {
        self.files
            .lock()
            .get(&path.to_lowercase())
            .map(|(_, body)| body.clone())
    }

    fn check(&self) -> BridgeResult<()> {
        if self.rejecting.load(Ordering::SeqCst) {
            return Err(BridgeError::Http {
                status: 401,
                message: "invalid_access_token".to_string(),
            });
        }
        Ok(())
    }

    fn missing(path: &str) -> BridgeError {
        BridgeError::Http {
            status: 409,
            message: format!("path/not_found/ {}", path),
        }
    }
}

#[async_trait]
impl StorageProvider for MemoryProvider {
    async fn list_folder(&self, _: &Credentials, path: &str) -> BridgeResult<Vec<RemoteFile>> {
        self.check()?;
        let prefix = format!("{}/", path.to_lowercase());
        let mut files: Vec<RemoteFile> = self
            .files
            .lock()
            .iter()
            .filter(|(key, _)| key.starts_with(&prefix) && !key[prefix.len()..].contains('/'))
            .map(|(_, (file, _))| file.clone())
            .collect();
        files.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(files)
    }

    async fn get_metadata(&self, _: &Credentials, path: &str) -> BridgeResult<RemoteFile> {
        self.check()?;
        self.files
            .lock()
            .get(&path.to_lowercase())
            .map(|(file, _)| file.clone())
            .ok_or_else(|| Self::missing(path))
    }

    async fn download(&self, _: &Credentials, path: &str) -> BridgeResult<Bytes> {
        self.check()?;
        self.content(path).ok_or_else(|| Self::missing(path))
    }

    fn download_request(&self, credentials: &Credentials, path: &str) -> BridgeResult<HttpRequest> {
        Ok(HttpRequest::new(HttpMethod::Post, format!("memory://{}", path))
            .bearer_token(credentials.access_token.as_str()))
    }

    async fn upload(
        &self,
        _: &Credentials,
        path: &str,
        contents: Bytes,
        _: UploadMode,
    ) -> BridgeResult<RemoteFile> {
        self.check()?;
        self.put(path, "2", contents, None);
        self.get_metadata(&Credentials::new("x"), path).await
    }

    async fn account_display_names(
        &self,
        _: &Credentials,
        account_ids: &[String],
    ) -> BridgeResult<HashMap<String, String>> {
        self.check()?;
        let names = self.names.lock();
        Ok(account_ids
            .iter()
            .filter_map(|id| names.get(id).map(|name| (id.clone(), name.clone())))
            .collect())
    }
}

/// Writes the provider's content for `memory://<path>` in one go.
struct MemoryHttp {
    provider: Arc<MemoryProvider>,
}

#[async_trait]
impl HttpClient for MemoryHttp {
    async fn execute(&self, request: HttpRequest) -> BridgeResult<HttpResponse> {
        Err(BridgeError::NotAvailable(request.url))
    }

    async fn download_to_file(
        &self,
        request: HttpRequest,
        destination: &Path,
        _resume_from: u64,
        on_progress: ProgressCallback,
    ) -> BridgeResult<u64> {
        self.provider.check()?;
        let path = request.url.trim_start_matches("memory://");
        let body = self
            .provider
            .content(path)
            .ok_or_else(|| MemoryProvider::missing(path))?;
        tokio::fs::write(destination, &body).await?;
        on_progress(TransferProgress {
            bytes_written: body.len() as u64,
            total_bytes: Some(body.len() as u64),
        });
        Ok(body.len() as u64)
    }
}

mock! {
    Engine {}

    #[async_trait]
    impl AudioEngine for Engine {
        async fn load(&self, source: AudioSource) -> BridgeResult<AudioHandle>;
        async fn play(&self, handle: AudioHandle) -> BridgeResult<()>;
        async fn pause(&self, handle: AudioHandle) -> BridgeResult<()>;
        async fn seek(&self, handle: AudioHandle, position: Duration) -> BridgeResult<()>;
        async fn status(&self, handle: AudioHandle) -> BridgeResult<EngineStatus>;
        async fn unload(&self, handle: AudioHandle) -> BridgeResult<()>;
    }
}

// ============================================================================
// Helpers
// ============================================================================

struct Harness {
    root: PathBuf,
    provider: Arc<MemoryProvider>,
    core: CoreService,
}

impl Drop for Harness {
    fn drop(&mut self) {
        let _ = std::fs::remove_dir_all(&self.root);
    }
}

async fn harness(engine: Option<MockEngine>, setup: impl FnOnce(&MemoryProvider)) -> Harness {
    let root = std::env::temp_dir().join(format!("mixtape-core-{}", uuid::Uuid::new_v4()));
    let provider = Arc::new(MemoryProvider::default());
    setup(&provider);

    let mut builder = CoreConfig::builder()
        .document_root(root.clone())
        .playlists_folder("/playlists")
        .http_client(Arc::new(MemoryHttp {
            provider: provider.clone(),
        }))
        .file_system(Arc::new(TokioFileSystem::with_root(root.clone())));
    if let Some(engine) = engine {
        builder = builder.audio_engine(Arc::new(engine));
    }

    let core = CoreService::bootstrap(builder.build().unwrap(), provider.clone())
        .await
        .unwrap();
    core.sign_in(Session::new("sl.token").unwrap().with_account("dbid:me"))
        .await;

    Harness {
        root,
        provider,
        core,
    }
}

fn track(id: &str) -> Track {
    Track::new(id, "r1", format!("{}.mp3", id)).with_path(format!("/music/{}.mp3", id))
}

fn with_road_trip(provider: &MemoryProvider) {
    provider.put("/music/a1.mp3", "r1", Bytes::from_static(b"aaaa"), None);
    provider.put("/music/b2.mp3", "r1", Bytes::from_static(b"bbbb"), None);
    provider.put_playlist(
        "/playlists/road_trip.mix",
        "Road Trip",
        vec![track("a1"), track("b2")],
        None,
    );
}

async fn wait_for_playing(events: &mut tokio::sync::broadcast::Receiver<CoreEvent>) -> String {
    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            if let Ok(CoreEvent::Playback(PlaybackEvent::Playing { track_id })) =
                events.recv().await
            {
                return track_id;
            }
        }
    })
    .await
    .unwrap()
}

// ============================================================================
// Tests
// ============================================================================

#[tokio::test]
async fn test_bootstrap_creates_document_root() {
    let harness = harness(None, |_| {}).await;

    assert!(harness.root.is_dir());
    assert_eq!(harness.core.document_root(), harness.root.as_path());
    assert!(harness.core.playlists().is_empty());
    assert_eq!(harness.core.playback_view(), Default::default());
}

#[tokio::test]
async fn test_refresh_requires_session() {
    let harness = harness(None, with_road_trip).await;
    harness.core.sign_out().await;

    assert!(matches!(
        harness.core.refresh().await,
        Err(CoreError::Auth(AuthError::NotAuthenticated))
    ));
}

#[tokio::test]
async fn test_rejected_credentials_expire_session() {
    let harness = harness(None, with_road_trip).await;
    harness.provider.rejecting.store(true, Ordering::SeqCst);

    assert!(matches!(
        harness.core.refresh().await,
        Err(CoreError::Sync(SyncError::AuthRejected(_)))
    ));
    assert_eq!(harness.core.auth_state().await, AuthState::Expired);
    assert!(matches!(
        harness.core.refresh().await,
        Err(CoreError::Auth(AuthError::SessionExpired))
    ));
}

#[tokio::test]
async fn test_rejected_download_expires_session() {
    let harness = harness(None, with_road_trip).await;
    harness.core.refresh().await.unwrap();
    harness.provider.rejecting.store(true, Ordering::SeqCst);

    let session = harness.core.request_download("a1").await.unwrap();
    assert!(matches!(
        session.wait().await,
        Err(SyncError::AuthRejected(_))
    ));

    tokio::time::timeout(Duration::from_secs(5), async {
        while harness.core.auth_state().await != AuthState::Expired {
            tokio::task::yield_now().await;
        }
    })
    .await
    .unwrap();
    assert!(matches!(
        harness.core.request_download("a1").await,
        Err(CoreError::Auth(AuthError::SessionExpired))
    ));
}

#[tokio::test]
async fn test_playlist_views_show_owner() {
    let harness = harness(None, |provider| {
        provider.put_playlist("/playlists/shared.mix", "Shared", vec![], Some("dbid:ana"));
        provider
            .names
            .lock()
            .insert("dbid:ana".to_string(), "Ana".to_string());
    })
    .await;

    harness.core.refresh().await.unwrap();
    let views = harness.core.playlists();

    assert_eq!(views.len(), 1);
    assert_eq!(views[0].title, "Shared");
    assert_eq!(views[0].path, "/playlists/shared.mix");
    assert_eq!(views[0].owner.as_deref(), Some("Ana"));
}

#[tokio::test]
async fn test_play_requires_engine_and_selection() {
    let harness = harness(None, with_road_trip).await;
    assert!(matches!(
        harness.core.play_track(0).await,
        Err(CoreError::CapabilityMissing { .. })
    ));

    let harness = self::harness(Some(MockEngine::new()), with_road_trip).await;
    assert!(matches!(
        harness.core.play_track(0).await,
        Err(CoreError::NoPlaylistSelected)
    ));
}

#[tokio::test]
async fn test_play_downloaded_track_starts_immediately() {
    let handle = AudioHandle::new();
    let mut engine = MockEngine::new();
    engine
        .expect_load()
        .withf(|source| {
            matches!(source, AudioSource::LocalFile { path } if path.ends_with("a1_r1.mp3"))
        })
        .times(1)
        .returning(move |_| Ok(handle));
    engine.expect_play().times(1).returning(|_| Ok(()));

    let harness = harness(Some(engine), with_road_trip).await;
    harness.core.refresh().await.unwrap();
    std::fs::write(harness.root.join("a1_r1.mp3"), b"aaaa").unwrap();

    let tracks = harness
        .core
        .select_playlist("/playlists/road_trip.mix")
        .await
        .unwrap();
    assert_eq!(tracks[0].download_status, Some(100));
    assert_eq!(tracks[1].download_status, None);

    assert_eq!(harness.core.play_track(0).await.unwrap(), PlayOutcome::Playing);
    let view = harness.core.playback_view();
    assert_eq!(view.index, Some(0));
    assert!(view.is_playing);
}

#[tokio::test]
async fn test_play_undownloaded_track_after_download() {
    let mut engine = MockEngine::new();
    engine
        .expect_load()
        .times(1)
        .returning(|_| Ok(AudioHandle::new()));
    engine.expect_play().times(1).returning(|_| Ok(()));

    let harness = harness(Some(engine), with_road_trip).await;
    harness.core.refresh().await.unwrap();
    harness
        .core
        .select_playlist("/playlists/road_trip.mix")
        .await
        .unwrap();
    let mut events = harness.core.subscribe();

    let outcome = harness.core.play_track(1).await.unwrap();
    assert!(matches!(outcome, PlayOutcome::Downloading { .. }));

    assert_eq!(wait_for_playing(&mut events).await, "b2");
    assert_eq!(harness.core.tracks().unwrap()[1].download_status, Some(100));
    assert_eq!(std::fs::read(harness.root.join("b2_r1.mp3")).unwrap(), b"bbbb");
}

#[tokio::test]
async fn test_natural_completion_plays_next_track() {
    let first = AudioHandle::new();
    let second = AudioHandle::new();
    let mut engine = MockEngine::new();
    let mut handles = vec![second, first];
    engine
        .expect_load()
        .times(2)
        .returning(move |_| Ok(handles.pop().unwrap()));
    engine.expect_play().times(2).returning(|_| Ok(()));
    engine.expect_unload().times(1).returning(|_| Ok(()));

    let harness = harness(Some(engine), with_road_trip).await;
    harness.core.refresh().await.unwrap();
    std::fs::write(harness.root.join("a1_r1.mp3"), b"aaaa").unwrap();
    std::fs::write(harness.root.join("b2_r1.mp3"), b"bbbb").unwrap();
    harness
        .core
        .select_playlist("/playlists/road_trip.mix")
        .await
        .unwrap();

    harness.core.play_track(0).await.unwrap();
    harness
        .core
        .on_engine_status(
            first,
            EngineStatus {
                did_just_finish: true,
                ..EngineStatus::default()
            },
        )
        .await
        .unwrap();

    assert_eq!(harness.core.playback_view().index, Some(1));
    assert_eq!(harness.core.change_track(true).await.unwrap(), Some(1));
}

#[tokio::test]
async fn test_engine_error_surfaces_and_stops() {
    let mut engine = MockEngine::new();
    engine.expect_load().returning(|_| Ok(AudioHandle::new()));
    engine.expect_play().returning(|_| Ok(()));
    engine.expect_unload().times(1).returning(|_| Ok(()));

    let harness = harness(Some(engine), with_road_trip).await;
    harness.core.refresh().await.unwrap();
    std::fs::write(harness.root.join("a1_r1.mp3"), b"aaaa").unwrap();
    harness
        .core
        .select_playlist("/playlists/road_trip.mix")
        .await
        .unwrap();
    harness.core.play_track(0).await.unwrap();

    let error = harness.core.on_engine_error("decoder crashed").await.unwrap_err();
    assert!(matches!(error, CoreError::Playback(_)));
    assert!(!harness.core.playback_view().is_playing);
}

#[tokio::test]
async fn test_delete_selected_playlist_clears_selection() {
    let harness = harness(None, with_road_trip).await;
    harness.core.refresh().await.unwrap();
    harness
        .core
        .select_playlist("/playlists/road_trip.mix")
        .await
        .unwrap();

    harness
        .core
        .delete_playlist("/playlists/road_trip.mix")
        .await
        .unwrap();

    assert!(harness.core.playlists().is_empty());
    assert!(matches!(
        harness.core.tracks(),
        Err(CoreError::NoPlaylistSelected)
    ));
}
