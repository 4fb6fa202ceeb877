//! Shared fakes for the sync integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use bridge_desktop::TokioFileSystem;
use bridge_traits::error::{BridgeError, Result as BridgeResult};
use bridge_traits::http::{
    HttpClient, HttpMethod, HttpRequest, HttpResponse, ProgressCallback, TransferProgress,
};
use bridge_traits::storage::{
    Credentials, EntryTag, FileMetadata, FileSystemAccess, RemoteFile, StorageProvider,
    UploadMode,
};
use bytes::Bytes;
use core_library::PlaylistData;
use core_runtime::events::EventBus;
use core_sync::{SyncConfig, SyncCoordinator};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::env;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tokio::sync::{mpsc, oneshot};

pub const FAKE_SCHEME: &str = "fake://";

// ============================================================================
// Storage provider
// ============================================================================

/// In-memory remote folder tree keyed by lower-cased path.
#[derive(Default)]
pub struct FakeProvider {
    files: Mutex<HashMap<String, (RemoteFile, Bytes)>>,
    names: Mutex<HashMap<String, String>>,
    offline: AtomicBool,
    rejecting: AtomicBool,
    downloads: AtomicUsize,
    revisions: AtomicUsize,
}

fn parent_of(path: &str) -> &str {
    path.rsplit_once('/').map(|(parent, _)| parent).unwrap_or("")
}

impl FakeProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put(&self, path: &str, id: &str, rev: &str, contents: Bytes, modified_by: Option<&str>) {
        let name = path.rsplit('/').next().unwrap_or(path).to_string();
        let file = RemoteFile {
            id: Some(id.to_string()),
            path_lower: Some(path.to_lowercase()),
            path_display: Some(path.to_string()),
            rev: Some(rev.to_string()),
            size: Some(contents.len() as u64),
            modified_by: modified_by.map(str::to_string),
            ..RemoteFile::new(EntryTag::File, name)
        };
        self.files.lock().insert(path.to_lowercase(), (file, contents));
    }

    pub fn put_playlist(&self, path: &str, rev: &str, data: &PlaylistData) {
        let body = Bytes::from(serde_json::to_vec(data).unwrap());
        self.put(path, &format!("id:{}", path), rev, body, None);
    }

    pub fn put_shared_playlist(&self, path: &str, rev: &str, data: &PlaylistData, owner: &str) {
        let body = Bytes::from(serde_json::to_vec(data).unwrap());
        self.put(path, &format!("id:{}", path), rev, body, Some(owner));
    }

    pub fn put_folder(&self, path: &str) {
        let name = path.rsplit('/').next().unwrap_or(path).to_string();
        let folder = RemoteFile {
            path_lower: Some(path.to_lowercase()),
            ..RemoteFile::new(EntryTag::Folder, name)
        };
        self.files.lock().insert(path.to_lowercase(), (folder, Bytes::new()));
    }

    pub fn remove(&self, path: &str) {
        self.files.lock().remove(&path.to_lowercase());
    }

    pub fn set_account_name(&self, account_id: &str, name: &str) {
        self.names
            .lock()
            .insert(account_id.to_string(), name.to_string());
    }

    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    pub fn reject_credentials(&self, rejecting: bool) {
        self.rejecting.store(rejecting, Ordering::SeqCst);
    }

    pub fn download_count(&self) -> usize {
        self.downloads.load(Ordering::SeqCst)
    }

    pub fn content(&self, path: &str) -> Option<Bytes> {
        self.files
            .lock()
            .get(&path.to_lowercase())
            .map(|(_, bytes)| bytes.clone())
    }

    fn check(&self) -> BridgeResult<()> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(BridgeError::Network("connection refused".to_string()));
        }
        if self.rejecting.load(Ordering::SeqCst) {
            return Err(BridgeError::Http {
                status: 401,
                message: "expired_access_token".to_string(),
            });
        }
        Ok(())
    }

    fn not_found(path: &str) -> BridgeError {
        BridgeError::Http {
            status: 409,
            message: format!("path/not_found/ {}", path),
        }
    }
}

#[async_trait]
impl StorageProvider for FakeProvider {
    async fn list_folder(&self, _credentials: &Credentials, path: &str) -> BridgeResult<Vec<RemoteFile>> {
        self.check()?;
        let folder = path.to_lowercase();
        let mut entries: Vec<RemoteFile> = self
            .files
            .lock()
            .iter()
            .filter(|(key, _)| parent_of(key) == folder)
            .map(|(_, (file, _))| file.clone())
            .collect();
        entries.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(entries)
    }

    async fn get_metadata(&self, _credentials: &Credentials, path: &str) -> BridgeResult<RemoteFile> {
        self.check()?;
        self.files
            .lock()
            .get(&path.to_lowercase())
            .map(|(file, _)| file.clone())
            .ok_or_else(|| Self::not_found(path))
    }

    async fn download(&self, _credentials: &Credentials, path: &str) -> BridgeResult<Bytes> {
        self.check()?;
        self.downloads.fetch_add(1, Ordering::SeqCst);
        self.content(path).ok_or_else(|| Self::not_found(path))
    }

    fn download_request(&self, credentials: &Credentials, path: &str) -> BridgeResult<HttpRequest> {
        Ok(
            HttpRequest::new(HttpMethod::Post, format!("{}{}", FAKE_SCHEME, path))
                .bearer_token(credentials.access_token.as_str()),
        )
    }

    async fn upload(
        &self,
        _credentials: &Credentials,
        path: &str,
        contents: Bytes,
        mode: UploadMode,
    ) -> BridgeResult<RemoteFile> {
        self.check()?;
        assert!(!mode.autorename);
        let rev = format!("up{}", self.revisions.fetch_add(1, Ordering::SeqCst) + 1);
        self.put(path, &format!("id:{}", path), &rev, contents, None);
        self.files
            .lock()
            .get(&path.to_lowercase())
            .map(|(file, _)| file.clone())
            .ok_or_else(|| Self::not_found(path))
    }

    async fn account_display_names(
        &self,
        _credentials: &Credentials,
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

// ============================================================================
// HTTP client
// ============================================================================

/// A transfer parked until the test releases it.
pub struct HeldTransfer {
    pub url: String,
    pub resume_from: u64,
    pub callback: ProgressCallback,
    pub release: oneshot::Sender<()>,
}

/// Serves `fake://<path>` downloads from a [`FakeProvider`].
///
/// A range starting at or past the end of the body is answered with 416.
pub struct FakeHttp {
    provider: Arc<FakeProvider>,
    chunk_size: usize,
    /// Fail with `Interrupted` once this many bytes were written
    interrupt_at: Mutex<Option<u64>>,
    held: Mutex<Option<mpsc::UnboundedSender<HeldTransfer>>>,
    /// Park after the body was written instead of before
    hold_after_body: AtomicBool,
    requests: Mutex<Vec<(String, u64)>>,
}

impl FakeHttp {
    pub fn new(provider: Arc<FakeProvider>) -> Self {
        Self {
            provider,
            chunk_size: 4,
            interrupt_at: Mutex::new(None),
            held: Mutex::new(None),
            hold_after_body: AtomicBool::new(false),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn interrupt_at(&self, bytes: u64) {
        *self.interrupt_at.lock() = Some(bytes);
    }

    /// Park every following transfer until its `release` fires.
    pub fn hold_transfers(&self) -> mpsc::UnboundedReceiver<HeldTransfer> {
        self.hold_after_body.store(false, Ordering::SeqCst);
        let (tx, rx) = mpsc::unbounded_channel();
        *self.held.lock() = Some(tx);
        rx
    }

    /// Like [`hold_transfers`](Self::hold_transfers), but every transfer
    /// writes its body first and parks just before returning.
    pub fn hold_finished_transfers(&self) -> mpsc::UnboundedReceiver<HeldTransfer> {
        let rx = self.hold_transfers();
        self.hold_after_body.store(true, Ordering::SeqCst);
        rx
    }

    async fn park(
        &self,
        url: &str,
        resume_from: u64,
        callback: &ProgressCallback,
    ) -> BridgeResult<()> {
        let held = self.held.lock().clone();
        let Some(held) = held else {
            return Ok(());
        };

        let (release, released) = oneshot::channel();
        held.send(HeldTransfer {
            url: url.to_string(),
            resume_from,
            callback: callback.clone(),
            release,
        })
        .ok();
        released
            .await
            .map_err(|_| BridgeError::Interrupted("released without signal".to_string()))
    }

    async fn write_body(
        &self,
        body: &[u8],
        destination: &Path,
        resume_from: u64,
        on_progress: &ProgressCallback,
    ) -> BridgeResult<u64> {
        let total = body.len() as u64;
        if resume_from > 0 && resume_from >= total {
            return Err(BridgeError::Http {
                status: 416,
                message: "range not satisfiable".to_string(),
            });
        }

        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .write(true)
            .append(resume_from > 0)
            .truncate(resume_from == 0)
            .open(destination)
            .await?;

        let mut written = resume_from;
        for chunk in body[written as usize..].chunks(self.chunk_size) {
            file.write_all(chunk).await?;
            file.flush().await?;
            written += chunk.len() as u64;
            on_progress(TransferProgress {
                bytes_written: written,
                total_bytes: Some(total),
            });

            let limit = *self.interrupt_at.lock();
            if let Some(limit) = limit {
                if written >= limit && written < total {
                    *self.interrupt_at.lock() = None;
                    return Err(BridgeError::Interrupted("connection reset".to_string()));
                }
            }
        }

        Ok(written)
    }

    /// `(url, resume_from)` of every transfer started so far.
    pub fn requests(&self) -> Vec<(String, u64)> {
        self.requests.lock().clone()
    }
}

#[async_trait]
impl HttpClient for FakeHttp {
    async fn execute(&self, request: HttpRequest) -> BridgeResult<HttpResponse> {
        Err(BridgeError::NotAvailable(format!(
            "unexpected request to {}",
            request.url
        )))
    }

    async fn download_to_file(
        &self,
        request: HttpRequest,
        destination: &Path,
        resume_from: u64,
        on_progress: ProgressCallback,
    ) -> BridgeResult<u64> {
        self.requests.lock().push((request.url.clone(), resume_from));

        let path = request.url.trim_start_matches(FAKE_SCHEME);
        let body = self.provider.content(path).ok_or_else(|| BridgeError::Http {
            status: 409,
            message: "path/not_found/".to_string(),
        })?;

        let after_body = self.hold_after_body.load(Ordering::SeqCst);
        if !after_body {
            self.park(&request.url, resume_from, &on_progress).await?;
        }

        let result = self
            .write_body(&body, destination, resume_from, &on_progress)
            .await;

        if after_body {
            self.park(&request.url, resume_from, &on_progress).await?;
        }
        result
    }
}

// ============================================================================
// File system
// ============================================================================

/// Signals of a gate set with [`GatedFileSystem::gate_exists`].
pub struct ExistsGate {
    /// Fires when a caller is parked at the gate
    pub reached: oneshot::Receiver<()>,
    /// Lets the parked caller through
    pub open: oneshot::Sender<()>,
}

/// Temp-dir file system whose `exists` can be parked for one file name.
pub struct GatedFileSystem {
    inner: Arc<TokioFileSystem>,
    gate: Mutex<Option<(String, oneshot::Sender<()>, oneshot::Receiver<()>)>>,
}

impl GatedFileSystem {
    pub fn new(inner: Arc<TokioFileSystem>) -> Self {
        Self {
            inner,
            gate: Mutex::new(None),
        }
    }

    /// Park the next `exists` call for `file_name` until the gate opens.
    pub fn gate_exists(&self, file_name: &str) -> ExistsGate {
        let (reached_tx, reached) = oneshot::channel();
        let (open, open_rx) = oneshot::channel();
        *self.gate.lock() = Some((file_name.to_string(), reached_tx, open_rx));
        ExistsGate { reached, open }
    }

    fn take_gate(&self, path: &Path) -> Option<(oneshot::Sender<()>, oneshot::Receiver<()>)> {
        let mut gate = self.gate.lock();
        let matches = gate
            .as_ref()
            .map_or(false, |(name, _, _)| path.ends_with(name));
        if !matches {
            return None;
        }
        gate.take().map(|(_, reached, open)| (reached, open))
    }
}

#[async_trait]
impl FileSystemAccess for GatedFileSystem {
    async fn get_document_directory(&self) -> BridgeResult<PathBuf> {
        self.inner.get_document_directory().await
    }

    async fn exists(&self, path: &Path) -> BridgeResult<bool> {
        if let Some((reached, open)) = self.take_gate(path) {
            reached.send(()).ok();
            open.await.ok();
        }
        self.inner.exists(path).await
    }

    async fn metadata(&self, path: &Path) -> BridgeResult<FileMetadata> {
        self.inner.metadata(path).await
    }

    async fn create_dir_all(&self, path: &Path) -> BridgeResult<()> {
        self.inner.create_dir_all(path).await
    }

    async fn read_file(&self, path: &Path) -> BridgeResult<Bytes> {
        self.inner.read_file(path).await
    }

    async fn write_file(&self, path: &Path, data: Bytes) -> BridgeResult<()> {
        self.inner.write_file(path, data).await
    }

    async fn delete_file(&self, path: &Path) -> BridgeResult<()> {
        self.inner.delete_file(path).await
    }

    async fn rename(&self, from: &Path, to: &Path) -> BridgeResult<()> {
        self.inner.rename(from, to).await
    }

    async fn list_directory(&self, path: &Path) -> BridgeResult<Vec<PathBuf>> {
        self.inner.list_directory(path).await
    }
}

// ============================================================================
// Environment
// ============================================================================

pub struct TestEnv {
    pub root: PathBuf,
    pub fs: Arc<TokioFileSystem>,
    /// The file system the coordinator sees
    pub gated: Arc<GatedFileSystem>,
    pub provider: Arc<FakeProvider>,
    pub http: Arc<FakeHttp>,
    pub bus: EventBus,
    pub coordinator: SyncCoordinator,
}

impl TestEnv {
    pub fn new() -> Self {
        Self::with_config(SyncConfig {
            playlists_folder: "/playlists".to_string(),
            ..SyncConfig::default()
        })
    }

    pub fn with_config(config: SyncConfig) -> Self {
        let root = env::temp_dir().join(format!("mixtape-sync-{}", uuid::Uuid::new_v4()));
        let fs = Arc::new(TokioFileSystem::with_root(root.clone()));
        let gated = Arc::new(GatedFileSystem::new(fs.clone()));
        let provider = Arc::new(FakeProvider::new());
        let http = Arc::new(FakeHttp::new(provider.clone()));
        let bus = EventBus::new(256);

        let coordinator = SyncCoordinator::new(
            config,
            provider.clone(),
            http.clone(),
            gated.clone(),
            root.clone(),
            bus.clone(),
        );

        Self {
            root,
            fs,
            gated,
            provider,
            http,
            bus,
            coordinator,
        }
    }

    pub fn credentials() -> Credentials {
        Credentials::new("sl.test-token")
    }

    pub async fn write_local(&self, name: &str, contents: &[u8]) {
        self.fs
            .write_file(&self.root.join(name), Bytes::copy_from_slice(contents))
            .await
            .unwrap();
    }

    pub async fn local_files(&self) -> Vec<String> {
        if !self.fs.exists(&self.root).await.unwrap() {
            return Vec::new();
        }
        let mut names: Vec<String> = self
            .fs
            .list_directory(&self.root)
            .await
            .unwrap()
            .iter()
            .filter_map(|p| p.file_name()?.to_str().map(str::to_string))
            .collect();
        names.sort();
        names
    }

    pub fn status(&self, track_id: &str) -> Option<u8> {
        self.coordinator
            .library()
            .track(track_id)
            .and_then(|t| t.download_status)
    }
}

impl Drop for TestEnv {
    fn drop(&mut self) {
        let _ = std::fs::remove_dir_all(&self.root);
    }
}
