//! # Event Bus
//!
//! Typed events broadcast to the host over `tokio::sync::broadcast`.
//!
//! Every publisher (sync coordinator, download manager, playback controller,
//! auth manager) holds a clone of one [`EventBus`]. Hosts subscribe once and
//! redraw from the events instead of polling track statuses.
//!
//! ```rust
//! use core_runtime::events::{CoreEvent, DownloadEvent, EventBus};
//!
//! let bus = EventBus::new(16);
//! let mut downloads = bus.subscribe_where(|event| matches!(event, CoreEvent::Download(_)));
//!
//! bus.emit(CoreEvent::Download(DownloadEvent::Progress {
//!     track_id: "id:abc".to_string(),
//!     status: 42,
//! }))
//! .ok();
//!
//! assert!(matches!(downloads.try_next(), Ok(Some(_))));
//! ```
//!
//! `emit` fails only when nobody is subscribed, so publishers discard its
//! result with `.ok()`.

use serde::{Deserialize, Serialize};
use std::fmt;
use tokio::sync::broadcast::{self, error::RecvError, error::TryRecvError};

pub use tokio::sync::broadcast::Receiver;

pub const DEFAULT_EVENT_BUFFER_SIZE: usize = 100;

// ============================================================================
// Core Event Types
// ============================================================================

/// Everything the core tells the host, grouped by the publishing module.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", content = "payload")]
pub enum CoreEvent {
    Auth(AuthEvent),
    Sync(SyncEvent),
    Download(DownloadEvent),
    Library(LibraryEvent),
    Playback(PlaybackEvent),
}

impl CoreEvent {
    /// Failures the host should surface to the user.
    pub fn is_failure(&self) -> bool {
        matches!(
            self,
            CoreEvent::Sync(SyncEvent::Failed { .. })
                | CoreEvent::Download(DownloadEvent::Failed { .. })
                | CoreEvent::Playback(PlaybackEvent::Error { .. })
        )
    }

    /// Track id for download and per-track playback events.
    pub fn track_id(&self) -> Option<&str> {
        match self {
            CoreEvent::Download(event) => Some(event.track_id()),
            CoreEvent::Playback(
                PlaybackEvent::TrackLoaded { track_id, .. }
                | PlaybackEvent::Playing { track_id }
                | PlaybackEvent::Paused { track_id }
                | PlaybackEvent::Completed { track_id },
            ) => Some(track_id),
            _ => None,
        }
    }
}

impl fmt::Display for CoreEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CoreEvent::Auth(AuthEvent::SignedIn { .. }) => f.write_str("signed in"),
            CoreEvent::Auth(AuthEvent::SignedOut) => f.write_str("signed out"),
            CoreEvent::Auth(AuthEvent::SessionExpired) => f.write_str("session expired"),
            CoreEvent::Sync(SyncEvent::RefreshStarted { folder }) => {
                write!(f, "refreshing {folder:?}")
            }
            CoreEvent::Sync(SyncEvent::RefreshCompleted { playlists, changed }) => {
                write!(f, "refreshed {playlists} playlists ({changed} changed)")
            }
            CoreEvent::Sync(SyncEvent::PlaylistChanged { path, .. }) => {
                write!(f, "{path} changed remotely")
            }
            CoreEvent::Sync(SyncEvent::Purged { purged, failed }) => {
                write!(f, "purged {} files, {failed} failed", purged.len())
            }
            CoreEvent::Sync(SyncEvent::Failed { message, .. }) => {
                write!(f, "sync failed: {message}")
            }
            CoreEvent::Download(DownloadEvent::Started { track_id, .. }) => {
                write!(f, "downloading {track_id}")
            }
            CoreEvent::Download(DownloadEvent::Progress { track_id, status }) => {
                write!(f, "{track_id} at {status}%")
            }
            CoreEvent::Download(DownloadEvent::Completed { track_id, .. }) => {
                write!(f, "{track_id} downloaded")
            }
            CoreEvent::Download(DownloadEvent::Interrupted { track_id, message, .. }) => {
                write!(f, "{track_id} interrupted: {message}")
            }
            CoreEvent::Download(DownloadEvent::Failed {
                track_id, message, ..
            }) => {
                write!(f, "{track_id} failed: {message}")
            }
            CoreEvent::Download(DownloadEvent::Cancelled { track_id }) => {
                write!(f, "{track_id} cancelled")
            }
            CoreEvent::Library(LibraryEvent::PlaylistsLoaded { count }) => {
                write!(f, "{count} playlists on disk")
            }
            CoreEvent::Library(LibraryEvent::PlaylistSaved { path, .. }) => {
                write!(f, "saved {path}")
            }
            CoreEvent::Library(LibraryEvent::PlaylistDeleted { path }) => {
                write!(f, "deleted {path}")
            }
            CoreEvent::Playback(PlaybackEvent::TrackLoaded { index, .. }) => {
                write!(f, "loaded track {index}")
            }
            CoreEvent::Playback(PlaybackEvent::Playing { .. }) => f.write_str("playing"),
            CoreEvent::Playback(PlaybackEvent::Paused { .. }) => f.write_str("paused"),
            CoreEvent::Playback(PlaybackEvent::Stopped) => f.write_str("stopped"),
            CoreEvent::Playback(PlaybackEvent::Completed { .. }) => f.write_str("track finished"),
            CoreEvent::Playback(PlaybackEvent::Error { message }) => {
                write!(f, "playback error: {message}")
            }
        }
    }
}

// ============================================================================
// Authentication Events
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "event")]
pub enum AuthEvent {
    SignedIn { account_id: Option<String> },
    SignedOut,
    /// A call needed credentials but the stored session had expired.
    SessionExpired,
}

// ============================================================================
// Sync Events
// ============================================================================

/// Events emitted while reconciling remote playlists with local storage.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "event")]
pub enum SyncEvent {
    RefreshStarted {
        folder: String,
    },
    RefreshCompleted {
        /// Playlists known after the refresh.
        playlists: usize,
        /// Playlists whose revision differed from the cached copy.
        changed: usize,
    },
    /// A selected playlist's remote revision differed from the local snapshot.
    PlaylistChanged {
        path: String,
        rev: Option<String>,
    },
    /// A garbage-collection pass finished.
    Purged {
        purged: Vec<String>,
        failed: usize,
    },
    Failed {
        message: String,
        recoverable: bool,
    },
}

// ============================================================================
// Download Events
// ============================================================================

/// Per-track transfer lifecycle.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "event")]
pub enum DownloadEvent {
    Started {
        track_id: String,
        generation: u64,
    },
    Progress {
        track_id: String,
        /// Percent complete, 0..=99 while in flight.
        status: u8,
    },
    Completed {
        track_id: String,
        file_name: String,
    },
    /// The transfer stopped but its partial file was kept for a later resume.
    Interrupted {
        track_id: String,
        status: Option<u8>,
        message: String,
    },
    /// The transfer cannot succeed; status was reset.
    Failed {
        track_id: String,
        message: String,
        /// The provider refused the credentials the download was started with
        #[serde(default)]
        credentials_rejected: bool,
    },
    Cancelled {
        track_id: String,
    },
}

impl DownloadEvent {
    /// Track the event refers to.
    pub fn track_id(&self) -> &str {
        match self {
            DownloadEvent::Started { track_id, .. }
            | DownloadEvent::Progress { track_id, .. }
            | DownloadEvent::Completed { track_id, .. }
            | DownloadEvent::Interrupted { track_id, .. }
            | DownloadEvent::Failed { track_id, .. }
            | DownloadEvent::Cancelled { track_id } => track_id,
        }
    }
}

// ============================================================================
// Library Events
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "event")]
pub enum LibraryEvent {
    PlaylistsLoaded { count: usize },
    PlaylistSaved { path: String, title: String },
    PlaylistDeleted { path: String },
}

// ============================================================================
// Playback Events
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "event")]
pub enum PlaybackEvent {
    TrackLoaded { track_id: String, index: usize },
    Playing { track_id: String },
    Paused { track_id: String },
    Stopped,
    /// The current track reached its natural end.
    Completed { track_id: String },
    /// The audio engine failed; playback was stopped.
    Error { message: String },
}

// ============================================================================
// Bus
// ============================================================================

/// Broadcast channel shared by every publisher. Clones share the channel.
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<CoreEvent>,
}

impl EventBus {
    /// A subscriber more than `capacity` events behind gets
    /// [`RecvError::Lagged`] and skips ahead.
    pub fn new(capacity: usize) -> Self {
        Self {
            sender: broadcast::channel(capacity).0,
        }
    }

    /// Returns how many subscribers were handed the event.
    pub fn emit(&self, event: CoreEvent) -> Result<usize, broadcast::error::SendError<CoreEvent>> {
        self.sender.send(event)
    }

    /// New subscriber; earlier events are not replayed.
    pub fn subscribe(&self) -> Receiver<CoreEvent> {
        self.sender.subscribe()
    }

    /// Subscriber that only yields events accepted by `keep`.
    pub fn subscribe_where<F>(&self, keep: F) -> FilteredReceiver
    where
        F: Fn(&CoreEvent) -> bool + Send + Sync + 'static,
    {
        FilteredReceiver {
            inner: self.subscribe(),
            keep: Box::new(keep),
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_EVENT_BUFFER_SIZE)
    }
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EventBus({} subscribers)", self.subscriber_count())
    }
}

/// Receiver that drops events its predicate rejects.
pub struct FilteredReceiver {
    inner: Receiver<CoreEvent>,
    keep: Box<dyn Fn(&CoreEvent) -> bool + Send + Sync>,
}

impl FilteredReceiver {
    /// Wait for the next accepted event.
    ///
    /// Lag and closure are reported exactly as by [`Receiver::recv`].
    pub async fn recv(&mut self) -> Result<CoreEvent, RecvError> {
        loop {
            let event = self.inner.recv().await?;
            if (self.keep)(&event) {
                return Ok(event);
            }
        }
    }

    /// Next accepted event already buffered, or `Ok(None)` when there is none.
    pub fn try_next(&mut self) -> Result<Option<CoreEvent>, RecvError> {
        loop {
            match self.inner.try_recv() {
                Ok(event) if (self.keep)(&event) => return Ok(Some(event)),
                Ok(_) => continue,
                Err(TryRecvError::Empty) => return Ok(None),
                Err(TryRecvError::Lagged(n)) => return Err(RecvError::Lagged(n)),
                Err(TryRecvError::Closed) => return Err(RecvError::Closed),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stopped() -> CoreEvent {
        CoreEvent::Playback(PlaybackEvent::Stopped)
    }

    #[test]
    fn test_emit_without_subscribers_is_error() {
        assert!(EventBus::new(10).emit(stopped()).is_err());
    }

    #[tokio::test]
    async fn test_every_subscriber_receives_event() {
        let bus = EventBus::new(10);
        let mut first = bus.subscribe();
        let mut second = bus.subscribe();

        let event = CoreEvent::Library(LibraryEvent::PlaylistDeleted {
            path: "/playlists/road trip.mix".to_string(),
        });
        assert_eq!(bus.emit(event.clone()).unwrap(), 2);

        assert_eq!(first.recv().await.unwrap(), event);
        assert_eq!(second.recv().await.unwrap(), event);
    }

    #[tokio::test]
    async fn test_filtered_receiver_skips_other_domains() {
        let bus = EventBus::new(10);
        let mut downloads = bus.subscribe_where(|event| matches!(event, CoreEvent::Download(_)));

        bus.emit(stopped()).unwrap();
        bus.emit(CoreEvent::Download(DownloadEvent::Cancelled {
            track_id: "id:abc".to_string(),
        }))
        .unwrap();

        let received = downloads.recv().await.unwrap();
        assert_eq!(received.track_id(), Some("id:abc"));
        assert!(matches!(downloads.try_next(), Ok(None)));
    }

    #[test]
    fn test_lagged_subscriber_is_reported() {
        let bus = EventBus::new(2);
        let mut all = bus.subscribe_where(|_| true);

        for _ in 0..4 {
            bus.emit(stopped()).unwrap();
        }

        assert!(matches!(all.try_next(), Err(RecvError::Lagged(2))));
    }

    #[test]
    fn test_serialization_shape() {
        let event = CoreEvent::Download(DownloadEvent::Progress {
            track_id: "id:abc".to_string(),
            status: 42,
        });

        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "Download");
        assert_eq!(json["payload"]["event"], "Progress");
        assert_eq!(json["payload"]["status"], 42);
    }

    #[test]
    fn test_failures_and_display() {
        let failed = CoreEvent::Download(DownloadEvent::Failed {
            track_id: "id:abc".to_string(),
            message: "gone".to_string(),
            credentials_rejected: false,
        });
        let progress = CoreEvent::Download(DownloadEvent::Progress {
            track_id: "id:abc".to_string(),
            status: 7,
        });

        assert!(failed.is_failure());
        assert!(!progress.is_failure());
        assert_eq!(failed.to_string(), "id:abc failed: gone");
        assert_eq!(progress.to_string(), "id:abc at 7%");
        assert_eq!(stopped().track_id(), None);
    }
}
