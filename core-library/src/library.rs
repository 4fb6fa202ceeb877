//! In-memory set of known playlists.

use parking_lot::RwLock;
use std::sync::Arc;
use tracing::debug;

use crate::models::{Playlist, Track};

/// Result of [`PlaylistLibrary::upsert`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    Inserted,
    Updated,
    Unchanged,
}

impl UpsertOutcome {
    pub fn is_change(&self) -> bool {
        !matches!(self, UpsertOutcome::Unchanged)
    }
}

/// Ordered collection of playlists keyed by remote path.
///
/// Cheap to clone; clones share state. Locks are never held across an
/// `.await`, so callers always work on owned snapshots.
#[derive(Debug, Clone, Default)]
pub struct PlaylistLibrary {
    playlists: Arc<RwLock<Vec<Playlist>>>,
}

impl PlaylistLibrary {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.playlists.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.playlists.read().is_empty()
    }

    /// Snapshot of every playlist in insertion order.
    pub fn list(&self) -> Vec<Playlist> {
        self.playlists.read().clone()
    }

    pub fn get(&self, path: &str) -> Option<Playlist> {
        self.playlists
            .read()
            .iter()
            .find(|p| p.meta.path == path)
            .cloned()
    }

    pub fn contains(&self, path: &str) -> bool {
        self.playlists.read().iter().any(|p| p.meta.path == path)
    }

    /// Insert a playlist or replace the one with the same path in place.
    pub fn upsert(&self, playlist: Playlist) -> UpsertOutcome {
        self.upsert_with(playlist, |_| false)
    }

    /// Like [`upsert`](Self::upsert), but every incoming track for which
    /// `keep_status` holds takes the status the library currently has for its
    /// id. Both happen under one write lock.
    pub fn upsert_with(
        &self,
        mut playlist: Playlist,
        keep_status: impl Fn(&Track) -> bool,
    ) -> UpsertOutcome {
        let mut playlists = self.playlists.write();
        for track in playlist.data.tracks.iter_mut() {
            if !keep_status(track) {
                continue;
            }
            if let Some(current) = playlists.iter().find_map(|p| p.track(&track.id)) {
                track.download_status = current.download_status;
            }
        }

        match playlists
            .iter_mut()
            .find(|p| p.meta.path == playlist.meta.path)
        {
            Some(existing) if *existing == playlist => UpsertOutcome::Unchanged,
            Some(existing) => {
                debug!(path = %playlist.meta.path, "Replacing playlist");
                *existing = playlist;
                UpsertOutcome::Updated
            }
            None => {
                debug!(path = %playlist.meta.path, "Adding playlist");
                playlists.push(playlist);
                UpsertOutcome::Inserted
            }
        }
    }

    pub fn remove(&self, path: &str) -> Option<Playlist> {
        let mut playlists = self.playlists.write();
        let index = playlists.iter().position(|p| p.meta.path == path)?;
        Some(playlists.remove(index))
    }

    /// First track with this id in any playlist.
    pub fn track(&self, track_id: &str) -> Option<Track> {
        self.playlists
            .read()
            .iter()
            .find_map(|p| p.track(track_id).cloned())
    }

    /// Snapshots of every playlist that contains the track.
    pub fn playlists_with_track(&self, track_id: &str) -> Vec<Playlist> {
        self.playlists
            .read()
            .iter()
            .filter(|p| p.track(track_id).is_some())
            .cloned()
            .collect()
    }

    /// Set a track's status in every playlist that contains it.
    ///
    /// Returns the number of playlists touched.
    pub fn set_track_status(&self, track_id: &str, status: Option<u8>) -> usize {
        self.playlists
            .write()
            .iter_mut()
            .map(|p| p.set_download_status(track_id, status))
            .filter(|touched| *touched)
            .count()
    }
}
