//! Flat, serializable projections of core state for the UI layer.

use chrono::{DateTime, Utc};
use core_library::{Playlist, Track};
use core_playback::PlaybackSnapshot;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackView {
    pub id: String,
    pub name: String,
    pub index: usize,
    /// `None` when not downloaded, `0..=99` while downloading, `100` when ready
    pub download_status: Option<u8>,
}

impl TrackView {
    pub fn new(index: usize, track: &Track) -> Self {
        Self {
            id: track.id.clone(),
            name: track.name.clone(),
            index,
            download_status: track.download_status,
        }
    }

    pub fn list(playlist: &Playlist) -> Vec<Self> {
        playlist
            .tracks()
            .iter()
            .enumerate()
            .map(|(index, track)| Self::new(index, track))
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlaylistView {
    pub title: String,
    pub path: String,
    pub last_updated: Option<DateTime<Utc>>,
    /// Display name of the last editor, when it could be resolved
    pub owner: Option<String>,
}

impl PlaylistView {
    pub fn new(playlist: &Playlist, owner: Option<String>) -> Self {
        Self {
            title: playlist.data.title.clone(),
            path: playlist.meta.path.clone(),
            last_updated: playlist.meta.server_modified,
            owner,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlaybackView {
    pub index: Option<usize>,
    pub is_playing: bool,
    /// Playhead as a fraction of the duration, once the duration is known
    pub progress: Option<f64>,
}

impl From<PlaybackSnapshot> for PlaybackView {
    fn from(snapshot: PlaybackSnapshot) -> Self {
        let progress = snapshot
            .duration
            .filter(|duration| !duration.is_zero())
            .map(|duration| {
                (snapshot.position.as_secs_f64() / duration.as_secs_f64()).clamp(0.0, 1.0)
            });

        Self {
            index: snapshot.index,
            is_playing: snapshot.is_playing,
            progress,
        }
    }
}
