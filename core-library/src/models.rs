//! Domain models for playlists and their tracks
//!
//! These types are both the in-memory state and the on-disk playlist file
//! format, so field names follow the camelCase JSON layout.

use bridge_traits::storage::EntryTag;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::naming;

/// `download_status` value of a fully downloaded track
pub const DOWNLOAD_COMPLETE: u8 = 100;

/// Highest status reported while bytes are still arriving
pub const DOWNLOAD_IN_PROGRESS_MAX: u8 = 99;

// =============================================================================
// Track
// =============================================================================

/// One entry of a playlist.
///
/// `download_status` is `None` when no download was started, `0..=99` while
/// a transfer is running and `100` once the canonical local file exists.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Track {
    /// Stable remote identifier
    pub id: String,
    /// Remote revision tag
    pub rev: String,
    /// Display name including extension, e.g. `My Song.mp3`
    pub name: String,
    /// Remote location used as the download source
    #[serde(default)]
    pub path: Option<String>,
    #[serde(default)]
    pub download_status: Option<u8>,
}

impl Track {
    pub fn new(id: impl Into<String>, rev: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            rev: rev.into(),
            name: name.into(),
            path: None,
            download_status: None,
        }
    }

    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }

    /// Canonical local file name, see [`naming::track_file_name`].
    pub fn file_name(&self) -> String {
        naming::track_file_name(self)
    }

    pub fn is_downloaded(&self) -> bool {
        self.download_status == Some(DOWNLOAD_COMPLETE)
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.id.trim().is_empty() {
            return Err("Track id cannot be empty".to_string());
        }

        if self.rev.trim().is_empty() {
            return Err(format!("Track {} has an empty revision", self.id));
        }

        if let Some(status) = self.download_status {
            if status > DOWNLOAD_COMPLETE {
                return Err(format!(
                    "Track {} download status {} is out of range",
                    self.id, status
                ));
            }
        }

        Ok(())
    }
}

// =============================================================================
// Playlist
// =============================================================================

/// Remote identity of a playlist file.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlaylistMeta {
    /// Remote path (lower-cased by the provider); the playlist's identity
    pub path: String,
    #[serde(default)]
    pub path_display: Option<String>,
    /// Remote file name
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub rev: Option<String>,
    #[serde(default)]
    pub server_modified: Option<DateTime<Utc>>,
    /// Account id of the last editor
    #[serde(default)]
    pub modified_by: Option<String>,
}

impl PlaylistMeta {
    /// Meta taken from a normalized listing entry or upload response.
    pub fn from_entry(entry: &RemoteEntry) -> Self {
        Self {
            path: entry
                .path
                .clone()
                .unwrap_or_else(|| format!("/{}", entry.name.to_lowercase())),
            path_display: entry.path_display.clone(),
            name: entry.name.clone(),
            rev: entry.rev.clone(),
            server_modified: entry.server_modified,
            modified_by: entry.modified_by.clone(),
        }
    }

    /// True when `other` describes a different remote version.
    ///
    /// Revisions win when both sides have one; otherwise the modification
    /// timestamps are compared.
    pub fn differs_from(&self, other: &PlaylistMeta) -> bool {
        match (&self.rev, &other.rev) {
            (Some(a), Some(b)) => a != b,
            _ => self.server_modified != other.server_modified,
        }
    }
}

/// Contents of a playlist file as stored remotely.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlaylistData {
    pub title: String,
    /// Play order
    #[serde(default)]
    pub tracks: Vec<Track>,
}

/// A playlist snapshot: remote identity plus title and ordered tracks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Playlist {
    pub meta: PlaylistMeta,
    pub data: PlaylistData,
}

impl Playlist {
    pub fn new(meta: PlaylistMeta, data: PlaylistData) -> Self {
        Self { meta, data }
    }

    pub fn title(&self) -> &str {
        &self.data.title
    }

    pub fn tracks(&self) -> &[Track] {
        &self.data.tracks
    }

    /// Canonical local playlist file name, see [`naming::playlist_file_name`].
    pub fn file_name(&self) -> String {
        naming::playlist_file_name(&self.data.title)
    }

    pub fn track_index(&self, track_id: &str) -> Option<usize> {
        self.data.tracks.iter().position(|t| t.id == track_id)
    }

    pub fn track(&self, track_id: &str) -> Option<&Track> {
        self.data.tracks.iter().find(|t| t.id == track_id)
    }

    /// Update one track's status; returns whether the track exists.
    pub fn set_download_status(&mut self, track_id: &str, status: Option<u8>) -> bool {
        match self.data.tracks.iter_mut().find(|t| t.id == track_id) {
            Some(track) => {
                track.download_status = status;
                true
            }
            None => false,
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.meta.path.trim().is_empty() {
            return Err("Playlist path cannot be empty".to_string());
        }

        if self.data.title.trim().is_empty() {
            return Err("Playlist title cannot be empty".to_string());
        }

        self.data.tracks.iter().try_for_each(Track::validate)
    }
}

// =============================================================================
// Transient entries
// =============================================================================

/// Uniform view of one remote listing entry.
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteEntry {
    pub tag: EntryTag,
    pub name: String,
    pub id: Option<String>,
    /// Lower-cased remote path
    pub path: Option<String>,
    pub path_display: Option<String>,
    pub rev: Option<String>,
    pub server_modified: Option<DateTime<Utc>>,
    pub size: Option<u64>,
    pub modified_by: Option<String>,
    pub is_folder: bool,
    pub is_audio_file: bool,
    pub is_playlist: bool,
}

impl RemoteEntry {
    /// Track described by this entry, if it is an audio file with an id and
    /// revision.
    pub fn to_track(&self) -> Option<Track> {
        if !self.is_audio_file {
            return None;
        }

        let id = self.id.clone()?;
        let rev = self.rev.clone()?;
        let track = Track::new(id, rev, self.name.clone());
        Some(match &self.path {
            Some(path) => track.with_path(path.clone()),
            None => track,
        })
    }
}

/// Classification of a file name by extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum FileKind {
    Playlist,
    AudioFile,
    Unrelated,
}

impl FileKind {
    /// Playlist and audio files are owned by the engine and may be purged.
    pub fn is_managed(&self) -> bool {
        !matches!(self, FileKind::Unrelated)
    }
}

impl fmt::Display for FileKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FileKind::Playlist => write!(f, "playlist"),
            FileKind::AudioFile => write!(f, "audio"),
            FileKind::Unrelated => write!(f, "unrelated"),
        }
    }
}

/// One file found under the document root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalFile {
    pub name: String,
    pub kind: FileKind,
}

impl LocalFile {
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        let kind = naming::classify(&name);
        Self { name, kind }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn playlist() -> Playlist {
        Playlist::new(
            PlaylistMeta {
                path: "/playlists/road_trip.mix".to_string(),
                rev: Some("a1".to_string()),
                ..PlaylistMeta::default()
            },
            PlaylistData {
                title: "Road Trip".to_string(),
                tracks: vec![
                    Track::new("id:1", "r1", "One.mp3"),
                    Track::new("id:2", "r2", "Two.flac"),
                ],
            },
        )
    }

    #[test]
    fn test_playlist_json_layout() {
        let mut playlist = playlist();
        playlist.set_download_status("id:2", Some(DOWNLOAD_COMPLETE));

        let json = serde_json::to_value(&playlist).unwrap();
        assert_eq!(json["data"]["title"], "Road Trip");
        assert_eq!(json["data"]["tracks"][1]["downloadStatus"], 100);
        assert!(json["data"]["tracks"][0]["downloadStatus"].is_null());
        assert_eq!(json["meta"]["path"], "/playlists/road_trip.mix");
    }

    #[test]
    fn test_track_defaults_when_fields_missing() {
        let track: Track = serde_json::from_str(r#"{"id":"x","rev":"1","name":"a.mp3"}"#).unwrap();
        assert!(track.path.is_none());
        assert!(track.download_status.is_none());
    }

    #[test]
    fn test_set_download_status_unknown_track() {
        let mut playlist = playlist();
        assert!(!playlist.set_download_status("id:9", Some(5)));
        assert_eq!(playlist.track_index("id:2"), Some(1));
    }

    #[test]
    fn test_meta_differs_prefers_revision() {
        let now = Utc::now();
        let a = PlaylistMeta {
            rev: Some("1".to_string()),
            server_modified: Some(now),
            ..PlaylistMeta::default()
        };
        let mut b = a.clone();
        b.server_modified = None;
        assert!(!a.differs_from(&b));

        b.rev = Some("2".to_string());
        assert!(a.differs_from(&b));

        let c = PlaylistMeta {
            server_modified: Some(now),
            ..PlaylistMeta::default()
        };
        assert!(!c.differs_from(&c.clone()));
        assert!(c.differs_from(&PlaylistMeta::default()));
    }

    #[test]
    fn test_validate() {
        assert!(playlist().validate().is_ok());

        let mut bad = playlist();
        bad.data.title = "   ".to_string();
        assert!(bad.validate().is_err());

        let mut bad = playlist();
        bad.data.tracks[0].download_status = Some(101);
        assert!(bad.validate().is_err());
    }

    #[test]
    fn test_remote_entry_to_track() {
        let entry = RemoteEntry {
            tag: EntryTag::File,
            name: "Song.mp3".to_string(),
            id: Some("id:7".to_string()),
            path: Some("/music/song.mp3".to_string()),
            path_display: None,
            rev: Some("r7".to_string()),
            server_modified: None,
            size: Some(10),
            modified_by: None,
            is_folder: false,
            is_audio_file: true,
            is_playlist: false,
        };

        let track = entry.to_track().unwrap();
        assert_eq!(track.path.as_deref(), Some("/music/song.mp3"));
        assert_eq!(track.file_name(), "id:7_r7.mp3");

        let folder = RemoteEntry {
            is_audio_file: false,
            is_folder: true,
            ..entry
        };
        assert!(folder.to_track().is_none());
    }
}
