//! # File Naming & Path Resolution
//!
//! Deterministic mapping from track and playlist identities to local file
//! names under the document root.
//!
//! ## Overview
//!
//! - A track's canonical name is `normalize("<id>_<rev>.<ext>")`, where `ext`
//!   comes from the track's display name. Only `id` and `rev` identify the
//!   file, so a new revision always lands in a new file.
//! - Normalization is not injective: id `a-b` with rev `c` and id `a` with
//!   rev `b-c` both map to `a_b_c`. Dropbox revisions are hex, so with real
//!   tracks two names only collide when their ids differ solely by `-`
//!   against `_` in the same positions.
//! - A playlist's canonical name is `normalize(title) + ".mix"`.
//! - Files being written carry an extra `.part` suffix until complete.
//!
//! Every function here is pure; normalizing an already normalized name is a
//! no-op.

use std::path::{Path, PathBuf};

use crate::models::{FileKind, Playlist, Track};

/// Extension of playlist files
pub const PLAYLIST_EXTENSION: &str = "mix";

/// Recognized audio extensions (compared case-insensitively)
pub const AUDIO_EXTENSIONS: &[&str] = &["mp3", "m4a", "aac", "wav", "flac", "ogg", "opus"];

/// Suffix of in-flight downloads
pub const PARTIAL_SUFFIX: &str = ".part";

/// Characters replaced by `_` in canonical names
const SEPARATORS: &[char] = &['-', '\u{2014}', ' '];

/// Trim surrounding whitespace and replace separator characters with `_`.
///
/// ```
/// use core_library::naming::normalize_name;
///
/// assert_eq!(normalize_name("  Road Trip \u{2014} 2024 "), "Road_Trip___2024");
/// assert_eq!(normalize_name("Road_Trip___2024"), "Road_Trip___2024");
/// ```
pub fn normalize_name(name: &str) -> String {
    name.trim().replace(SEPARATORS, "_")
}

/// Extension of a file name without the dot, if it has one.
pub fn extension(name: &str) -> Option<&str> {
    match name.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() && !ext.is_empty() => Some(ext),
        _ => None,
    }
}

pub fn is_audio_extension(ext: &str) -> bool {
    AUDIO_EXTENSIONS
        .iter()
        .any(|known| known.eq_ignore_ascii_case(ext))
}

pub fn is_playlist_extension(ext: &str) -> bool {
    PLAYLIST_EXTENSION.eq_ignore_ascii_case(ext)
}

/// Canonical local file name of a track.
///
/// Distinct `(id, rev)` pairs only collide when a separator inside the id or
/// revision lines up with the `_` joining them.
pub fn track_file_name(track: &Track) -> String {
    let base = format!("{}_{}", track.id, track.rev);
    match extension(&track.name) {
        Some(ext) => normalize_name(&format!("{}.{}", base, ext)),
        None => normalize_name(&base),
    }
}

/// Canonical local file name of a playlist with the given title.
pub fn playlist_file_name(title: &str) -> String {
    format!("{}.{}", normalize_name(title), PLAYLIST_EXTENSION)
}

/// Name of the partial file that precedes `file_name`.
pub fn partial_file_name(file_name: &str) -> String {
    format!("{}{}", file_name, PARTIAL_SUFFIX)
}

/// Classify a local or remote file name by extension.
///
/// A `.part` file counts as audio when the name under it is audio; partial
/// playlists never exist, so anything else ending in `.part` is unrelated.
pub fn classify(name: &str) -> FileKind {
    if let Some(stem) = name.strip_suffix(PARTIAL_SUFFIX) {
        return match extension(stem) {
            Some(ext) if is_audio_extension(ext) => FileKind::AudioFile,
            _ => FileKind::Unrelated,
        };
    }

    match extension(name) {
        Some(ext) if is_playlist_extension(ext) => FileKind::Playlist,
        Some(ext) if is_audio_extension(ext) => FileKind::AudioFile,
        _ => FileKind::Unrelated,
    }
}

/// Joins canonical names onto the document root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathResolver {
    root: PathBuf,
}

impl PathResolver {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn resolve(&self, file_name: &str) -> PathBuf {
        self.root.join(file_name)
    }

    pub fn track_path(&self, track: &Track) -> PathBuf {
        self.resolve(&track_file_name(track))
    }

    pub fn partial_path(&self, track: &Track) -> PathBuf {
        self.resolve(&partial_file_name(&track_file_name(track)))
    }

    pub fn playlist_path(&self, playlist: &Playlist) -> PathBuf {
        self.resolve(&playlist.file_name())
    }
}
