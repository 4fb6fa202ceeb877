//! Remote Listing Normalizer
//!
//! Turns provider listing entries into [`RemoteEntry`] values with derived
//! classification flags.

use bridge_traits::storage::{EntryTag, RemoteFile};
use core_library::naming;
use core_library::RemoteEntry;
use std::collections::HashSet;

/// Normalize a single raw entry. Missing optional fields stay `None`.
pub fn normalize_entry(file: RemoteFile) -> RemoteEntry {
    let is_file = file.tag == EntryTag::File;
    let extension = naming::extension(&file.name);

    RemoteEntry {
        is_folder: file.tag == EntryTag::Folder,
        is_audio_file: is_file && extension.map_or(false, naming::is_audio_extension),
        is_playlist: is_file && extension.map_or(false, naming::is_playlist_extension),
        tag: file.tag,
        name: file.name,
        id: file.id,
        path: file.path_lower,
        path_display: file.path_display,
        rev: file.rev,
        server_modified: file.server_modified,
        size: file.size,
        modified_by: file.modified_by.filter(|id| !id.trim().is_empty()),
    }
}

pub fn normalize(files: Vec<RemoteFile>) -> Vec<RemoteEntry> {
    files.into_iter().map(normalize_entry).collect()
}

/// Distinct, non-empty `modified_by` ids of `entries`.
pub fn modified_users(entries: &[RemoteEntry]) -> HashSet<String> {
    entries
        .iter()
        .filter_map(|entry| entry.modified_by.clone())
        .filter(|id| !id.is_empty())
        .collect()
}
