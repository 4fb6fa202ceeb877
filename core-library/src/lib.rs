//! # Playlist Library
//!
//! Domain models and local persistence for playlists and their tracks.
//!
//! ## Overview
//!
//! This crate provides:
//! - `Track`, `Playlist` and the transient `RemoteEntry`/`LocalFile` views
//! - Canonical file naming and path resolution under the document root
//! - `PlaylistLibrary`, the in-memory set of known playlists
//! - `PlaylistStore`, one JSON file per playlist on disk
//!
//! There is no database: the document root is the persistence layer and is
//! reconciled against the remote listing on every sync.

pub mod error;
pub mod library;
pub mod models;
pub mod naming;
pub mod store;

pub use error::{LibraryError, Result};
pub use library::{PlaylistLibrary, UpsertOutcome};
pub use models::{
    FileKind, LocalFile, Playlist, PlaylistData, PlaylistMeta, RemoteEntry, Track,
    DOWNLOAD_COMPLETE, DOWNLOAD_IN_PROGRESS_MAX,
};
pub use naming::PathResolver;
pub use store::PlaylistStore;
