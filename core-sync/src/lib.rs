//! # Playlist Synchronization
//!
//! Reconciles the remote playlist folder with local playlist files and track
//! downloads.
//!
//! ## Overview
//!
//! This crate provides:
//! - `LocalScanner`: classifies files under the document root
//! - `listing`: normalizes remote listing entries
//! - `DownloadManager`: resumable per-track downloads with supersession
//! - `Reconciler`: purges files that no playlist references
//! - `SyncCoordinator`: the load/refresh/select/save/delete flows

pub mod coordinator;
pub mod download;
pub mod error;
pub mod listing;
pub mod reconciler;
pub mod scanner;

pub use coordinator::{RefreshReport, SyncConfig, SyncCoordinator};
pub use download::{
    progress_percent, ActivityMark, DownloadManager, DownloadOutcome, DownloadSession,
};
pub use error::{Result, SyncError};
pub use reconciler::{active_set, PurgeReport, Reconciler};
pub use scanner::LocalScanner;
