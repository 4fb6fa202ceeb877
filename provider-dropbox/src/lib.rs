//! # Dropbox Provider
//!
//! Implements the `StorageProvider` trait for the Dropbox HTTP API v2.
//!
//! ## Overview
//!
//! This module provides:
//! - Folder listing with cursor pagination
//! - Metadata lookups for revision checks
//! - Small-file downloads and the request used for streamed track downloads
//! - Uploads with explicit write mode (`add`/`overwrite`, no autorename)
//! - Account display-name lookup for `modified_by` ids
//! - Rate limiting and exponential backoff
//!
//! Content endpoints take their arguments in the `Dropbox-API-Arg` header,
//! which must be ASCII; [`header::http_header_safe_json`] produces that value.

pub mod connector;
pub mod error;
pub mod header;
pub mod types;

pub use connector::{DropboxConfig, DropboxConnector};
pub use error::{DropboxError, Result};
pub use header::http_header_safe_json;
