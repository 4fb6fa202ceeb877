//! Desktop capabilities for macOS, Windows and Linux.
//!
//! [`ReqwestHttpClient`] serves API calls and streams audio downloads with
//! `Range` resume. [`TokioFileSystem`] keeps playlist and track files in one
//! flat document directory, by default `<data dir>/mixtape`.
//!
//! `core-runtime` injects both when its `desktop-shims` feature is on and the
//! host did not supply its own.

mod filesystem;
mod http;

pub use filesystem::TokioFileSystem;
pub use http::ReqwestHttpClient;
