//! Umbrella crate for hosts that want one dependency.
//!
//! With the default `desktop-shims` feature the service façade is available
//! as [`service`], already wired to the desktop bridges and Dropbox.

#[cfg(feature = "desktop-shims")]
pub use core_service as service;
