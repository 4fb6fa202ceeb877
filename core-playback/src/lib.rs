//! # Playback Control
//!
//! Drives a host [`AudioEngine`](bridge_traits::playback::AudioEngine)
//! through a play queue.
//!
//! ## Overview
//!
//! This crate handles:
//! - The single loaded sound and its transport (play, pause, seek, stop)
//! - Queue navigation that clamps at both ends
//! - Reacting to engine status pushes and faults

pub mod controller;
pub mod error;
pub mod navigation;

pub use controller::{PlaybackController, PlaybackSnapshot};
pub use error::{PlaybackError, Result};
pub use navigation::Direction;
