//! # Playback Controller
//!
//! Owns the single engine handle and the play queue.
//!
//! ## Overview
//!
//! - Only one sound is loaded at a time. Loading a track first unloads the
//!   previous handle; a failed unload is logged and never blocks the switch.
//! - Transport calls (`load_track`, `set_playing`, `seek_to`, `stop`) are
//!   serialized so two switches never interleave their unload/load pairs.
//! - Engine failures stop playback, release the handle and emit
//!   [`PlaybackEvent::Error`]. There is no retry and no skip to the next track.
//!
//! The controller does not know where audio comes from. Navigation methods
//! return the index to load and the caller resolves a source for it.

use bridge_traits::playback::{AudioEngine, AudioHandle, AudioSource, EngineStatus};
use core_runtime::events::{CoreEvent, EventBus, PlaybackEvent};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, instrument, warn};

use crate::error::{PlaybackError, Result};
use crate::navigation::{self, Direction};

/// Point-in-time view of the player.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PlaybackSnapshot {
    pub index: Option<usize>,
    pub track_id: Option<String>,
    pub is_loaded: bool,
    pub is_playing: bool,
    pub position: Duration,
    pub duration: Option<Duration>,
}

#[derive(Debug, Default)]
struct PlayerState {
    queue: Vec<String>,
    index: Option<usize>,
    handle: Option<AudioHandle>,
    is_playing: bool,
    position: Duration,
    duration: Option<Duration>,
}

impl PlayerState {
    fn current_track_id(&self) -> Option<String> {
        self.index.and_then(|index| self.queue.get(index).cloned())
    }
}

pub struct PlaybackController {
    engine: Arc<dyn AudioEngine>,
    event_bus: EventBus,
    state: Mutex<PlayerState>,
    transport: tokio::sync::Mutex<()>,
}

impl PlaybackController {
    pub fn new(engine: Arc<dyn AudioEngine>, event_bus: EventBus) -> Self {
        Self {
            engine,
            event_bus,
            state: Mutex::new(PlayerState::default()),
            transport: tokio::sync::Mutex::new(()),
        }
    }

    // =========================================================================
    // Queue
    // =========================================================================

    /// Replace the queue with the given track ids.
    ///
    /// The selection follows the current track if it is still queued, and is
    /// cleared otherwise. The loaded sound keeps playing either way.
    pub fn set_queue(&self, track_ids: Vec<String>) {
        let mut state = self.state.lock();
        let current = state.current_track_id();
        state.index = current.and_then(|id| track_ids.iter().position(|t| *t == id));
        state.queue = track_ids;
    }

    pub fn queue(&self) -> Vec<String> {
        self.state.lock().queue.clone()
    }

    pub fn current_index(&self) -> Option<usize> {
        self.state.lock().index
    }

    pub fn current_track_id(&self) -> Option<String> {
        self.state.lock().current_track_id()
    }

    pub fn snapshot(&self) -> PlaybackSnapshot {
        let state = self.state.lock();
        PlaybackSnapshot {
            index: state.index,
            track_id: state.current_track_id(),
            is_loaded: state.handle.is_some(),
            is_playing: state.is_playing,
            position: state.position,
            duration: state.duration,
        }
    }

    /// Index to load when moving one track in `direction`.
    ///
    /// At either end of the queue this is the current index; loading it again
    /// is up to the caller.
    pub fn change_track(&self, forward: bool) -> Option<usize> {
        let state = self.state.lock();
        navigation::step(
            state.index,
            state.queue.len(),
            Direction::from_forward(forward),
        )
    }

    // =========================================================================
    // Transport
    // =========================================================================

    /// Load the queued track at `index` from `source`, replacing the current
    /// sound. Playback does not start.
    #[instrument(skip(self, source), fields(remote = source.is_remote()))]
    pub async fn load_track(&self, index: usize, source: AudioSource) -> Result<()> {
        let _transport = self.transport.lock().await;

        let track_id = {
            let mut state = self.state.lock();
            let len = state.queue.len();
            let track_id = state
                .queue
                .get(index)
                .cloned()
                .ok_or(PlaybackError::InvalidIndex { index, len })?;
            state.index = Some(index);
            track_id
        };

        self.release().await;

        match self.engine.load(source).await {
            Ok(handle) => {
                {
                    let mut state = self.state.lock();
                    state.handle = Some(handle);
                    state.is_playing = false;
                    state.position = Duration::ZERO;
                    state.duration = None;
                }
                info!(track_id = %track_id, index, "Track loaded");
                self.emit(PlaybackEvent::TrackLoaded { track_id, index });
                Ok(())
            }
            Err(e) => Err(self.abort(e.into()).await),
        }
    }

    pub async fn play(&self) -> Result<()> {
        self.set_playing(true).await
    }

    pub async fn pause(&self) -> Result<()> {
        self.set_playing(false).await
    }

    /// Resume or pause the loaded sound.
    pub async fn set_playing(&self, playing: bool) -> Result<()> {
        let _transport = self.transport.lock().await;
        let handle = self.loaded_handle()?;

        let result = if playing {
            self.engine.play(handle).await
        } else {
            self.engine.pause(handle).await
        };
        if let Err(e) = result {
            return Err(self.abort(e.into()).await);
        }

        let track_id = {
            let mut state = self.state.lock();
            state.is_playing = playing;
            state.current_track_id().unwrap_or_default()
        };
        self.emit(if playing {
            PlaybackEvent::Playing { track_id }
        } else {
            PlaybackEvent::Paused { track_id }
        });
        Ok(())
    }

    /// Seek to `fraction` of the track, clamped to `0.0..=1.0`.
    ///
    /// Returns the absolute position sought to.
    pub async fn seek_to(&self, fraction: f64) -> Result<Duration> {
        let _transport = self.transport.lock().await;
        let handle = self.loaded_handle()?;
        let fraction = if fraction.is_nan() {
            0.0
        } else {
            fraction.clamp(0.0, 1.0)
        };

        let status = match self.engine.status(handle).await {
            Ok(status) => status,
            Err(e) => return Err(self.abort(e.into()).await),
        };
        let duration = status
            .duration
            .or(self.state.lock().duration)
            .ok_or(PlaybackError::DurationUnknown)?;

        let position = duration.mul_f64(fraction);
        if let Err(e) = self.engine.seek(handle, position).await {
            return Err(self.abort(e.into()).await);
        }

        let mut state = self.state.lock();
        state.position = position;
        state.duration = Some(duration);
        debug!(?position, "Seeked");
        Ok(position)
    }

    /// Unload the current sound. The selection is kept.
    pub async fn stop(&self) {
        let _transport = self.transport.lock().await;
        self.release().await;
        self.emit(PlaybackEvent::Stopped);
    }

    // =========================================================================
    // Engine callbacks
    // =========================================================================

    /// The current track played to its end.
    ///
    /// Returns the next index to load, or `None` after stopping at the end
    /// of the queue.
    pub async fn track_complete(&self) -> Option<usize> {
        let (track_id, next) = {
            let state = self.state.lock();
            let next = state
                .index
                .and_then(|index| navigation::after_completion(index, state.queue.len()));
            (state.current_track_id(), next)
        };

        if let Some(track_id) = track_id {
            self.emit(PlaybackEvent::Completed { track_id });
        }
        if next.is_none() {
            debug!("End of queue");
            self.stop().await;
        }
        next
    }

    /// Apply a status update pushed by the engine.
    ///
    /// Updates for handles other than the loaded one are ignored. Returns
    /// `true` when the update reports natural completion; the caller then
    /// runs [`track_complete`](Self::track_complete).
    pub fn on_engine_status(&self, handle: AudioHandle, status: EngineStatus) -> bool {
        let mut state = self.state.lock();
        if state.handle != Some(handle) {
            debug!("Ignoring status of an unloaded sound");
            return false;
        }

        state.position = status.position;
        state.duration = status.duration.or(state.duration);
        state.is_playing = status.is_playing && !status.did_just_finish;
        status.did_just_finish
    }

    /// Handle a fault reported by the engine: stop, unload and surface it.
    pub async fn on_engine_error(&self, message: impl Into<String>) -> PlaybackError {
        let _transport = self.transport.lock().await;
        self.abort(PlaybackError::EngineFault(message.into())).await
    }

    // =========================================================================
    // Helpers
    // =========================================================================

    fn loaded_handle(&self) -> Result<AudioHandle> {
        self.state.lock().handle.ok_or(PlaybackError::NoTrackLoaded)
    }

    /// Unload the current handle, if any. Failures are logged only.
    async fn release(&self) {
        let handle = {
            let mut state = self.state.lock();
            state.is_playing = false;
            state.handle.take()
        };

        if let Some(handle) = handle {
            if let Err(e) = self.engine.unload(handle).await {
                warn!(error = %e, "Failed to unload previous sound");
            }
        }
    }

    /// Stop after an engine failure. Callers hold the transport lock.
    async fn abort(&self, error: PlaybackError) -> PlaybackError {
        error!(error = %error, "Playback aborted");
        self.release().await;
        self.emit(PlaybackEvent::Stopped);
        self.emit(PlaybackEvent::Error {
            message: error.to_string(),
        });
        error
    }

    fn emit(&self, event: PlaybackEvent) {
        self.event_bus.emit(CoreEvent::Playback(event)).ok();
    }
}
