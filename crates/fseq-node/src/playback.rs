//! Playback engine and effect bridge seams.
//!
//! Decoding and rendering sequence frames happens behind [`PlaybackEngine`];
//! switching the light output between remote playback and its normal
//! effects happens behind [`EffectBridge`]. The daemon ships a wall-clock
//! [`SimulatedEngine`] and a [`LoggingBridge`] so it runs without output
//! hardware.

use std::sync::Arc;
use std::time::{Duration, Instant};

use thiserror::Error;

use crate::storage::Storage;

#[derive(Debug, Error)]
pub enum PlaybackError {
    #[error("sequence {0} not found")]
    NotFound(String),
    #[error("engine error: {0}")]
    Engine(String),
}

pub trait PlaybackEngine: Send {
    /// Open `path` and start playing `start_secs` into it.
    fn load(&mut self, path: &str, start_secs: f32, looping: bool) -> Result<(), PlaybackError>;

    /// Seek the running sequence to `elapsed_secs` without reopening it.
    fn sync_to(&mut self, elapsed_secs: f32);

    fn stop(&mut self);

    fn is_playing(&self) -> bool;

    /// Absolute device path of the loaded sequence, if playing.
    fn file_name(&self) -> Option<String>;

    fn elapsed_seconds(&self) -> f32;

    fn set_looping(&mut self, looping: bool);

    fn render_next_frame(&mut self);
}

pub trait EffectBridge: Send {
    /// Hand the light output to remote playback.
    fn enter_remote_playback(&mut self);

    /// Return the light output to its normal effects.
    fn release_realtime(&mut self);
}

// ── Simulated engine ────────────────────────────────────────────────

/// Frame period of the simulated engine.
pub const SIM_FRAME_INTERVAL: Duration = Duration::from_millis(25);

struct Playing {
    path: String,
    /// Instant that corresponds to elapsed time zero.
    origin: Instant,
    frames_rendered: u64,
}

/// Engine that tracks position against the wall clock.
///
/// It checks that the sequence exists in storage but never decodes it.
pub struct SimulatedEngine {
    storage: Arc<dyn Storage>,
    current: Option<Playing>,
    looping: bool,
}

impl SimulatedEngine {
    pub fn new(storage: Arc<dyn Storage>) -> Self {
        Self {
            storage,
            current: None,
            looping: false,
        }
    }

    pub fn is_looping(&self) -> bool {
        self.looping
    }

    pub fn frames_rendered(&self) -> u64 {
        self.current.as_ref().map_or(0, |p| p.frames_rendered)
    }
}

fn origin_for(elapsed_secs: f32) -> Instant {
    // Elapsed time comes off the wire; NaN, negative and huge values pin to zero.
    let offset = Duration::try_from_secs_f32(elapsed_secs).unwrap_or_default();
    let now = Instant::now();
    now.checked_sub(offset).unwrap_or(now)
}

impl PlaybackEngine for SimulatedEngine {
    fn load(&mut self, path: &str, start_secs: f32, looping: bool) -> Result<(), PlaybackError> {
        if !self.storage.exists(path) {
            return Err(PlaybackError::NotFound(path.to_string()));
        }
        tracing::debug!(path, start_secs, looping, "simulated engine loaded");
        self.current = Some(Playing {
            path: path.to_string(),
            origin: origin_for(start_secs),
            frames_rendered: 0,
        });
        self.looping = looping;
        Ok(())
    }

    fn sync_to(&mut self, elapsed_secs: f32) {
        if let Some(p) = self.current.as_mut() {
            p.origin = origin_for(elapsed_secs);
        }
    }

    fn stop(&mut self) {
        self.current = None;
    }

    fn is_playing(&self) -> bool {
        self.current.is_some()
    }

    fn file_name(&self) -> Option<String> {
        self.current.as_ref().map(|p| p.path.clone())
    }

    fn elapsed_seconds(&self) -> f32 {
        self.current
            .as_ref()
            .map_or(0.0, |p| p.origin.elapsed().as_secs_f32())
    }

    fn set_looping(&mut self, looping: bool) {
        self.looping = looping;
    }

    fn render_next_frame(&mut self) {
        if let Some(p) = self.current.as_mut() {
            p.frames_rendered += 1;
        }
    }
}

// ── Logging bridge ──────────────────────────────────────────────────

/// Bridge that only records transitions in the log.
#[derive(Debug, Default)]
pub struct LoggingBridge {
    remote: bool,
}

impl LoggingBridge {
    pub fn is_remote(&self) -> bool {
        self.remote
    }
}

impl EffectBridge for LoggingBridge {
    fn enter_remote_playback(&mut self) {
        if !self.remote {
            tracing::info!("output handed to remote playback");
        }
        self.remote = true;
    }

    fn release_realtime(&mut self) {
        if self.remote {
            tracing::info!("output returned to effects");
        }
        self.remote = false;
    }
}
