//! Playback state shared by all services.

use parking_lot::RwLock;
use serde::Serialize;
use std::fmt;

use crate::model::SourceType;

/// Global now-playing state.
///
/// Only one service plays at a time, so every service reports into the
/// same instance.
#[derive(Debug, Clone, PartialEq)]
pub struct PlayerState {
    pub playing: bool,
    /// Depth of transport operations in progress
    pub loading: u32,
    /// Position in seconds
    pub time: f64,
    /// Duration of the current song in seconds
    pub duration: f64,
    /// Volume in [0, 1]
    pub volume: f64,
}

impl Default for PlayerState {
    fn default() -> Self {
        Self {
            playing: false,
            loading: 0,
            time: 0.0,
            duration: 1.0,
            volume: 1.0,
        }
    }
}

impl PlayerState {
    pub fn is_loading(&self) -> bool {
        self.loading > 0
    }

    /// Position as a fraction of the duration.
    pub fn progress(&self) -> f64 {
        if self.duration > 0.0 {
            (self.time / self.duration).clamp(0.0, 1.0)
        } else {
            0.0
        }
    }
}

/// Marks a transport operation in progress for as long as it lives.
pub struct LoadingGuard<'a> {
    state: &'a RwLock<PlayerState>,
}

impl<'a> LoadingGuard<'a> {
    pub(crate) fn new(state: &'a RwLock<PlayerState>) -> Self {
        state.write().loading += 1;
        Self { state }
    }
}

impl Drop for LoadingGuard<'_> {
    fn drop(&mut self) {
        let mut state = self.state.write();
        state.loading = state.loading.saturating_sub(1);
    }
}

/// Transport position of one service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Transport {
    #[default]
    Stopped,
    Playing,
    Paused,
}

/// Lifecycle state of one service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ServiceState {
    Disabled,
    Enabling,
    Uninitialized,
    Initializing,
    Initialized,
    Playing,
    Paused,
}

impl fmt::Display for ServiceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Disabled => "disabled",
            Self::Enabling => "enabling",
            Self::Uninitialized => "uninitialized",
            Self::Initializing => "initializing",
            Self::Initialized => "initialized",
            Self::Playing => "playing",
            Self::Paused => "paused",
        };
        f.write_str(name)
    }
}

/// Playback notifications raised by a backend's output.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ServiceEvent {
    /// Position changed, in seconds
    TimeUpdate(f64),
    Playing,
    Ended,
}

/// A [`ServiceEvent`] tagged with the service that raised it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Notice {
    pub source: SourceType,
    pub event: ServiceEvent,
}
