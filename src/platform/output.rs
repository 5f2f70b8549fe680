use async_trait::async_trait;
use parking_lot::Mutex;

use crate::error::Result;

/// What an [`AudioOutput`] should play.
#[derive(Debug, Clone, PartialEq)]
pub enum MediaSource {
    /// Encoded audio read from a local file
    Bytes { data: Vec<u8>, mime_type: String },
    /// Catalog item played by the platform's catalog player
    Catalog { id: String },
}

impl MediaSource {
    fn describe(&self) -> String {
        match self {
            Self::Bytes { data, mime_type } => format!("{} bytes of {}", data.len(), mime_type),
            Self::Catalog { id } => format!("catalog item {id}"),
        }
    }
}

/// Audio device capability.
///
/// Decoding and output happen outside the crate; backends only drive the
/// transport.
#[async_trait]
pub trait AudioOutput: Send + Sync {
    async fn open(&self) -> Result<()>;
    async fn close(&self) -> Result<()>;
    async fn load(&self, source: MediaSource) -> Result<()>;
    async fn play(&self) -> Result<()>;
    async fn pause(&self) -> Result<()>;
    async fn stop(&self) -> Result<()>;
    async fn seek(&self, seconds: f64) -> Result<()>;
    async fn set_volume(&self, level: f64) -> Result<()>;
}

/// Snapshot of a [`DetachedOutput`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OutputState {
    pub open: bool,
    pub loaded: Option<String>,
    pub playing: bool,
    pub position: f64,
    pub volume: f64,
}

/// Headless output that only tracks transport state.
///
/// Used by the command-line front end, which has no audio device.
#[derive(Debug)]
pub struct DetachedOutput {
    state: Mutex<OutputState>,
}

impl Default for DetachedOutput {
    fn default() -> Self {
        Self::new()
    }
}

impl DetachedOutput {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(OutputState {
                volume: 1.0,
                ..OutputState::default()
            }),
        }
    }

    pub fn state(&self) -> OutputState {
        self.state.lock().clone()
    }
}

#[async_trait]
impl AudioOutput for DetachedOutput {
    async fn open(&self) -> Result<()> {
        self.state.lock().open = true;
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        *self.state.lock() = OutputState::default();
        Ok(())
    }

    async fn load(&self, source: MediaSource) -> Result<()> {
        let description = source.describe();
        tracing::debug!(target: "platform::output", source = %description, "Loaded");
        let mut state = self.state.lock();
        state.loaded = Some(description);
        state.position = 0.0;
        Ok(())
    }

    async fn play(&self) -> Result<()> {
        self.state.lock().playing = true;
        Ok(())
    }

    async fn pause(&self) -> Result<()> {
        self.state.lock().playing = false;
        Ok(())
    }

    async fn stop(&self) -> Result<()> {
        let mut state = self.state.lock();
        state.playing = false;
        state.loaded = None;
        state.position = 0.0;
        Ok(())
    }

    async fn seek(&self, seconds: f64) -> Result<()> {
        self.state.lock().position = seconds.max(0.0);
        Ok(())
    }

    async fn set_volume(&self, level: f64) -> Result<()> {
        self.state.lock().volume = level.clamp(0.0, 1.0);
        Ok(())
    }
}
