//! Persisted runtime state.
//!
//! Small key/value state that survives restarts: the volume, each
//! service's enabled flag and the play queue. Stored as TOML next to the
//! user's data:
//! - Linux: ~/.local/share/medley/state.toml
//! - macOS: ~/Library/Application Support/medley/state.toml
//! - Windows: %APPDATA%\medley\state.toml

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::config::write_atomic;
use crate::error::{Error, Result};
use crate::model::{ItemKey, SourceType};

/// Persisted state of one service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceRecord {
    pub enabled: bool,
}

/// Persisted play queue.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueRecord {
    pub songs: Vec<ItemKey>,
    pub index: usize,
}

/// Everything that is persisted.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PersistedState {
    pub volume: Option<f64>,
    /// Keyed by [`SourceType::as_str`]
    pub services: BTreeMap<String, ServiceRecord>,
    pub queue: QueueRecord,
}

/// Storage for [`PersistedState`].
pub trait StateStore: Send + Sync {
    fn service_state(&self, source: SourceType) -> Option<ServiceRecord>;
    fn save_service_state(&self, source: SourceType, record: ServiceRecord) -> Result<()>;
    fn volume(&self) -> Option<f64>;
    fn save_volume(&self, volume: f64) -> Result<()>;
    fn queue(&self) -> Option<QueueRecord>;
    fn save_queue(&self, queue: &QueueRecord) -> Result<()>;
}

/// In-memory store, for tests and throwaway sessions.
#[derive(Debug, Default)]
pub struct MemoryStateStore {
    state: Mutex<PersistedState>,
}

impl MemoryStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> PersistedState {
        self.state.lock().clone()
    }
}

impl StateStore for MemoryStateStore {
    fn service_state(&self, source: SourceType) -> Option<ServiceRecord> {
        self.state.lock().services.get(source.as_str()).copied()
    }

    fn save_service_state(&self, source: SourceType, record: ServiceRecord) -> Result<()> {
        self.state
            .lock()
            .services
            .insert(source.as_str().to_string(), record);
        Ok(())
    }

    fn volume(&self) -> Option<f64> {
        self.state.lock().volume
    }

    fn save_volume(&self, volume: f64) -> Result<()> {
        self.state.lock().volume = Some(volume);
        Ok(())
    }

    fn queue(&self) -> Option<QueueRecord> {
        let state = self.state.lock();
        (!state.queue.songs.is_empty()).then(|| state.queue.clone())
    }

    fn save_queue(&self, queue: &QueueRecord) -> Result<()> {
        self.state.lock().queue = queue.clone();
        Ok(())
    }
}

/// TOML file store. Every save rewrites the file atomically.
#[derive(Debug)]
pub struct TomlStateStore {
    path: PathBuf,
    state: Mutex<PersistedState>,
}

impl TomlStateStore {
    /// Open the store at `path`. A missing or unreadable file starts empty.
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let state = match std::fs::read_to_string(&path) {
            Ok(contents) => toml::from_str(&contents).unwrap_or_else(|e| {
                tracing::warn!(target: "store", path = %path.display(), error = %e, "Ignoring unreadable state file");
                PersistedState::default()
            }),
            Err(_) => PersistedState::default(),
        };
        Self {
            path,
            state: Mutex::new(state),
        }
    }

    /// Default location in the user data directory.
    pub fn default_path() -> Option<PathBuf> {
        dirs::data_dir().map(|d| d.join("medley").join("state.toml"))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn update(&self, change: impl FnOnce(&mut PersistedState)) -> Result<()> {
        let mut state = self.state.lock();
        change(&mut state);

        if let Some(dir) = self.path.parent() {
            std::fs::create_dir_all(dir)?;
        }
        let contents = toml::to_string_pretty(&*state)
            .map_err(|e| Error::config(format!("serializing state: {e}")))?;
        write_atomic(&self.path, &contents)?;
        Ok(())
    }
}

impl StateStore for TomlStateStore {
    fn service_state(&self, source: SourceType) -> Option<ServiceRecord> {
        self.state.lock().services.get(source.as_str()).copied()
    }

    fn save_service_state(&self, source: SourceType, record: ServiceRecord) -> Result<()> {
        self.update(|state| {
            state.services.insert(source.as_str().to_string(), record);
        })
    }

    fn volume(&self) -> Option<f64> {
        self.state.lock().volume
    }

    fn save_volume(&self, volume: f64) -> Result<()> {
        self.update(|state| state.volume = Some(volume))
    }

    fn queue(&self) -> Option<QueueRecord> {
        let state = self.state.lock();
        (!state.queue.songs.is_empty()).then(|| state.queue.clone())
    }

    fn save_queue(&self, queue: &QueueRecord) -> Result<()> {
        self.update(|state| state.queue = queue.clone())
    }
}
