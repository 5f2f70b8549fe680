//! Configuration system using TOML files.
//!
//! Config is stored in the OS-standard config directory:
//! - Windows: %APPDATA%\medley\config.toml
//! - macOS: ~/Library/Application Support/medley/config.toml
//! - Linux: ~/.config/medley/config.toml
//!
//! The config file is human-readable and editable. Settings are
//! loaded at startup; runtime state (volume, queue, enabled services)
//! lives in the separate state file, see [`crate::store`].

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// API credentials (keep separate for potential future encryption)
    pub credentials: Credentials,

    /// Local library settings
    pub library: LibraryConfig,

    /// Streaming catalog settings
    pub catalog: CatalogConfig,

    /// Artwork storage settings
    pub artwork: ArtworkConfig,

    /// Search settings
    pub search: SearchConfig,

    /// Persisted state location
    pub state: StateConfig,
}

/// API credentials
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Credentials {
    /// Developer token for the streaming catalog
    pub catalog_developer_token: Option<String>,

    /// Music user token obtained by the authorization flow
    pub catalog_user_token: Option<String>,
}

/// Local library settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LibraryConfig {
    /// Music folder override (empty = OS audio directory)
    pub music_root: Option<PathBuf>,

    /// Directory names skipped during traversal
    pub skip_dirs: Vec<String>,
}

impl Default for LibraryConfig {
    fn default() -> Self {
        Self {
            music_root: None,
            skip_dirs: vec![
                ".Trash".to_string(),
                ".Trashes".to_string(),
                "$RECYCLE.BIN".to_string(),
            ],
        }
    }
}

/// Streaming catalog settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CatalogConfig {
    /// Storefront (country) code used in catalog paths
    pub storefront: String,

    /// API base URL
    pub base_url: String,
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            storefront: "us".to_string(),
            base_url: "https://api.music.apple.com".to_string(),
        }
    }
}

/// Artwork storage settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ArtworkConfig {
    /// Largest stored edge in pixels
    pub max_size: u32,

    /// Storage directory override (empty = user cache directory)
    pub cache_dir: Option<PathBuf>,
}

impl Default for ArtworkConfig {
    fn default() -> Self {
        Self {
            max_size: 512,
            cache_dir: None,
        }
    }
}

/// Search settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    /// Results per page
    pub page_size: usize,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self { page_size: 25 }
    }
}

/// Persisted state location
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StateConfig {
    /// State file override (empty = user data directory)
    pub path: Option<PathBuf>,
}

// ============================================================================
// Config File Operations
// ============================================================================

/// Get the config directory path
pub fn config_dir() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("medley"))
}

/// Get the full path to the config file
pub fn config_path() -> Option<PathBuf> {
    config_dir().map(|d| d.join("config.toml"))
}

/// Load the configuration from the OS config directory.
///
/// Never fails: a missing, unreadable or invalid file yields the
/// defaults, and the reason is logged.
pub fn load() -> Config {
    match config_path() {
        Some(path) => load_from(&path),
        None => {
            tracing::warn!(target: "config", "No config directory on this system, using defaults");
            Config::default()
        }
    }
}

/// Load the configuration at `path`, falling back to the defaults.
pub fn load_from(path: &Path) -> Config {
    let contents = match std::fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            tracing::info!(target: "config", path = %path.display(), "No config file, using defaults");
            return Config::default();
        }
        Err(e) => {
            tracing::error!(target: "config", path = %path.display(), error = %e, "Failed to read config, using defaults");
            return Config::default();
        }
    };

    match toml::from_str(&contents) {
        Ok(config) => {
            tracing::info!(target: "config", path = %path.display(), "Loaded config");
            config
        }
        Err(e) => {
            tracing::error!(target: "config", path = %path.display(), error = %e, "Invalid config, using defaults");
            Config::default()
        }
    }
}

/// Save the configuration to the OS config directory.
pub fn save(config: &Config) -> Result<PathBuf, ConfigError> {
    let path = config_path().ok_or(ConfigError::NoConfigDir)?;
    save_to(config, &path)?;
    Ok(path)
}

/// Save the configuration at `path`, creating its directory.
pub fn save_to(config: &Config, path: &Path) -> Result<(), ConfigError> {
    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir).map_err(|e| ConfigError::CreateDir(dir.to_path_buf(), e))?;
    }

    let contents = toml::to_string_pretty(config).map_err(ConfigError::Serialize)?;
    write_atomic(path, &contents)?;

    tracing::info!(target: "config", path = %path.display(), "Saved config");
    Ok(())
}

/// [`save`] on the blocking pool.
pub async fn save_async(config: Config) -> Result<PathBuf, ConfigError> {
    tokio::task::spawn_blocking(move || save(&config))
        .await
        .map_err(|e| ConfigError::TaskJoin(e.to_string()))?
}

/// Write a file atomically (write to temp, then rename)
pub(crate) fn write_atomic(path: &Path, contents: &str) -> Result<(), ConfigError> {
    let temp_path = path.with_extension("toml.tmp");
    std::fs::write(&temp_path, contents).map_err(|e| ConfigError::Write(temp_path.clone(), e))?;
    std::fs::rename(&temp_path, path)
        .map_err(|e| ConfigError::Rename(temp_path, path.to_path_buf(), e))
}

// ============================================================================
// Error Types
// ============================================================================

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Could not determine config directory")]
    NoConfigDir,

    #[error("Failed to create config directory {0}: {1}")]
    CreateDir(PathBuf, std::io::Error),

    #[error("Failed to serialize config: {0}")]
    Serialize(toml::ser::Error),

    #[error("Failed to write config to {0}: {1}")]
    Write(PathBuf, std::io::Error),

    #[error("Failed to rename temp file {0} to {1}: {2}")]
    Rename(PathBuf, PathBuf, std::io::Error),

    #[error("Task join error: {0}")]
    TaskJoin(String),
}

impl From<ConfigError> for crate::error::Error {
    fn from(e: ConfigError) -> Self {
        crate::error::Error::config(e.to_string())
    }
}

// ============================================================================
// Tests
// ============================================================================
