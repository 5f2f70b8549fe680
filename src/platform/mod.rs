//! Capability interfaces provided by the host platform.
//!
//! The core never touches the file system or an audio device directly. It
//! consumes these traits, which lets tests substitute in-memory versions.

mod mime;
mod native;
mod output;

pub use mime::audio_mime_type;
pub use native::NativeFileSystem;
pub use output::{AudioOutput, DetachedOutput, MediaSource, OutputState};

use async_trait::async_trait;
use futures::stream::BoxStream;

use crate::error::Result;

/// A song enumerated by a provider that issues its own ids.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexedSong {
    /// Provider-issued id
    pub id: String,
    /// Opaque content identifier accepted by [`FileSystem::read_file`]
    pub path: String,
}

/// File access capability.
#[async_trait]
pub trait FileSystem: Send + Sync {
    /// Root of the user's music, or `None` when the platform exposes none.
    fn music_root(&self) -> Option<String>;

    /// Recursively enumerate file paths below `root`, skipping trash folders.
    fn traverse_directory(&self, root: &str) -> BoxStream<'static, String>;

    /// Read a whole file.
    async fn read_file(&self, path: &str) -> Result<Vec<u8>>;

    /// Songs indexed by the platform itself.
    ///
    /// `None` means the music root has to be walked. Indexed entries are
    /// opaque content ids, so they skip the extension filter.
    async fn indexed_songs(&self) -> Result<Option<Vec<IndexedSong>>> {
        Ok(None)
    }
}
