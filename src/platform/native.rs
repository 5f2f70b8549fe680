//! Operating system file access.
//!
//! Traversal walks the music root on the blocking pool and hands paths over
//! a bounded channel, so discovery can parse the first files while the walk
//! is still running. Dropping the stream stops the walk.

use async_trait::async_trait;
use futures::stream::{BoxStream, StreamExt};
use std::path::PathBuf;
use tokio::sync::mpsc;
use walkdir::WalkDir;

use super::FileSystem;
use crate::config::LibraryConfig;
use crate::error::{Result, ResultExt};

/// File system access through the operating system.
#[derive(Debug, Clone)]
pub struct NativeFileSystem {
    root: Option<PathBuf>,
    skip_dirs: Vec<String>,
}

impl NativeFileSystem {
    pub fn new(root: Option<PathBuf>, skip_dirs: Vec<String>) -> Self {
        Self { root, skip_dirs }
    }

    /// Use the configured music root, or the OS audio directory.
    pub fn from_config(config: &LibraryConfig) -> Self {
        let root = config
            .music_root
            .clone()
            .or_else(dirs::audio_dir)
            .or_else(|| dirs::home_dir().map(|home| home.join("Music")));
        Self::new(root, config.skip_dirs.clone())
    }
}

#[async_trait]
impl FileSystem for NativeFileSystem {
    fn music_root(&self) -> Option<String> {
        self.root
            .as_ref()
            .filter(|root| root.is_dir())
            .map(|root| root.to_string_lossy().into_owned())
    }

    fn traverse_directory(&self, root: &str) -> BoxStream<'static, String> {
        let (tx, rx) = mpsc::channel(100);
        let root = PathBuf::from(root);
        let skip_dirs = self.skip_dirs.clone();

        // Spawn a blocking task to perform the synchronous file system traversal
        tokio::task::spawn_blocking(move || {
            let walker = WalkDir::new(&root).into_iter().filter_entry(|entry| {
                !(entry.file_type().is_dir()
                    && entry
                        .file_name()
                        .to_str()
                        .is_some_and(|name| skip_dirs.iter().any(|skip| skip == name)))
            });

            for entry in walker {
                let entry = match entry {
                    Ok(entry) => entry,
                    Err(e) => {
                        tracing::warn!(target: "platform::fs", error = %e, "Skipping unreadable entry");
                        continue;
                    }
                };
                if !entry.file_type().is_file() {
                    continue;
                }
                let path = entry.path().to_string_lossy().into_owned();
                // Receiver dropped: the consumer stopped listening
                if tx.blocking_send(path).is_err() {
                    break;
                }
            }
        });

        // Convert the mpsc Receiver into a Stream
        futures::stream::unfold(rx, |mut rx| async move {
            rx.recv().await.map(|path| (path, rx))
        })
        .boxed()
    }

    async fn read_file(&self, path: &str) -> Result<Vec<u8>> {
        tokio::fs::read(path)
            .await
            .with_context(format!("reading {path}"))
    }
}
