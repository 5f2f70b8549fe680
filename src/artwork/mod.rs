//! Local artwork store.
//!
//! Embedded cover art is written to disk once, keyed by the owning song's
//! id, and referenced from songs as [`Artwork::Local`]. Pictures larger
//! than the configured edge are downsized with the `image` crate; pictures
//! that cannot be decoded are stored as-is.

use image::ImageFormat;
use std::fs;
use std::io::Cursor;
use std::path::PathBuf;

use crate::config::ArtworkConfig;
use crate::error::{Result, ResultExt};
use crate::metadata::Picture;
use crate::model::Artwork;

/// Artwork bytes read back from the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredArtwork {
    pub data: Vec<u8>,
    pub mime_type: &'static str,
    pub path: PathBuf,
}

/// Artwork directory keyed by id.
#[derive(Debug, Clone)]
pub struct ArtworkStore {
    dir: PathBuf,
    max_size: u32,
}

impl ArtworkStore {
    /// Create a store in the specified directory.
    pub fn new(dir: impl Into<PathBuf>, max_size: u32) -> Self {
        let dir = dir.into();
        // Ensure the directory exists
        let _ = fs::create_dir_all(&dir);
        Self { dir, max_size }
    }

    /// Configured directory, or the user cache directory.
    pub fn from_config(config: &ArtworkConfig) -> Self {
        let dir = config.cache_dir.clone().unwrap_or_else(|| {
            dirs::cache_dir()
                .unwrap_or_else(|| PathBuf::from(".cache"))
                .join("medley")
                .join("artwork")
        });
        Self::new(dir, config.max_size)
    }

    /// Store a picture under `id`, replacing any previous one.
    pub fn associate(&self, id: &str, picture: &Picture) -> Result<Artwork> {
        let (data, ext) = self.prepare(picture);

        self.remove(id)?;
        let path = self.dir.join(format!("{id}.{ext}"));
        fs::write(&path, data).with_context(format!("writing artwork {}", path.display()))?;

        tracing::trace!(target: "artwork", id, ext, "Stored artwork");
        Ok(Artwork::Local { id: id.to_string() })
    }

    /// Downsize when decodable and too large; keep the original otherwise.
    fn prepare(&self, picture: &Picture) -> (Vec<u8>, &'static str) {
        let original_ext = if picture
            .mime_type
            .as_deref()
            .is_some_and(|m| m.contains("png"))
        {
            "png"
        } else {
            "jpg"
        };

        let Ok(img) = image::load_from_memory(&picture.data) else {
            return (picture.data.clone(), original_ext);
        };
        if img.width() <= self.max_size && img.height() <= self.max_size {
            return (picture.data.clone(), original_ext);
        }

        let resized = image::DynamicImage::ImageRgb8(
            img.thumbnail(self.max_size, self.max_size).to_rgb8(),
        );
        let mut buf = Cursor::new(Vec::new());
        match resized.write_to(&mut buf, ImageFormat::Jpeg) {
            Ok(()) => (buf.into_inner(), "jpg"),
            Err(e) => {
                tracing::debug!(target: "artwork", error = %e, "Re-encoding failed, keeping original");
                (picture.data.clone(), original_ext)
            }
        }
    }

    /// Get stored artwork for an id.
    pub fn get(&self, id: &str) -> Option<StoredArtwork> {
        let path = self.existing_path(id)?;
        let data = fs::read(&path).ok()?;

        // Determine MIME type from file extension
        let mime_type = match path.extension().and_then(|s| s.to_str()) {
            Some("png") => "image/png",
            _ => "image/jpeg",
        };

        Some(StoredArtwork {
            data,
            mime_type,
            path,
        })
    }

    /// Check if artwork exists for an id.
    pub fn contains(&self, id: &str) -> bool {
        self.existing_path(id).is_some()
    }

    /// Remove the artwork for an id, if any.
    pub fn remove(&self, id: &str) -> Result<()> {
        if let Some(path) = self.existing_path(id) {
            fs::remove_file(&path)
                .with_context(format!("removing artwork {}", path.display()))?;
        }
        Ok(())
    }

    fn existing_path(&self, id: &str) -> Option<PathBuf> {
        ["jpg", "png"]
            .iter()
            .map(|ext| self.dir.join(format!("{id}.{ext}")))
            .find(|path| path.exists())
    }

    /// Remove all stored artwork.
    pub fn clear(&self) -> Result<()> {
        if self.dir.exists() {
            for entry in fs::read_dir(&self.dir)? {
                let entry = entry?;
                if entry.file_type()?.is_file() {
                    fs::remove_file(entry.path())?;
                }
            }
        }
        Ok(())
    }

    /// Get the total size of the store in bytes.
    pub fn size_bytes(&self) -> u64 {
        fs::read_dir(&self.dir)
            .map(|entries| {
                entries
                    .filter_map(|e| e.ok())
                    .filter_map(|e| e.metadata().ok())
                    .map(|m| m.len())
                    .sum()
            })
            .unwrap_or(0)
    }
}
