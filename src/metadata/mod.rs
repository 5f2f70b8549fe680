//! Audio tag parsing.
//!
//! Uses the lofty crate for format-independent metadata access. Files are
//! parsed from an in-memory buffer because the bytes come from the
//! platform's [`FileSystem`](crate::platform::FileSystem), which may not
//! expose real paths.

use async_trait::async_trait;
use lofty::file::{AudioFile, FileType, TaggedFileExt};
use lofty::picture::PictureType;
use lofty::probe::Probe;
use lofty::tag::{Accessor, ItemKey};
use std::io::Cursor;
use std::path::Path;

use crate::error::{Error, Result};

/// An artist name as tagged in the file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedArtist {
    pub name: String,
    pub musicbrainz_id: Option<String>,
}

/// Embedded cover art.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Picture {
    pub data: Vec<u8>,
    pub mime_type: Option<String>,
}

/// Tags read from one file. Missing fields stay `None`/empty.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParsedTags {
    pub title: Option<String>,
    pub artists: Vec<ParsedArtist>,
    pub album: Option<String>,
    /// Duration in seconds
    pub duration: Option<f64>,
    pub genres: Vec<String>,
    pub disc_number: Option<u32>,
    pub track_number: Option<u32>,
    pub cover: Option<Picture>,
}

/// Tag extraction capability.
#[async_trait]
pub trait TagParser: Send + Sync {
    /// Parse tags from the encoded file contents.
    async fn parse(&self, data: Vec<u8>, mime_type: &str, path: &str) -> Result<ParsedTags>;
}

/// [`TagParser`] backed by lofty, run on the blocking pool.
#[derive(Debug, Clone, Copy, Default)]
pub struct LoftyTagParser;

#[async_trait]
impl TagParser for LoftyTagParser {
    async fn parse(&self, data: Vec<u8>, mime_type: &str, path: &str) -> Result<ParsedTags> {
        let owned_path = path.to_string();
        tracing::trace!(target: "metadata", path, mime_type, "Parsing tags");
        tokio::task::spawn_blocking(move || read_tags(data, &owned_path))
            .await
            .map_err(|e| Error::metadata(path, e.to_string()))?
    }
}

/// Parse tags synchronously.
pub fn read_tags(data: Vec<u8>, path: &str) -> Result<ParsedTags> {
    let mut probe = Probe::new(Cursor::new(data))
        .guess_file_type()
        .map_err(|e| Error::metadata(path, e.to_string()))?;

    // Content sniffing failed, fall back to the extension
    if probe.file_type().is_none()
        && let Some(file_type) = Path::new(path).extension().and_then(FileType::from_ext)
    {
        probe = probe.set_file_type(file_type);
    }

    let tagged_file = probe
        .read()
        .map_err(|e| Error::metadata(path, e.to_string()))?;

    let duration = tagged_file.properties().duration().as_secs_f64();
    let mut tags = ParsedTags {
        duration: (duration > 0.0).then_some(duration),
        ..ParsedTags::default()
    };

    // Get the primary tag, or fall back to the first available tag
    let Some(tag) = tagged_file
        .primary_tag()
        .or_else(|| tagged_file.first_tag())
    else {
        return Ok(tags);
    };

    tags.title = tag.title().map(|s| s.trim().to_string()).filter(|s| !s.is_empty());
    tags.album = tag.album().map(|s| s.trim().to_string()).filter(|s| !s.is_empty());
    tags.disc_number = tag.disk();
    tags.track_number = tag.track();
    tags.genres = tag
        .get_strings(&ItemKey::Genre)
        .map(str::to_string)
        .collect();

    let artist_ids: Vec<&str> = tag.get_strings(&ItemKey::MusicBrainzArtistId).collect();
    tags.artists = tag
        .get_strings(&ItemKey::TrackArtist)
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .enumerate()
        .map(|(i, name)| ParsedArtist {
            name: name.to_string(),
            musicbrainz_id: artist_ids.get(i).map(|id| id.to_string()),
        })
        .collect();

    let pictures = tag.pictures();
    tags.cover = pictures
        .iter()
        .find(|p| p.pic_type() == PictureType::CoverFront)
        .or_else(|| pictures.first())
        .map(|p| Picture {
            data: p.data().to_vec(),
            mime_type: p.mime_type().map(|m| m.as_str().to_string()),
        });

    Ok(tags)
}
