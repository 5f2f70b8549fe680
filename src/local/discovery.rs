//! Local song discovery.
//!
//! Enumerates audio files through the platform [`FileSystem`], parses their
//! tags and caches the resulting songs. Songs are yielded as soon as they
//! are parsed, so callers can start using them before the scan finishes.
//!
//! Once a scan has run to completion, later scans without a forced refresh
//! serve the cached songs and read nothing. Songs cached one at a time, for
//! example when resolving a preview, do not count as a completed scan.

use futures::future;
use futures::stream::{self, BoxStream, StreamExt};
use sha2::{Digest, Sha256};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::artwork::ArtworkStore;
use crate::error::{Result, ResultExt};
use crate::metadata::{ParsedTags, TagParser};
use crate::model::{ArtistPreview, Artwork, ObjectCache, Song, SongData, SourceType};
use crate::platform::{FileSystem, audio_mime_type};
use crate::service::SongStream;

/// Hex characters kept from the path digest (64 bits).
const ID_LEN: usize = 16;

/// Stable id of a local file: the truncated SHA-256 of its path.
///
/// Depends only on the path, never on the contents, so re-tagging a file
/// keeps its id. Hex output is safe in URLs and routes.
pub fn song_id_for_path(path: &str) -> String {
    Sha256::digest(path.as_bytes())
        .iter()
        .take(ID_LEN / 2)
        .map(|b| format!("{b:02x}"))
        .collect()
}

/// A file to examine.
#[derive(Debug, Clone)]
struct Candidate {
    /// Provider-issued id, if any
    id: Option<String>,
    path: String,
}

/// Scans the platform for songs and caches them.
#[derive(Clone)]
pub struct Discovery {
    fs: Arc<dyn FileSystem>,
    parser: Arc<dyn TagParser>,
    artwork: Option<ArtworkStore>,
    cache: Arc<ObjectCache>,
    /// Set when a scan ran to its end, cleared by a forced refresh
    complete: Arc<AtomicBool>,
}

impl Discovery {
    pub fn new(
        fs: Arc<dyn FileSystem>,
        parser: Arc<dyn TagParser>,
        artwork: Option<ArtworkStore>,
        cache: Arc<ObjectCache>,
    ) -> Self {
        Self {
            fs,
            parser,
            artwork,
            cache,
            complete: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Whether the cache holds every local song.
    pub fn is_complete(&self) -> bool {
        self.complete.load(Ordering::Acquire)
    }

    /// All local songs, in traversal order.
    ///
    /// With `clear_cache` every cached local song is evicted first and the
    /// platform is scanned again. Files that fail to read or parse are
    /// logged and skipped.
    pub fn songs(&self, clear_cache: bool) -> SongStream {
        if !clear_cache && self.is_complete() {
            tracing::debug!(target: "local::discovery", "Serving cached songs");
            return stream::iter(self.cache.all::<Song>(SourceType::Local)).boxed();
        }

        if clear_cache {
            self.complete.store(false, Ordering::Release);
            let evicted = self.cache.clear::<Song>(SourceType::Local);
            tracing::debug!(target: "local::discovery", evicted, "Evicted cached songs");
        }

        let this = self.clone();
        let candidates = stream::once(async move {
            let candidates = this.candidates().await;
            candidates.map(move |candidate| (this.clone(), candidate))
        })
        .flatten();

        // Only a scan consumed to its end marks the cache complete
        let complete = Arc::clone(&self.complete);
        let finished = stream::once(async move {
            complete.store(true, Ordering::Release);
            None
        });

        candidates
            .then(|(this, candidate)| async move { this.discover(candidate).await })
            .chain(finished)
            .filter_map(future::ready)
            .boxed()
    }

    /// Files to examine: the provider's index, else a walk of the music root.
    async fn candidates(&self) -> BoxStream<'static, Candidate> {
        match self.fs.indexed_songs().await {
            Ok(Some(indexed)) => {
                tracing::info!(target: "local::discovery", count = indexed.len(), "Using platform index");
                return stream::iter(indexed.into_iter().map(|song| Candidate {
                    id: Some(song.id),
                    path: song.path,
                }))
                .boxed();
            }
            Ok(None) => {}
            Err(e) => {
                tracing::warn!(target: "local::discovery", error = %e, "Platform index unavailable, walking music root");
            }
        }

        let Some(root) = self.fs.music_root() else {
            tracing::warn!(target: "local::discovery", "No music root, nothing to scan");
            return stream::empty().boxed();
        };

        tracing::info!(target: "local::discovery", root = %root, "Scanning");
        self.fs
            .traverse_directory(&root)
            .filter(|path| future::ready(audio_mime_type(path).is_some()))
            .map(|path| Candidate { id: None, path })
            .boxed()
    }

    async fn discover(&self, candidate: Candidate) -> Option<crate::model::SharedSong> {
        let id = candidate
            .id
            .unwrap_or_else(|| song_id_for_path(&candidate.path));

        match self.load_song(&id, &candidate.path).await {
            Ok(song) => {
                tracing::trace!(target: "local::discovery", id = %id, path = %candidate.path, "Discovered");
                Some(self.cache.insert(song))
            }
            Err(e) => {
                tracing::warn!(target: "local::discovery", path = %candidate.path, error = %e, "Skipping unreadable file");
                None
            }
        }
    }

    /// Read and parse one file into a song with the given id.
    pub async fn load_song(&self, id: &str, path: &str) -> Result<Song> {
        let data = self
            .fs
            .read_file(path)
            .await
            .with_context(format!("reading {path}"))?;
        let mime_type = audio_mime_type(path).unwrap_or("application/octet-stream");
        let mut tags = self.parser.parse(data, mime_type, path).await?;

        let artwork = match (tags.cover.take(), &self.artwork) {
            (Some(picture), Some(store)) => match store.associate(id, &picture) {
                Ok(artwork) => Some(artwork),
                Err(e) => {
                    tracing::warn!(target: "local::discovery", id, error = %e, "Failed to store artwork");
                    None
                }
            },
            _ => None,
        };

        Ok(song_from_tags(id, path, tags, artwork))
    }
}

fn song_from_tags(id: &str, path: &str, tags: ParsedTags, artwork: Option<Artwork>) -> Song {
    let title = tags
        .title
        .filter(|t| !t.trim().is_empty())
        .unwrap_or_else(|| file_name(path).to_string());

    Song {
        id: id.to_string(),
        title,
        album: tags.album,
        duration: tags.duration,
        genres: tags.genres,
        explicit: false,
        available: true,
        artists: tags
            .artists
            .into_iter()
            .map(|artist| ArtistPreview {
                id: artist.musicbrainz_id,
                title: artist.name,
            })
            .collect(),
        artwork,
        data: SongData::Local {
            path: path.to_string(),
            disc_number: tags.disc_number,
            track_number: tags.track_number,
        },
    }
}

/// Last path segment.
fn file_name(path: &str) -> &str {
    path.rsplit(['/', '\\'])
        .find(|segment| !segment.is_empty())
        .unwrap_or(path)
}
