//! Test utilities and fixtures.
//!
//! Mocks for every capability the core consumes, plus builders for domain
//! objects, to reduce boilerplate in tests.
//!
//! # Example
//!
//! ```ignore
//! use crate::test_utils::{MockBackend, ScriptedResolver, shared_context};
//!
//! #[tokio::test]
//! async fn test_something() {
//!     let backend = Arc::new(MockBackend::new(SourceType::Local));
//!     let context = shared_context(backend.cache(), Arc::new(ScriptedResolver::default()), store);
//!     let service = MusicService::new(backend.clone(), context);
//!     // ... test logic
//! }
//! ```

use async_trait::async_trait;
use futures::stream::{self, BoxStream, StreamExt};
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio_util::sync::CancellationToken;

use crate::error::{Error, Result};
use crate::metadata::{ParsedArtist, ParsedTags, TagParser};
use crate::model::{
    Album, AlbumPreview, ArtistPreview, ObjectCache, SharedAlbum, SharedSong, Song, SongData,
    SongPreview, SourceType,
};
use crate::platform::{AudioOutput, FileSystem, IndexedSong, MediaSource};
use crate::service::{
    Capabilities, ErrorContext, ErrorResolver, MusicBackend, Resolution, ServiceContext,
    SongStream,
};
use crate::store::StateStore;

// ============================================================================
// Fixtures
// ============================================================================

/// A local song with sensible defaults. Title is `"Song {id}"`.
pub fn mock_song(id: &str) -> Song {
    Song {
        id: id.to_string(),
        title: format!("Song {id}"),
        album: Some("Test Album".to_string()),
        duration: Some(180.0),
        genres: vec![],
        explicit: false,
        available: true,
        artists: vec![ArtistPreview::named("Test Artist")],
        artwork: None,
        data: SongData::Local {
            path: format!("/m/{id}.mp3"),
            disc_number: None,
            track_number: None,
        },
    }
}

/// A catalog song with sensible defaults.
pub fn mock_catalog_song(id: &str) -> Song {
    Song {
        data: SongData::Catalog { catalog_id: None },
        ..mock_song(id)
    }
}

/// Tags with one artist and optional disc/track numbers.
pub fn tags(title: &str, album: &str, artist: &str, disc: Option<u32>, track: Option<u32>) -> ParsedTags {
    ParsedTags {
        title: Some(title.to_string()),
        artists: vec![ParsedArtist {
            name: artist.to_string(),
            musicbrainz_id: None,
        }],
        album: Some(album.to_string()),
        duration: Some(200.0),
        genres: vec![],
        disc_number: disc,
        track_number: track,
        cover: None,
    }
}

/// A service context around the given collaborators.
pub fn shared_context(
    cache: Arc<ObjectCache>,
    resolver: Arc<dyn ErrorResolver>,
    store: Arc<dyn StateStore>,
) -> Arc<ServiceContext> {
    ServiceContext::new(cache, resolver, store)
}

// ============================================================================
// Call log
// ============================================================================

/// Ordered log of calls, shareable between mocks.
#[derive(Debug, Clone, Default)]
pub struct CallLog(Arc<Mutex<Vec<String>>>);

impl CallLog {
    pub fn push(&self, entry: impl Into<String>) {
        self.0.lock().push(entry.into());
    }

    pub fn entries(&self) -> Vec<String> {
        self.0.lock().clone()
    }

    pub fn count(&self, entry: &str) -> usize {
        self.0.lock().iter().filter(|e| *e == entry).count()
    }
}

// ============================================================================
// Error resolver
// ============================================================================

/// Answers from a script, then [`Resolution::Ignore`]. Records every
/// failure it is asked about.
#[derive(Debug, Default)]
pub struct ScriptedResolver {
    answers: Mutex<VecDeque<Resolution>>,
    contexts: Mutex<Vec<ErrorContext>>,
}

impl ScriptedResolver {
    pub fn new(answers: impl IntoIterator<Item = Resolution>) -> Self {
        Self {
            answers: Mutex::new(answers.into_iter().collect()),
            contexts: Mutex::new(Vec::new()),
        }
    }

    pub fn contexts(&self) -> Vec<ErrorContext> {
        self.contexts.lock().clone()
    }
}

#[async_trait]
impl ErrorResolver for ScriptedResolver {
    async fn resolve(&self, context: &ErrorContext) -> Resolution {
        self.contexts.lock().push(context.clone());
        self.answers.lock().pop_front().unwrap_or(Resolution::Ignore)
    }
}

// ============================================================================
// Backend
// ============================================================================

/// Configurable backend that logs every hook as `"{source}:{operation}"`.
pub struct MockBackend {
    source: SourceType,
    name: String,
    available: bool,
    capabilities: Capabilities,
    cache: Arc<ObjectCache>,
    log: CallLog,
    failures: Mutex<HashMap<&'static str, VecDeque<Error>>>,
    refreshed: Option<Song>,
    songs: Mutex<Vec<SharedSong>>,
    volume: Mutex<Option<f64>>,
}

impl MockBackend {
    pub fn new(source: SourceType) -> Self {
        Self {
            source,
            name: format!("Mock{source}"),
            available: true,
            capabilities: Capabilities::empty(),
            cache: Arc::new(ObjectCache::new()),
            log: CallLog::default(),
            failures: Mutex::new(HashMap::new()),
            refreshed: None,
            songs: Mutex::new(Vec::new()),
            volume: Mutex::new(None),
        }
    }

    pub fn with_capabilities(mut self, capabilities: Capabilities) -> Self {
        self.capabilities = capabilities;
        self
    }

    pub fn with_cache(mut self, cache: Arc<ObjectCache>) -> Self {
        self.cache = cache;
        self
    }

    pub fn with_log(mut self, log: CallLog) -> Self {
        self.log = log;
        self
    }

    pub fn unavailable(mut self) -> Self {
        self.available = false;
        self
    }

    /// Fail the next calls of `operation` with these errors, in order.
    pub fn fail(self, operation: &'static str, errors: impl IntoIterator<Item = Error>) -> Self {
        self.failures
            .lock()
            .entry(operation)
            .or_default()
            .extend(errors);
        self
    }

    /// Make `handle_refresh_song` return this song.
    pub fn refreshing_to(mut self, song: Song) -> Self {
        self.refreshed = Some(song);
        self
    }

    pub fn cache(&self) -> Arc<ObjectCache> {
        Arc::clone(&self.cache)
    }

    /// Cache a song and serve it from search and library listings.
    pub fn insert_song(&self, song: Song) -> SharedSong {
        let handle = self.cache.insert(song);
        self.songs.lock().push(Arc::clone(&handle));
        handle
    }

    pub fn calls(&self, operation: &str) -> usize {
        self.log.count(&format!("{}:{}", self.source, operation))
    }

    pub fn last_volume(&self) -> Option<f64> {
        *self.volume.lock()
    }

    fn hit(&self, operation: &'static str) -> Result<()> {
        self.log.push(format!("{}:{}", self.source, operation));
        match self
            .failures
            .lock()
            .get_mut(operation)
            .and_then(VecDeque::pop_front)
        {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }

    fn song_stream(&self) -> SongStream {
        stream::iter(self.songs.lock().clone()).boxed()
    }
}

#[async_trait]
impl MusicBackend for MockBackend {
    fn source(&self) -> SourceType {
        self.source
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn available(&self) -> bool {
        self.available
    }

    fn capabilities(&self) -> Capabilities {
        self.capabilities
    }

    async fn handle_initialization(&self) -> Result<()> {
        // Give concurrent callers a chance to pile up
        tokio::task::yield_now().await;
        self.hit("initialize")
    }

    async fn handle_deinitialization(&self) -> Result<()> {
        tokio::task::yield_now().await;
        self.hit("deinitialize")
    }

    async fn handle_play(&self, _song: &Song) -> Result<()> {
        self.hit("play")
    }

    async fn handle_resume(&self) -> Result<()> {
        self.hit("resume")
    }

    async fn handle_pause(&self) -> Result<()> {
        self.hit("pause")
    }

    async fn handle_stop(&self) -> Result<()> {
        self.hit("stop")
    }

    async fn handle_seek_to_time(&self, _seconds: f64) -> Result<()> {
        self.hit("seekToTime")
    }

    async fn handle_set_volume(&self, level: f64) -> Result<()> {
        self.hit("setVolume")?;
        *self.volume.lock() = Some(level);
        Ok(())
    }

    async fn handle_get_song(&self, id: &str) -> Result<Option<SharedSong>> {
        self.hit("getSong")?;
        Ok(self.cache.get::<Song>(self.source, id))
    }

    async fn handle_refresh_song(&self, song: &Song) -> Result<Song> {
        self.hit("refreshSong")?;
        Ok(self.refreshed.clone().unwrap_or_else(|| song.clone()))
    }

    async fn handle_get_song_from_preview(&self, preview: &SongPreview) -> Result<SharedSong> {
        self.hit("getSongFromPreview")?;
        preview
            .id
            .as_deref()
            .and_then(|id| self.cache.get::<Song>(self.source, id))
            .ok_or_else(|| Error::not_found("preview"))
    }

    async fn handle_get_album_from_preview(&self, preview: &AlbumPreview) -> Result<SharedAlbum> {
        self.hit("getAlbumFromPreview")?;
        preview
            .id
            .as_deref()
            .and_then(|id| self.cache.get::<Album>(self.source, id))
            .ok_or_else(|| Error::not_found("album preview"))
    }

    async fn handle_search_songs(
        &self,
        _term: &str,
        _page: usize,
        _cancel: CancellationToken,
    ) -> Result<SongStream> {
        self.hit("searchSongs")?;
        Ok(self.song_stream())
    }

    async fn handle_search_hints(&self, term: &str) -> Result<Vec<String>> {
        self.hit("getSearchHints")?;
        Ok(vec![format!("{term} ({})", self.source)])
    }

    async fn handle_get_library_songs(&self, cancel: CancellationToken) -> Result<SongStream> {
        self.hit("getLibrarySongs")?;
        Ok(self
            .song_stream()
            .take_while(move |_| futures::future::ready(!cancel.is_cancelled()))
            .boxed())
    }

    async fn handle_refresh_library_songs(&self) -> Result<()> {
        self.hit("refreshLibrarySongs")
    }

    async fn handle_refresh_library_albums(&self) -> Result<()> {
        self.hit("refreshLibraryAlbums")
    }
}

// ============================================================================
// Platform
// ============================================================================

/// In-memory file system. Traversal yields files in insertion order.
#[derive(Default)]
pub struct MemoryFileSystem {
    root: Option<String>,
    files: Mutex<Vec<(String, Vec<u8>)>>,
    indexed: Option<Vec<IndexedSong>>,
    reads: AtomicUsize,
}

impl MemoryFileSystem {
    pub fn new(root: &str) -> Self {
        Self {
            root: Some(root.to_string()),
            ..Self::default()
        }
    }

    /// A platform with no music root.
    pub fn rootless() -> Self {
        Self::default()
    }

    pub fn with_file(self, path: &str, data: &[u8]) -> Self {
        self.add_file(path, data);
        self
    }

    /// Provider-indexed entries; traversal is skipped when set.
    pub fn with_index(mut self, indexed: Vec<IndexedSong>) -> Self {
        self.indexed = Some(indexed);
        self
    }

    pub fn add_file(&self, path: &str, data: &[u8]) {
        self.files.lock().push((path.to_string(), data.to_vec()));
    }

    pub fn remove_file(&self, path: &str) {
        self.files.lock().retain(|(p, _)| p != path);
    }

    pub fn reads(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl FileSystem for MemoryFileSystem {
    fn music_root(&self) -> Option<String> {
        self.root.clone()
    }

    fn traverse_directory(&self, root: &str) -> BoxStream<'static, String> {
        let paths: Vec<String> = self
            .files
            .lock()
            .iter()
            .map(|(path, _)| path.clone())
            .filter(|path| path.starts_with(root))
            .collect();
        stream::iter(paths).boxed()
    }

    async fn read_file(&self, path: &str) -> Result<Vec<u8>> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        self.files
            .lock()
            .iter()
            .find(|(p, _)| p == path)
            .map(|(_, data)| data.clone())
            .ok_or_else(|| Error::not_found(path))
    }

    async fn indexed_songs(&self) -> Result<Option<Vec<IndexedSong>>> {
        Ok(self.indexed.clone())
    }
}

/// Tag parser answering from a table keyed by path.
///
/// Unknown paths parse to empty tags.
#[derive(Default)]
pub struct ScriptedTagParser {
    tags: Mutex<HashMap<String, ParsedTags>>,
    failing: Mutex<HashSet<String>>,
    calls: AtomicUsize,
}

impl ScriptedTagParser {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_tags(self, path: &str, tags: ParsedTags) -> Self {
        self.set_tags(path, tags);
        self
    }

    pub fn failing_on(self, path: &str) -> Self {
        self.failing.lock().insert(path.to_string());
        self
    }

    pub fn set_tags(&self, path: &str, tags: ParsedTags) {
        self.tags.lock().insert(path.to_string(), tags);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TagParser for ScriptedTagParser {
    async fn parse(&self, _data: Vec<u8>, _mime_type: &str, path: &str) -> Result<ParsedTags> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.failing.lock().contains(path) {
            return Err(Error::metadata(path, "corrupt frame header"));
        }
        Ok(self.tags.lock().get(path).cloned().unwrap_or_default())
    }
}

/// Audio output that records every call.
#[derive(Default)]
pub struct RecordingOutput {
    log: CallLog,
    load_failure: Mutex<Option<Error>>,
}

impl RecordingOutput {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the next `load` with this error.
    pub fn fail_next_load(&self, error: Error) {
        *self.load_failure.lock() = Some(error);
    }

    pub fn entries(&self) -> Vec<String> {
        self.log.entries()
    }
}

#[async_trait]
impl AudioOutput for RecordingOutput {
    async fn open(&self) -> Result<()> {
        self.log.push("open");
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        self.log.push("close");
        Ok(())
    }

    async fn load(&self, source: MediaSource) -> Result<()> {
        if let Some(error) = self.load_failure.lock().take() {
            return Err(error);
        }
        self.log.push(match source {
            MediaSource::Bytes { data, mime_type } => format!("load {} {}", mime_type, data.len()),
            MediaSource::Catalog { id } => format!("load catalog {id}"),
        });
        Ok(())
    }

    async fn play(&self) -> Result<()> {
        self.log.push("play");
        Ok(())
    }

    async fn pause(&self) -> Result<()> {
        self.log.push("pause");
        Ok(())
    }

    async fn stop(&self) -> Result<()> {
        self.log.push("stop");
        Ok(())
    }

    async fn seek(&self, seconds: f64) -> Result<()> {
        self.log.push(format!("seek {seconds}"));
        Ok(())
    }

    async fn set_volume(&self, level: f64) -> Result<()> {
        self.log.push(format!("volume {level}"));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mock_song_defaults() {
        let song = mock_song("a");
        assert_eq!(song.title, "Song a");
        assert_eq!(song.source(), SourceType::Local);
        assert_eq!(mock_catalog_song("1").source(), SourceType::Catalog);
    }

    #[tokio::test]
    async fn test_memory_fs_traversal_order() {
        let fs = MemoryFileSystem::new("/m")
            .with_file("/m/b.mp3", b"b")
            .with_file("/other/x.mp3", b"x")
            .with_file("/m/a.mp3", b"a");

        let paths: Vec<String> = fs.traverse_directory("/m").collect().await;
        assert_eq!(paths, vec!["/m/b.mp3", "/m/a.mp3"]);
        assert_eq!(fs.read_file("/m/a.mp3").await.unwrap(), b"a");
        assert_eq!(fs.reads(), 1);
    }

    #[tokio::test]
    async fn test_scripted_resolver_defaults_to_ignore() {
        let resolver = ScriptedResolver::new([Resolution::Retry]);
        let context = ErrorContext {
            source: SourceType::Local,
            service: "Mock".to_string(),
            operation: "play",
            severity: crate::service::Severity::Unrecoverable,
            message: "x".to_string(),
        };
        assert_eq!(resolver.resolve(&context).await, Resolution::Retry);
        assert_eq!(resolver.resolve(&context).await, Resolution::Ignore);
        assert_eq!(resolver.contexts().len(), 2);
    }
}
