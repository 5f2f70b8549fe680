//! Local music source.
//!
//! Plays audio files found below the platform's music root. Songs are
//! identified by a hash of their path (see [`song_id_for_path`]), albums are
//! reconciled from tags, and search is fuzzy over the discovered collection.

mod albums;
mod discovery;
mod search;

pub use albums::reconcile_albums;
pub use discovery::{Discovery, song_id_for_path};
pub use search::LocalSearch;

use async_trait::async_trait;
use futures::future;
use futures::stream::{self, StreamExt};
use parking_lot::Mutex;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use crate::artwork::ArtworkStore;
use crate::error::{Error, Result};
use crate::metadata::TagParser;
use crate::model::{
    Album, AlbumPreview, ObjectCache, SharedAlbum, SharedSong, Song, SongPreview, SourceType,
};
use crate::platform::{AudioOutput, FileSystem, MediaSource, audio_mime_type};
use crate::service::{AlbumStream, Capabilities, Flight, MusicBackend, SingleFlight, SongStream};

const NAME: &str = "LocalMusicService";

/// Backend for files on the local file system.
pub struct LocalBackend {
    fs: Arc<dyn FileSystem>,
    output: Arc<dyn AudioOutput>,
    cache: Arc<ObjectCache>,
    discovery: Discovery,
    search: Mutex<LocalSearch>,
    indexing: SingleFlight,
}

impl LocalBackend {
    pub fn new(
        fs: Arc<dyn FileSystem>,
        parser: Arc<dyn TagParser>,
        output: Arc<dyn AudioOutput>,
        artwork: Option<ArtworkStore>,
        cache: Arc<ObjectCache>,
        page_size: usize,
    ) -> Self {
        let discovery = Discovery::new(Arc::clone(&fs), parser, artwork, Arc::clone(&cache));
        Self {
            fs,
            output,
            cache,
            discovery,
            search: Mutex::new(LocalSearch::new(page_size)),
            indexing: SingleFlight::new(),
        }
    }

    pub fn discovery(&self) -> &Discovery {
        &self.discovery
    }

    /// Run discovery to completion.
    async fn discover_all(&self, clear_cache: bool) -> Vec<SharedSong> {
        self.discovery.songs(clear_cache).collect().await
    }

    /// Build the search index once; concurrent searches share one build.
    async fn ensure_index(&self) {
        while !self.search.lock().is_built() {
            match self.indexing.join() {
                // Loop: an abandoned build leaves the index unbuilt
                Flight::Follower(pending) => {
                    let _ = pending.await;
                }
                Flight::Leader(guard) => {
                    if !self.search.lock().is_built() {
                        let songs = self.discover_all(false).await;
                        self.search.lock().build(songs);
                    }
                    let _ = guard.complete(Ok(()));
                }
            }
        }
    }

    async fn ensure_albums(&self) {
        if self.cache.len::<Album>(SourceType::Local) == 0 {
            self.discover_all(false).await;
            reconcile_albums(&self.cache);
        }
    }
}

#[async_trait]
impl MusicBackend for LocalBackend {
    fn source(&self) -> SourceType {
        SourceType::Local
    }

    fn name(&self) -> &str {
        NAME
    }

    fn available(&self) -> bool {
        self.fs.music_root().is_some()
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities::SEARCH
            | Capabilities::SEARCH_HINTS
            | Capabilities::LIBRARY_SONGS
            | Capabilities::LIBRARY_ALBUMS
            | Capabilities::ALBUM_OF_SONG
            | Capabilities::ALBUM
    }

    async fn handle_initialization(&self) -> Result<()> {
        self.output.open().await
    }

    async fn handle_deinitialization(&self) -> Result<()> {
        self.output.close().await
    }

    async fn handle_play(&self, song: &Song) -> Result<()> {
        let path = song
            .path()
            .ok_or_else(|| Error::playback(format!("{} is not a local song", song.id)))?;
        let data = self.fs.read_file(path).await?;
        let mime_type = audio_mime_type(path).unwrap_or("audio/mpeg").to_string();

        match self.output.load(MediaSource::Bytes { data, mime_type }).await {
            Ok(()) => {}
            // Superseded by a newer load
            Err(e) if e.root().is_aborted() => {
                tracing::debug!(target: "local", id = %song.id, "Load aborted");
                return Ok(());
            }
            Err(e) => return Err(e),
        }
        self.output.play().await
    }

    async fn handle_resume(&self) -> Result<()> {
        self.output.play().await
    }

    async fn handle_pause(&self) -> Result<()> {
        self.output.pause().await
    }

    async fn handle_stop(&self) -> Result<()> {
        self.output.stop().await
    }

    async fn handle_seek_to_time(&self, seconds: f64) -> Result<()> {
        self.output.seek(seconds).await
    }

    async fn handle_set_volume(&self, level: f64) -> Result<()> {
        self.output.set_volume(level).await
    }

    async fn handle_get_song(&self, id: &str) -> Result<Option<SharedSong>> {
        if let Some(song) = self.cache.get::<Song>(SourceType::Local, id) {
            return Ok(Some(song));
        }
        // Ids are path hashes, only a scan can map one back to its file
        if !self.discovery.is_complete() {
            self.discover_all(false).await;
        }
        Ok(self.cache.get::<Song>(SourceType::Local, id))
    }

    async fn handle_refresh_song(&self, song: &Song) -> Result<Song> {
        let path = song
            .path()
            .ok_or_else(|| Error::not_found(format!("path of song {}", song.id)))?;
        self.discovery.load_song(&song.id, path).await
    }

    async fn handle_get_song_from_preview(&self, preview: &SongPreview) -> Result<SharedSong> {
        if let Some(song) = preview
            .id
            .as_deref()
            .and_then(|id| self.cache.get::<Song>(SourceType::Local, id))
        {
            return Ok(song);
        }

        let Some(path) = preview.path.as_deref() else {
            return Err(Error::not_found(format!(
                "local song {}",
                preview.id.as_deref().unwrap_or("without id or path")
            )));
        };

        let id = song_id_for_path(path);
        if let Some(song) = self.cache.get::<Song>(SourceType::Local, &id) {
            return Ok(song);
        }
        let song = self.discovery.load_song(&id, path).await?;
        Ok(self.cache.insert(song))
    }

    async fn handle_get_album_from_preview(&self, preview: &AlbumPreview) -> Result<SharedAlbum> {
        self.ensure_albums().await;

        if let Some(album) = preview
            .id
            .as_deref()
            .and_then(|id| self.cache.get::<Album>(SourceType::Local, id))
        {
            return Ok(album);
        }

        // Album ids are regenerated by reconciliation, fall back to title and artists
        let found = preview.title.as_deref().and_then(|title| {
            self.cache
                .all::<Album>(SourceType::Local)
                .into_iter()
                .find(|album| {
                    let album = album.read();
                    album.title == title
                        && (preview.artists.is_empty() || album.shares_artist(&preview.artists))
                })
        });
        found.ok_or_else(|| {
            Error::not_found(format!(
                "local album {}",
                preview
                    .id
                    .as_deref()
                    .or(preview.title.as_deref())
                    .unwrap_or("without id or title")
            ))
        })
    }

    async fn handle_search_songs(
        &self,
        term: &str,
        page: usize,
        cancel: CancellationToken,
    ) -> Result<SongStream> {
        self.ensure_index().await;

        let results = self.search.lock().page(term, page);
        Ok(stream::iter(results)
            .take_while(move |_| future::ready(!cancel.is_cancelled()))
            .boxed())
    }

    async fn handle_search_hints(&self, _term: &str) -> Result<Vec<String>> {
        Ok(Vec::new())
    }

    async fn handle_get_library_songs(&self, cancel: CancellationToken) -> Result<SongStream> {
        Ok(self
            .discovery
            .songs(false)
            .take_while(move |_| future::ready(!cancel.is_cancelled()))
            .boxed())
    }

    async fn handle_refresh_library_songs(&self) -> Result<()> {
        let songs = self.discover_all(true).await;
        self.search.lock().invalidate();
        tracing::info!(target: "local", songs = songs.len(), "Refreshed library songs");
        Ok(())
    }

    async fn handle_get_library_albums(&self, cancel: CancellationToken) -> Result<AlbumStream> {
        self.ensure_albums().await;
        Ok(stream::iter(self.cache.all::<Album>(SourceType::Local))
            .take_while(move |_| future::ready(!cancel.is_cancelled()))
            .boxed())
    }

    async fn handle_refresh_library_albums(&self) -> Result<()> {
        // Reconciliation needs the complete song collection
        self.discover_all(false).await;
        reconcile_albums(&self.cache);
        Ok(())
    }

    async fn handle_get_songs_album(&self, song: &Song) -> Result<Option<SharedAlbum>> {
        self.ensure_albums().await;
        let key = song.key();
        Ok(self
            .cache
            .all::<Album>(SourceType::Local)
            .into_iter()
            .find(|album| album.read().songs.iter().any(|entry| entry.song == key)))
    }

    async fn handle_get_album(&self, id: &str) -> Result<Option<SharedAlbum>> {
        Ok(self.cache.get::<Album>(SourceType::Local, id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStateStore;
    use crate::test_utils::{
        MemoryFileSystem, RecordingOutput, ScriptedResolver, ScriptedTagParser, shared_context,
        tags,
    };
    use crate::service::MusicService;

    struct Fixture {
        backend: Arc<LocalBackend>,
        fs: Arc<MemoryFileSystem>,
        parser: Arc<ScriptedTagParser>,
        output: Arc<RecordingOutput>,
        cache: Arc<ObjectCache>,
    }

    fn fixture(fs: MemoryFileSystem, parser: ScriptedTagParser, page_size: usize) -> Fixture {
        let fs = Arc::new(fs);
        let parser = Arc::new(parser);
        let output = Arc::new(RecordingOutput::new());
        let cache = Arc::new(ObjectCache::new());
        let backend = Arc::new(LocalBackend::new(
            fs.clone(),
            parser.clone(),
            output.clone(),
            None,
            cache.clone(),
            page_size,
        ));
        Fixture {
            backend,
            fs,
            parser,
            output,
            cache,
        }
    }

    fn library() -> (MemoryFileSystem, ScriptedTagParser) {
        let fs = MemoryFileSystem::new("/m")
            .with_file("/m/1.mp3", b"one")
            .with_file("/m/2.mp3", b"two")
            .with_file("/m/3.flac", b"three");
        let parser = ScriptedTagParser::new()
            .with_tags("/m/1.mp3", tags("Intro", "Debut", "Band", Some(1), Some(1)))
            .with_tags("/m/2.mp3", tags("Outro", "Debut", "Band", Some(1), Some(2)))
            .with_tags("/m/3.flac", tags("Single", "Other", "Solo", None, None));
        (fs, parser)
    }

    #[test]
    fn test_unavailable_without_music_root() {
        let f = fixture(MemoryFileSystem::rootless(), ScriptedTagParser::new(), 25);
        assert!(!f.backend.available());
        let f = fixture(MemoryFileSystem::new("/m"), ScriptedTagParser::new(), 25);
        assert!(f.backend.available());
    }

    #[tokio::test]
    async fn test_play_loads_file_bytes() {
        let (fs, parser) = library();
        let f = fixture(fs, parser, 25);
        let songs = f.backend.discover_all(false).await;
        let song = songs[0].read().clone();

        f.backend.handle_play(&song).await.unwrap();

        assert_eq!(f.output.entries(), vec!["load audio/mpeg 3", "play"]);
    }

    #[tokio::test]
    async fn test_aborted_load_is_swallowed() {
        let (fs, parser) = library();
        let f = fixture(fs, parser, 25);
        let songs = f.backend.discover_all(false).await;
        let song = songs[0].read().clone();

        f.output.fail_next_load(Error::Aborted);
        f.backend.handle_play(&song).await.unwrap();
        assert!(f.output.entries().is_empty());

        f.output.fail_next_load(Error::playback("decoder crashed"));
        assert!(f.backend.handle_play(&song).await.is_err());
    }

    #[tokio::test]
    async fn test_search_pages_and_cancellation() {
        let (fs, parser) = library();
        let f = fixture(fs, parser, 1);
        let token = CancellationToken::new();

        let first: Vec<_> = f
            .backend
            .handle_search_songs("debut", 0, token.clone())
            .await
            .unwrap()
            .collect()
            .await;
        let second: Vec<_> = f
            .backend
            .handle_search_songs("debut", 1, token.clone())
            .await
            .unwrap()
            .collect()
            .await;
        assert_eq!(first.len(), 1);
        assert_eq!(second.len(), 1);
        assert!(!Arc::ptr_eq(&first[0], &second[0]));
        // The index is built once from a single discovery
        assert_eq!(f.parser.calls(), 3);

        token.cancel();
        let cancelled: Vec<_> = f
            .backend
            .handle_search_songs("debut", 0, token)
            .await
            .unwrap()
            .collect()
            .await;
        assert!(cancelled.is_empty());
    }

    #[tokio::test]
    async fn test_search_stream_stops_when_cancelled_mid_way() {
        let (fs, parser) = library();
        let f = fixture(fs, parser, 25);
        let token = CancellationToken::new();

        let mut hits = f
            .backend
            .handle_search_songs("debut", 0, token.clone())
            .await
            .unwrap();
        assert!(hits.next().await.is_some());

        token.cancel();
        assert!(hits.next().await.is_none());
    }

    #[tokio::test]
    async fn test_concurrent_first_searches_share_one_scan() {
        let (fs, parser) = library();
        let f = fixture(fs, parser, 25);
        let token = CancellationToken::new();

        let (a, b) = tokio::join!(
            f.backend.handle_search_songs("debut", 0, token.clone()),
            f.backend.handle_search_songs("solo", 0, token.clone()),
        );

        assert_eq!(a.unwrap().count().await, 2);
        assert_eq!(b.unwrap().count().await, 1);
        assert_eq!(f.parser.calls(), 3);
    }

    #[tokio::test]
    async fn test_library_songs_stop_when_cancelled() {
        let (fs, parser) = library();
        let f = fixture(fs, parser, 25);
        let token = CancellationToken::new();

        let mut songs = f.backend.handle_get_library_songs(token.clone()).await.unwrap();
        assert!(songs.next().await.is_some());

        token.cancel();
        assert!(songs.next().await.is_none());
        // An interrupted scan is not mistaken for the whole library
        assert!(!f.backend.discovery().is_complete());
    }

    #[tokio::test]
    async fn test_preview_load_does_not_truncate_library() {
        let (fs, parser) = library();
        let f = fixture(fs, parser, 25);

        let mut preview = SongPreview::empty(SourceType::Local);
        preview.path = Some("/m/2.mp3".to_string());
        f.backend.handle_get_song_from_preview(&preview).await.unwrap();

        let songs: Vec<SharedSong> = f
            .backend
            .handle_get_library_songs(CancellationToken::new())
            .await
            .unwrap()
            .collect()
            .await;
        assert_eq!(songs.len(), 3);

        let hits = f
            .backend
            .handle_search_songs("intro", 0, CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(hits.count().await, 1);
    }

    #[tokio::test]
    async fn test_get_song_scans_a_cold_cache() {
        let (fs, parser) = library();
        let f = fixture(fs, parser, 25);

        let song = f
            .backend
            .handle_get_song(&song_id_for_path("/m/3.flac"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(song.read().title, "Single");

        // Once scanned, a miss is final
        assert!(f.backend.handle_get_song("unknown").await.unwrap().is_none());
        assert_eq!(f.parser.calls(), 3);
    }

    #[tokio::test]
    async fn test_album_from_preview() {
        let (fs, parser) = library();
        let f = fixture(fs, parser, 25);
        let albums: Vec<SharedAlbum> = f
            .backend
            .handle_get_library_albums(CancellationToken::new())
            .await
            .unwrap()
            .collect()
            .await;

        let by_id = AlbumPreview::from(&*albums[0].read());
        let album = f.backend.handle_get_album_from_preview(&by_id).await.unwrap();
        assert!(Arc::ptr_eq(&album, &albums[0]));

        let mut by_title = AlbumPreview::empty(SourceType::Local);
        by_title.title = Some("Other".to_string());
        by_title.artists = vec![crate::model::ArtistPreview::named("Solo")];
        let album = f.backend.handle_get_album_from_preview(&by_title).await.unwrap();
        assert!(Arc::ptr_eq(&album, &albums[1]));

        by_title.artists = vec![crate::model::ArtistPreview::named("Nobody")];
        assert!(f.backend.handle_get_album_from_preview(&by_title).await.is_err());
    }

    #[tokio::test]
    async fn test_refresh_library_songs_rescans_and_drops_index() {
        let (fs, parser) = library();
        let f = fixture(fs, parser, 25);
        let token = CancellationToken::new();
        let hits = f.backend.handle_search_songs("solo", 0, token.clone()).await.unwrap();
        assert_eq!(hits.count().await, 1);

        f.fs.remove_file("/m/3.flac");
        f.backend.handle_refresh_library_songs().await.unwrap();

        let hits = f.backend.handle_search_songs("solo", 0, token).await.unwrap();
        assert_eq!(hits.count().await, 0);
        assert_eq!(f.cache.len::<Song>(SourceType::Local), 2);
    }

    #[tokio::test]
    async fn test_library_albums_reconcile_on_first_use() {
        let (fs, parser) = library();
        let f = fixture(fs, parser, 25);

        let albums: Vec<SharedAlbum> = f
            .backend
            .handle_get_library_albums(CancellationToken::new())
            .await
            .unwrap()
            .collect()
            .await;

        let titles: Vec<String> = albums.iter().map(|a| a.read().title.clone()).collect();
        assert_eq!(titles, vec!["Debut", "Other"]);
        assert_eq!(albums[0].read().songs.len(), 2);

        let song = f.cache.get::<Song>(SourceType::Local, &song_id_for_path("/m/2.mp3")).unwrap();
        let snapshot = song.read().clone();
        let album = f.backend.handle_get_songs_album(&snapshot).await.unwrap().unwrap();
        assert!(Arc::ptr_eq(&album, &albums[0]));
    }

    #[tokio::test]
    async fn test_refresh_song_keeps_id_and_updates_handle() {
        let (fs, parser) = library();
        let f = fixture(fs, parser, 25);
        let context = shared_context(
            f.cache.clone(),
            Arc::new(ScriptedResolver::default()),
            Arc::new(MemoryStateStore::new()),
        );
        let service = MusicService::new(f.backend.clone(), context);
        let song = f.backend.discover_all(false).await.remove(0);

        f.parser
            .set_tags("/m/1.mp3", tags("Intro (Remastered)", "Debut", "Band", Some(1), Some(1)));
        let handle = service.refresh_song(&song).await.unwrap().unwrap();

        assert!(Arc::ptr_eq(&handle, &song));
        assert_eq!(song.read().title, "Intro (Remastered)");
        assert_eq!(song.read().id, song_id_for_path("/m/1.mp3"));
    }

    #[tokio::test]
    async fn test_song_from_preview_by_path() {
        let (fs, parser) = library();
        let f = fixture(fs, parser, 25);

        let mut preview = SongPreview::empty(SourceType::Local);
        preview.path = Some("/m/2.mp3".to_string());
        let song = f.backend.handle_get_song_from_preview(&preview).await.unwrap();
        assert_eq!(song.read().title, "Outro");

        // Second lookup hits the cache
        let again = f.backend.handle_get_song_from_preview(&preview).await.unwrap();
        assert!(Arc::ptr_eq(&song, &again));
        assert_eq!(f.parser.calls(), 1);

        let missing = SongPreview::empty(SourceType::Local);
        assert!(f.backend.handle_get_song_from_preview(&missing).await.is_err());
    }
}
