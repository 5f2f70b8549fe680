//! The contract every music source implements.
//!
//! Backends only do the source-specific work. Lifecycle, error recovery and
//! playback coordination live in [`MusicService`](super::MusicService),
//! which wraps every call made here.

use async_trait::async_trait;
use bitflags::bitflags;
use futures::stream::BoxStream;
use tokio_util::sync::CancellationToken;

use crate::error::{Error, Result};
use crate::model::{
    AlbumPreview, Artist, Playlist, SharedAlbum, SharedArtist, SharedSong, Song, SongPreview,
    SourceType,
};

/// Lazy sequence of songs.
pub type SongStream = BoxStream<'static, SharedSong>;
/// Lazy sequence of albums.
pub type AlbumStream = BoxStream<'static, SharedAlbum>;
/// Lazy sequence of artists.
pub type ArtistStream = BoxStream<'static, SharedArtist>;

bitflags! {
    /// Optional operations a backend implements.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct Capabilities: u32 {
        const SEARCH = 1 << 0;
        const SEARCH_HINTS = 1 << 1;
        const LIBRARY_SONGS = 1 << 2;
        const LIBRARY_ALBUMS = 1 << 3;
        const LIBRARY_ARTISTS = 1 << 4;
        const ALBUM_OF_SONG = 1 << 5;
        const ALBUM = 1 << 6;
        const PLAYLIST = 1 << 7;
        const ARTIST = 1 << 8;
        const ARTIST_SONGS = 1 << 9;
    }
}

/// A music source.
///
/// Optional hooks default to [`Error::Unsupported`]; a backend that
/// overrides one must also advertise it in [`capabilities`](Self::capabilities).
#[async_trait]
pub trait MusicBackend: Send + Sync {
    fn source(&self) -> SourceType;

    /// Name used in logs and recovery prompts.
    fn name(&self) -> &str;

    /// Whether this source can work on the current platform.
    fn available(&self) -> bool {
        true
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities::empty()
    }

    /// Restore an existing authorization without user interaction.
    async fn passively_authorize(&self) -> Result<()> {
        Ok(())
    }

    async fn handle_initialization(&self) -> Result<()>;
    async fn handle_deinitialization(&self) -> Result<()>;

    /// Start playing `song` from the beginning.
    async fn handle_play(&self, song: &Song) -> Result<()>;
    async fn handle_resume(&self) -> Result<()>;
    async fn handle_pause(&self) -> Result<()>;
    async fn handle_stop(&self) -> Result<()>;
    async fn handle_seek_to_time(&self, seconds: f64) -> Result<()>;
    /// `level` is already clamped to [0, 1].
    async fn handle_set_volume(&self, level: f64) -> Result<()>;

    async fn handle_get_song(&self, id: &str) -> Result<Option<SharedSong>>;
    /// Fetch a fresh copy of `song`. The id must not change.
    async fn handle_refresh_song(&self, song: &Song) -> Result<Song>;
    async fn handle_get_song_from_preview(&self, preview: &SongPreview) -> Result<SharedSong>;
    async fn handle_get_album_from_preview(&self, preview: &AlbumPreview) -> Result<SharedAlbum>;

    async fn handle_search_songs(
        &self,
        _term: &str,
        _page: usize,
        _cancel: CancellationToken,
    ) -> Result<SongStream> {
        Err(Error::unsupported(self.name(), "searchSongs"))
    }

    async fn handle_search_hints(&self, _term: &str) -> Result<Vec<String>> {
        Err(Error::unsupported(self.name(), "getSearchHints"))
    }

    async fn handle_get_library_songs(&self, _cancel: CancellationToken) -> Result<SongStream> {
        Err(Error::unsupported(self.name(), "getLibrarySongs"))
    }

    async fn handle_refresh_library_songs(&self) -> Result<()> {
        Err(Error::unsupported(self.name(), "refreshLibrarySongs"))
    }

    async fn handle_get_library_albums(&self, _cancel: CancellationToken) -> Result<AlbumStream> {
        Err(Error::unsupported(self.name(), "getLibraryAlbums"))
    }

    async fn handle_refresh_library_albums(&self) -> Result<()> {
        Err(Error::unsupported(self.name(), "refreshLibraryAlbums"))
    }

    async fn handle_get_library_artists(
        &self,
        _cancel: CancellationToken,
    ) -> Result<ArtistStream> {
        Err(Error::unsupported(self.name(), "getLibraryArtists"))
    }

    async fn handle_refresh_library_artists(&self) -> Result<()> {
        Err(Error::unsupported(self.name(), "refreshLibraryArtists"))
    }

    async fn handle_get_songs_album(&self, _song: &Song) -> Result<Option<SharedAlbum>> {
        Err(Error::unsupported(self.name(), "getSongsAlbum"))
    }

    async fn handle_get_album(&self, _id: &str) -> Result<Option<SharedAlbum>> {
        Err(Error::unsupported(self.name(), "getAlbum"))
    }

    async fn handle_get_playlist(&self, _url: &str) -> Result<Option<Playlist>> {
        Err(Error::unsupported(self.name(), "getPlaylist"))
    }

    async fn handle_get_artist(&self, _id: &str) -> Result<Option<SharedArtist>> {
        Err(Error::unsupported(self.name(), "getArtist"))
    }

    async fn handle_get_artists_songs(
        &self,
        _artist: &Artist,
        _cancel: CancellationToken,
    ) -> Result<SongStream> {
        Err(Error::unsupported(self.name(), "getArtistsSongs"))
    }
}
