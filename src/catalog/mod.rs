//! Streaming catalog source.
//!
//! Searches the catalog, lists the user's library and plays catalog items
//! through the platform's catalog player. Without user authorization the
//! service refuses to initialize with a silent error, which callers handle
//! by asking the user to authorize.

pub mod dto;
mod adapter;
mod client;

pub use adapter::{artwork_url, is_catalog_id, playlist_id_from_url};
pub use client::{CatalogApi, CatalogClient};

use async_trait::async_trait;
use futures::future::{self, BoxFuture, FutureExt};
use futures::stream::{self, BoxStream, StreamExt};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use crate::error::{CatalogError, Error, Result};
use crate::model::{
    Album, AlbumPreview, Artist, ObjectCache, Playlist, SharedAlbum, SharedArtist, SharedSong, Song,
    SongPreview, SourceType,
};
use crate::platform::{AudioOutput, MediaSource};
use crate::service::{ArtistStream, Capabilities, MusicBackend, SongStream};

const NAME: &str = "CatalogMusicService";

/// Items requested per page.
pub const PAGE_SIZE: usize = 25;

/// Backend for the streaming catalog.
pub struct CatalogBackend {
    api: Arc<dyn CatalogApi>,
    output: Arc<dyn AudioOutput>,
    cache: Arc<ObjectCache>,
}

impl CatalogBackend {
    pub fn new(api: Arc<dyn CatalogApi>, output: Arc<dyn AudioOutput>, cache: Arc<ObjectCache>) -> Self {
        Self { api, output, cache }
    }

    /// Convert and cache song resources.
    fn cache_songs(&self, resources: Vec<dto::SongResource>) -> Vec<SharedSong> {
        resources
            .into_iter()
            .filter_map(adapter::to_song)
            .map(|song| self.cache.insert(song))
            .collect()
    }

    async fn fetch_song(&self, id: &str) -> Result<Option<SharedSong>> {
        let resource = self.api.song(id, !is_catalog_id(id)).await?;
        Ok(resource
            .and_then(adapter::to_song)
            .map(|song| self.cache.insert(song)))
    }

    /// Fetch an album and cache it along with its tracks.
    async fn fetch_album(&self, id: &str) -> Result<Option<SharedAlbum>> {
        let resource = self.api.album(id, !is_catalog_id(id)).await?;
        Ok(resource.and_then(adapter::to_album).map(|(album, songs)| {
            for song in songs {
                self.cache.insert(song);
            }
            self.cache.insert(album)
        }))
    }
}

/// Lazily fetch pages until the catalog reports no `next` page.
///
/// A failing page ends the sequence with a warning.
fn paginate<R, T>(
    fetch: impl Fn(usize) -> BoxFuture<'static, std::result::Result<dto::ResourceList<R>, CatalogError>>
    + Send
    + 'static,
    convert: impl Fn(R) -> Option<T> + Send + 'static,
) -> BoxStream<'static, T>
where
    R: Send + 'static,
    T: Send + 'static,
{
    stream::unfold(Some(0usize), move |offset| {
        let request = offset.map(|offset| (offset, fetch(offset)));
        async move {
            let (offset, request) = request?;
            match request.await {
                Ok(page) => {
                    let count = page.data.len();
                    let next = (page.next.is_some() && count > 0).then_some(offset + count);
                    Some((page.data, next))
                }
                Err(e) => {
                    tracing::warn!(target: "catalog", offset, error = %e, "Page request failed, stopping");
                    None
                }
            }
        }
    })
    .flat_map(stream::iter)
    .filter_map(move |resource| future::ready(convert(resource)))
    .boxed()
}

#[async_trait]
impl MusicBackend for CatalogBackend {
    fn source(&self) -> SourceType {
        SourceType::Catalog
    }

    fn name(&self) -> &str {
        NAME
    }

    fn available(&self) -> bool {
        self.api.has_developer_token()
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities::SEARCH
            | Capabilities::SEARCH_HINTS
            | Capabilities::LIBRARY_SONGS
            | Capabilities::LIBRARY_ARTISTS
            | Capabilities::ALBUM
            | Capabilities::PLAYLIST
            | Capabilities::ARTIST
            | Capabilities::ARTIST_SONGS
    }

    async fn passively_authorize(&self) -> Result<()> {
        tracing::debug!(target: "catalog", authorized = self.api.is_authorized(), "Passive authorization");
        Ok(())
    }

    async fn handle_initialization(&self) -> Result<()> {
        if !self.api.is_authorized() {
            return Err(Error::silent("Not authorized with the music catalog"));
        }
        self.output.open().await
    }

    async fn handle_deinitialization(&self) -> Result<()> {
        self.output.close().await
    }

    async fn handle_play(&self, song: &Song) -> Result<()> {
        let source = MediaSource::Catalog {
            id: song.id.clone(),
        };
        match self.output.load(source).await {
            Ok(()) => {}
            // Skipped or stopped while still loading
            Err(e) if e.root().is_aborted() => return Ok(()),
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
        if let Some(song) = self.cache.get::<Song>(SourceType::Catalog, id) {
            return Ok(Some(song));
        }
        self.fetch_song(id).await
    }

    async fn handle_refresh_song(&self, song: &Song) -> Result<Song> {
        let resource = self.api.song(&song.id, !is_catalog_id(&song.id)).await?;
        resource
            .and_then(adapter::to_song)
            .ok_or_else(|| Error::not_found(format!("song with id {}", song.id)))
    }

    async fn handle_get_song_from_preview(&self, preview: &SongPreview) -> Result<SharedSong> {
        let id = preview
            .id
            .as_deref()
            .ok_or_else(|| Error::not_found("catalog preview without id"))?;
        self.handle_get_song(id)
            .await?
            .ok_or_else(|| Error::not_found(format!("song with id {id}")))
    }

    async fn handle_get_album_from_preview(&self, preview: &AlbumPreview) -> Result<SharedAlbum> {
        let id = preview
            .id
            .as_deref()
            .ok_or_else(|| Error::not_found("catalog album preview without id"))?;
        self.handle_get_album(id)
            .await?
            .ok_or_else(|| Error::not_found(format!("album with id {id}")))
    }

    async fn handle_search_songs(
        &self,
        term: &str,
        page: usize,
        cancel: CancellationToken,
    ) -> Result<SongStream> {
        if term.trim().is_empty() {
            return Ok(stream::empty().boxed());
        }

        let resources = self
            .api
            .search_songs(term, PAGE_SIZE, page * PAGE_SIZE)
            .await?;
        Ok(stream::iter(self.cache_songs(resources))
            .take_while(move |_| future::ready(!cancel.is_cancelled()))
            .boxed())
    }

    async fn handle_search_hints(&self, term: &str) -> Result<Vec<String>> {
        if term.trim().is_empty() {
            return Ok(Vec::new());
        }
        Ok(self.api.search_hints(term).await?)
    }

    async fn handle_get_library_songs(&self, cancel: CancellationToken) -> Result<SongStream> {
        let api = Arc::clone(&self.api);
        let cache = Arc::clone(&self.cache);
        let songs: SongStream = paginate(
            move |offset| {
                let api = Arc::clone(&api);
                async move { api.library_songs(PAGE_SIZE, offset).await }.boxed()
            },
            move |resource| {
                // Songs without play params cannot be played
                if !adapter::is_playable(&resource) {
                    return None;
                }
                adapter::to_song(resource).map(|song| cache.insert(song))
            },
        );
        Ok(songs
            .take_while(move |_| future::ready(!cancel.is_cancelled()))
            .boxed())
    }

    async fn handle_refresh_library_songs(&self) -> Result<()> {
        let evicted = self.cache.clear::<Song>(SourceType::Catalog);
        tracing::debug!(target: "catalog", evicted, "Evicted cached songs");
        Ok(())
    }

    async fn handle_get_library_artists(&self, cancel: CancellationToken) -> Result<ArtistStream> {
        let api = Arc::clone(&self.api);
        let cache = Arc::clone(&self.cache);
        let artists: ArtistStream = paginate(
            move |offset| {
                let api = Arc::clone(&api);
                async move { api.library_artists(PAGE_SIZE, offset).await }.boxed()
            },
            move |resource| adapter::to_artist(resource).map(|artist| cache.insert(artist)),
        );
        Ok(artists
            .take_while(move |_| future::ready(!cancel.is_cancelled()))
            .boxed())
    }

    async fn handle_refresh_library_artists(&self) -> Result<()> {
        let evicted = self.cache.clear::<Artist>(SourceType::Catalog);
        tracing::debug!(target: "catalog", evicted, "Evicted cached artists");
        Ok(())
    }

    async fn handle_get_album(&self, id: &str) -> Result<Option<SharedAlbum>> {
        if let Some(album) = self.cache.get::<Album>(SourceType::Catalog, id) {
            return Ok(Some(album));
        }
        self.fetch_album(id).await
    }

    async fn handle_get_playlist(&self, url: &str) -> Result<Option<Playlist>> {
        let id = playlist_id_from_url(url)
            .ok_or_else(|| Error::not_found(format!("playlist id in {url}")))?;
        // Library playlists are `p.`, catalog playlists `pl.`
        let library = id.starts_with("p.");
        let resource = self.api.playlist(&id, library).await?;
        Ok(resource.map(adapter::to_playlist))
    }

    async fn handle_get_artist(&self, id: &str) -> Result<Option<SharedArtist>> {
        if let Some(artist) = self.cache.get::<Artist>(SourceType::Catalog, id) {
            return Ok(Some(artist));
        }
        let resource = self.api.artist(id).await?;
        Ok(resource
            .and_then(adapter::to_artist)
            .map(|artist| self.cache.insert(artist)))
    }

    async fn handle_get_artists_songs(
        &self,
        artist: &Artist,
        cancel: CancellationToken,
    ) -> Result<SongStream> {
        let resources = self.api.artist_top_songs(&artist.id).await?;
        Ok(stream::iter(self.cache_songs(resources))
            .take_while(move |_| future::ready(!cancel.is_cancelled()))
            .boxed())
    }
}
