//! Music service abstraction.
//!
//! A [`MusicService`] wraps one [`MusicBackend`] and gives every source the
//! same lifecycle, error recovery and playback contract:
//!
//! ```text
//! Disabled -> enable() -> Enabling -> Uninitialized -> initialize()
//!   -> Initializing -> Initialized -> play() -> Playing <-> Paused
//!   -> stop() -> Initialized (song cleared)
//! ```
//!
//! `disable()` is valid from any enabled state: it deinitializes, then
//! persists the disabled flag.
//!
//! # Error recovery
//!
//! Backend calls go through one of two wrappers:
//!
//! - **unrecoverable** (lifecycle, transport, song resolution): on failure
//!   the [`ErrorResolver`] picks retry, ignore (no result) or disable
//!   (deinitialize and re-raise)
//! - **recoverable** (search, library listing and refresh): ignore and
//!   disable both return a caller supplied fallback
//!
//! Silent errors skip the resolver. Calling an optional operation the
//! backend does not advertise fails with [`Error::Unsupported`], also
//! without consulting the resolver.

mod backend;
mod context;
mod recovery;
mod single_flight;
mod state;

pub use backend::{AlbumStream, ArtistStream, Capabilities, MusicBackend, SongStream};
pub use context::ServiceContext;
pub use recovery::{
    ErrorContext, ErrorResolver, FixedResolver, PromptResolver, Resolution, Severity,
};
pub use single_flight::{Flight, FlightGuard, SingleFlight};
pub use state::{LoadingGuard, Notice, PlayerState, ServiceEvent, ServiceState, Transport};

use futures::future::{BoxFuture, FutureExt};
use futures::stream::{self, StreamExt};
use parking_lot::Mutex;
use std::future::Future;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use crate::error::{Error, Result};
use crate::model::{
    AlbumPreview, Artist, Playlist, SharedAlbum, SharedArtist, SharedSong, SongPreview, SourceType,
};
use crate::store::ServiceRecord;

#[derive(Default)]
struct Status {
    enabled: bool,
    enabling: bool,
    initialized: bool,
    initial_played: bool,
    transport: Transport,
    song: Option<SharedSong>,
}

/// One music source with its lifecycle state.
pub struct MusicService {
    backend: Arc<dyn MusicBackend>,
    context: Arc<ServiceContext>,
    status: Mutex<Status>,
    initialization: SingleFlight,
    deinitialization: SingleFlight,
}

impl MusicService {
    /// Wrap a backend and join the context's peer list.
    pub fn new(backend: Arc<dyn MusicBackend>, context: Arc<ServiceContext>) -> Arc<Self> {
        let service = Arc::new(Self {
            backend,
            context: Arc::clone(&context),
            status: Mutex::new(Status::default()),
            initialization: SingleFlight::new(),
            deinitialization: SingleFlight::new(),
        });
        context.add_peer(&service);
        service
    }

    pub fn source(&self) -> SourceType {
        self.backend.source()
    }

    pub fn name(&self) -> &str {
        self.backend.name()
    }

    pub fn available(&self) -> bool {
        self.backend.available()
    }

    pub fn capabilities(&self) -> Capabilities {
        self.backend.capabilities()
    }

    pub fn supports(&self, capability: Capabilities) -> bool {
        self.capabilities().contains(capability)
    }

    pub fn context(&self) -> &Arc<ServiceContext> {
        &self.context
    }

    pub fn is_enabled(&self) -> bool {
        self.available() && self.status.lock().enabled
    }

    pub fn is_initialized(&self) -> bool {
        self.status.lock().initialized
    }

    /// The song this service currently owns.
    pub fn song(&self) -> Option<SharedSong> {
        self.status.lock().song.clone()
    }

    pub fn state(&self) -> ServiceState {
        let status = self.status.lock();
        if status.enabling {
            ServiceState::Enabling
        } else if !(self.available() && status.enabled) {
            ServiceState::Disabled
        } else if self.initialization.in_flight() {
            ServiceState::Initializing
        } else if !status.initialized {
            ServiceState::Uninitialized
        } else {
            match status.transport {
                Transport::Playing => ServiceState::Playing,
                Transport::Paused => ServiceState::Paused,
                Transport::Stopped => ServiceState::Initialized,
            }
        }
    }

    fn log(&self, operation: &str) {
        tracing::debug!(target: "service", service = %self.name(), "{}", operation);
    }

    fn save_enabled(&self, enabled: bool) -> Result<()> {
        self.context
            .store
            .save_service_state(self.source(), ServiceRecord { enabled })
    }

    // ------------------------------------------------------------------
    // Enable / disable
    // ------------------------------------------------------------------

    pub async fn enable(&self) -> Result<()> {
        self.log("enable");
        {
            let mut status = self.status.lock();
            status.enabled = true;
            status.enabling = true;
        }

        let result = self.initialize().await;
        {
            let mut status = self.status.lock();
            status.enabling = false;
            if result.is_err() {
                status.enabled = false;
            }
        }
        result?;
        self.save_enabled(true)
    }

    /// Deinitialize and persist the disabled flag.
    ///
    /// Boxed because the recovery wrappers call back into it.
    pub fn disable(&self) -> BoxFuture<'_, Result<()>> {
        async move {
            self.log("disable");
            self.status.lock().enabled = false;
            self.deinitialize().await?;
            self.save_enabled(false)
        }
        .boxed()
    }

    /// Re-apply the persisted enabled flag.
    pub async fn restore_state(&self) -> Result<()> {
        if !self.available() {
            return Ok(());
        }

        self.log("restoreState");
        let Some(record) = self.context.store.service_state(self.source()) else {
            return Ok(());
        };

        if record.enabled {
            self.enable().await
        } else {
            self.status.lock().enabled = false;
            Ok(())
        }
    }

    /// The resolver chose "disable" while an operation was failing.
    async fn disable_after_failure(&self) -> Result<()> {
        // The failing operation is the deinitialization itself
        if self.deinitialization.in_flight() {
            self.status.lock().enabled = false;
            return self.save_enabled(false);
        }
        self.disable().await
    }

    // ------------------------------------------------------------------
    // Initialization
    // ------------------------------------------------------------------

    /// Initialize once. Concurrent callers share the in-flight attempt.
    pub async fn initialize(&self) -> Result<()> {
        self.log("initialize");
        if self.status.lock().initialized {
            return Ok(());
        }

        match self.initialization.join() {
            Flight::Follower(pending) => {
                tracing::debug!(target: "service", service = %self.name(), "Awaiting pending initialization");
                pending.await
            }
            Flight::Leader(guard) => {
                let result = self.run_initialization().await;
                guard.complete(result)
            }
        }
    }

    async fn run_initialization(&self) -> Result<()> {
        if self.status.lock().initialized {
            return Ok(());
        }

        self.with_unrecoverable("passivelyAuthorize", || self.backend.passively_authorize())
            .await?;
        tracing::debug!(target: "service", service = %self.name(), "Initializing");
        self.with_unrecoverable("initialize", || self.backend.handle_initialization())
            .await?;

        self.status.lock().initialized = true;
        tracing::info!(target: "service", service = %self.name(), "Initialized");
        Ok(())
    }

    pub async fn deinitialize(&self) -> Result<()> {
        self.log("deinitialize");
        if !self.status.lock().initialized {
            return Ok(());
        }

        match self.deinitialization.join() {
            Flight::Follower(pending) => pending.await,
            Flight::Leader(guard) => {
                let result = self
                    .with_unrecoverable("deinitialize", || self.backend.handle_deinitialization())
                    .await
                    .map(|_| ());
                if result.is_ok() {
                    let mut status = self.status.lock();
                    status.initialized = false;
                    status.initial_played = false;
                    status.transport = Transport::Stopped;
                }
                guard.complete(result)
            }
        }
    }

    // ------------------------------------------------------------------
    // Transport
    // ------------------------------------------------------------------

    /// Start the current song, or resume it.
    ///
    /// Starting stops every other enabled service first, one after the
    /// other, so no other service is mid-playback once this one begins.
    pub async fn play(&self) -> Result<()> {
        let _loading = self.context.begin_loading();

        let resume = self.status.lock().initial_played;
        if resume {
            self.log("resume");
            self.with_unrecoverable("resume", || self.backend.handle_resume())
                .await?;
        } else {
            self.initialize().await?;
            let song = self
                .song()
                .ok_or_else(|| Error::not_found(format!("{}: no song to play", self.name())))?;

            self.seek_to_time(0.0).await?;
            self.set_volume(self.context.volume()).await?;
            self.stop_peers().await?;

            self.log("play");
            let snapshot = song.read().clone();
            self.with_unrecoverable("play", || self.backend.handle_play(&snapshot))
                .await?;
            self.status.lock().initial_played = true;
        }

        self.status.lock().transport = Transport::Playing;
        self.context.update_player(|player| player.playing = true);
        Ok(())
    }

    async fn stop_peers(&self) -> Result<()> {
        tracing::debug!(target: "service", service = %self.name(), "Stopping other services");
        for peer in self.context.peers() {
            if std::ptr::eq(Arc::as_ptr(&peer), self) || !peer.is_enabled() {
                continue;
            }
            peer.stop().await?;
        }
        Ok(())
    }

    pub async fn pause(&self) -> Result<()> {
        self.log("pause");
        let _loading = self.context.begin_loading();

        self.with_unrecoverable("pause", || self.backend.handle_pause())
            .await?;

        self.status.lock().transport = Transport::Paused;
        self.context.update_player(|player| player.playing = false);
        Ok(())
    }

    /// Stop playback and forget the current song.
    pub async fn stop(&self) -> Result<()> {
        self.log("stop");
        {
            let mut status = self.status.lock();
            status.song = None;
            status.initial_played = false;
        }
        let _loading = self.context.begin_loading();

        self.with_unrecoverable("stop", || self.backend.handle_stop())
            .await?;

        self.status.lock().transport = Transport::Stopped;
        self.context.update_player(|player| player.playing = false);
        Ok(())
    }

    pub async fn toggle_play(&self) -> Result<()> {
        self.log("togglePlay");
        if self.context.player().playing {
            self.pause().await
        } else {
            self.play().await
        }
    }

    pub async fn seek_to_time(&self, seconds: f64) -> Result<()> {
        self.log("seekToTime");
        self.initialize().await?;
        self.with_unrecoverable("seekToTime", || self.backend.handle_seek_to_time(seconds))
            .await?;
        self.context.update_player(|player| player.time = seconds);
        Ok(())
    }

    /// Set the output volume, clamped to [0, 1].
    pub async fn set_volume(&self, level: f64) -> Result<()> {
        self.log("setVolume");
        let level = level.clamp(0.0, 1.0);
        self.initialize().await?;
        self.with_unrecoverable("setVolume", || self.backend.handle_set_volume(level))
            .await?;
        self.context.update_player(|player| player.volume = level);
        Ok(())
    }

    /// Adopt `song` as the current song.
    ///
    /// No-op for the handle already current; otherwise playback stops and
    /// the time trackers reset.
    pub async fn change_song(&self, song: SharedSong) -> Result<()> {
        self.log("changeSong");
        if self
            .song()
            .is_some_and(|current| Arc::ptr_eq(&current, &song))
        {
            return Ok(());
        }

        if self.is_initialized() {
            self.stop().await?;
        }

        let duration = song.read().duration.unwrap_or(1.0);
        self.status.lock().song = Some(song);
        self.context.update_player(|player| {
            player.time = 0.0;
            player.duration = duration;
        });
        Ok(())
    }

    /// Feed a playback notification from the backend's output.
    pub fn notify(&self, event: ServiceEvent) {
        match event {
            ServiceEvent::TimeUpdate(time) => {
                self.context.update_player(|player| player.time = time);
            }
            ServiceEvent::Playing | ServiceEvent::Ended => {
                tracing::debug!(target: "service", service = %self.name(), ?event, "Playback event");
                self.context.emit(Notice {
                    source: self.source(),
                    event,
                });
            }
        }
    }

    // ------------------------------------------------------------------
    // Songs
    // ------------------------------------------------------------------

    pub async fn get_song(&self, id: &str) -> Result<Option<SharedSong>> {
        self.log("getSong");
        self.initialize().await?;
        self.with_recoverable("getSong", || None, || self.backend.handle_get_song(id))
            .await
    }

    pub async fn get_song_from_preview(&self, preview: &SongPreview) -> Result<Option<SharedSong>> {
        self.log("getSongFromPreview");
        self.with_unrecoverable("getSongFromPreview", || {
            self.backend.handle_get_song_from_preview(preview)
        })
        .await
    }

    pub async fn get_album_from_preview(
        &self,
        preview: &AlbumPreview,
    ) -> Result<Option<SharedAlbum>> {
        self.log("getAlbumFromPreview");
        self.with_unrecoverable("getAlbumFromPreview", || {
            self.backend.handle_get_album_from_preview(preview)
        })
        .await
    }

    /// Fetch a fresh copy of `song` and write it into the cached handle.
    ///
    /// Every holder of the handle observes the refresh. A refresh that
    /// changes the id fails before anything is written.
    pub async fn refresh_song(&self, song: &SharedSong) -> Result<Option<SharedSong>> {
        self.log("refreshSong");
        self.initialize().await?;

        let snapshot = song.read().clone();
        let current = &snapshot;
        let Some(refreshed) = self
            .with_recoverable("refreshSong", || None, move || async move {
                self.backend.handle_refresh_song(current).await.map(Some)
            })
            .await?
        else {
            return Ok(None);
        };

        if refreshed.id != snapshot.id {
            return Err(Error::IdentityChanged {
                expected: snapshot.id,
                actual: refreshed.id,
            });
        }

        let handle = self.context.cache.insert(refreshed.clone());
        if !Arc::ptr_eq(&handle, song) {
            *song.write() = refreshed;
        }
        Ok(Some(handle))
    }

    // ------------------------------------------------------------------
    // Search and library
    // ------------------------------------------------------------------

    fn require(&self, capability: Capabilities, operation: &'static str) -> Result<()> {
        if self.supports(capability) {
            Ok(())
        } else {
            Err(Error::unsupported(self.name(), operation))
        }
    }

    pub async fn search_songs(
        &self,
        term: &str,
        page: usize,
        cancel: CancellationToken,
    ) -> Result<SongStream> {
        self.log("searchSongs");
        self.initialize().await?;
        self.require(Capabilities::SEARCH, "searchSongs")?;
        self.with_recoverable(
            "searchSongs",
            || stream::empty().boxed(),
            || self.backend.handle_search_songs(term, page, cancel.clone()),
        )
        .await
    }

    pub async fn search_hints(&self, term: &str) -> Result<Vec<String>> {
        self.log("getSearchHints");
        self.initialize().await?;
        self.require(Capabilities::SEARCH_HINTS, "getSearchHints")?;
        self.with_recoverable("getSearchHints", Vec::new, || {
            self.backend.handle_search_hints(term)
        })
        .await
    }

    /// Library songs. Empty for a service without a library.
    pub async fn library_songs(&self, cancel: CancellationToken) -> Result<SongStream> {
        self.log("librarySongs");
        if !self.supports(Capabilities::LIBRARY_SONGS) {
            return Ok(stream::empty().boxed());
        }

        self.initialize().await?;
        self.with_recoverable(
            "getLibrarySongs",
            || stream::empty().boxed(),
            || self.backend.handle_get_library_songs(cancel.clone()),
        )
        .await
    }

    pub async fn refresh_library_songs(&self) -> Result<()> {
        self.log("refreshLibrarySongs");
        self.require(Capabilities::LIBRARY_SONGS, "refreshLibrarySongs")?;
        self.initialize().await?;
        self.with_recoverable("refreshLibrarySongs", || (), || {
            self.backend.handle_refresh_library_songs()
        })
        .await
    }

    pub async fn library_albums(&self, cancel: CancellationToken) -> Result<AlbumStream> {
        self.log("getLibraryAlbums");
        self.require(Capabilities::LIBRARY_ALBUMS, "getLibraryAlbums")?;
        self.initialize().await?;
        self.with_recoverable(
            "getLibraryAlbums",
            || stream::empty().boxed(),
            || self.backend.handle_get_library_albums(cancel.clone()),
        )
        .await
    }

    pub async fn refresh_library_albums(&self) -> Result<()> {
        self.log("refreshLibraryAlbums");
        self.require(Capabilities::LIBRARY_ALBUMS, "refreshLibraryAlbums")?;
        self.initialize().await?;
        self.with_recoverable("refreshLibraryAlbums", || (), || {
            self.backend.handle_refresh_library_albums()
        })
        .await
    }

    pub async fn library_artists(&self, cancel: CancellationToken) -> Result<ArtistStream> {
        self.log("getLibraryArtists");
        self.require(Capabilities::LIBRARY_ARTISTS, "getLibraryArtists")?;
        self.initialize().await?;
        self.with_recoverable(
            "getLibraryArtists",
            || stream::empty().boxed(),
            || self.backend.handle_get_library_artists(cancel.clone()),
        )
        .await
    }

    pub async fn refresh_library_artists(&self) -> Result<()> {
        self.log("refreshLibraryArtists");
        self.require(Capabilities::LIBRARY_ARTISTS, "refreshLibraryArtists")?;
        self.initialize().await?;
        self.with_recoverable("refreshLibraryArtists", || (), || {
            self.backend.handle_refresh_library_artists()
        })
        .await
    }

    pub async fn songs_album(&self, song: &SharedSong) -> Result<Option<SharedAlbum>> {
        self.log("getSongsAlbum");
        self.require(Capabilities::ALBUM_OF_SONG, "getSongsAlbum")?;
        self.initialize().await?;
        let snapshot = song.read().clone();
        self.with_recoverable("getSongsAlbum", || None, || {
            self.backend.handle_get_songs_album(&snapshot)
        })
        .await
    }

    pub async fn album(&self, id: &str) -> Result<Option<SharedAlbum>> {
        self.log("getAlbum");
        self.initialize().await?;
        self.require(Capabilities::ALBUM, "getAlbum")?;
        self.with_recoverable("getAlbum", || None, || self.backend.handle_get_album(id))
            .await
    }

    pub async fn playlist(&self, url: &str) -> Result<Option<Playlist>> {
        self.log("getPlaylist");
        self.require(Capabilities::PLAYLIST, "getPlaylist")?;
        self.initialize().await?;
        self.with_recoverable("getPlaylist", || None, || self.backend.handle_get_playlist(url))
            .await
    }

    pub async fn artist(&self, id: &str) -> Result<Option<SharedArtist>> {
        self.log("getArtist");
        self.require(Capabilities::ARTIST, "getArtist")?;
        self.initialize().await?;
        self.with_recoverable("getArtist", || None, || self.backend.handle_get_artist(id))
            .await
    }

    pub async fn artists_songs(
        &self,
        artist: &Artist,
        cancel: CancellationToken,
    ) -> Result<SongStream> {
        self.log("getArtistsSongs");
        self.require(Capabilities::ARTIST_SONGS, "getArtistsSongs")?;
        self.initialize().await?;
        self.with_recoverable(
            "getArtistsSongs",
            || stream::empty().boxed(),
            || self.backend.handle_get_artists_songs(artist, cancel.clone()),
        )
        .await
    }

    // ------------------------------------------------------------------
    // Recovery wrappers
    // ------------------------------------------------------------------

    async fn resolve(&self, operation: &'static str, severity: Severity, error: &Error) -> Resolution {
        tracing::error!(
            target: "service",
            service = %self.name(),
            operation,
            ?severity,
            error = %error,
            "Operation failed"
        );
        let context = ErrorContext {
            source: self.source(),
            service: self.name().to_string(),
            operation,
            severity,
            message: error.to_string(),
        };
        self.context.resolver.resolve(&context).await
    }

    /// Run a lifecycle-critical call.
    ///
    /// `Ok(None)` means the failure was ignored. Choosing "disable" disables
    /// the service and returns the original error.
    async fn with_unrecoverable<T, F, Fut>(
        &self,
        operation: &'static str,
        mut call: F,
    ) -> Result<Option<T>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        loop {
            let error = match call().await {
                Ok(value) => return Ok(Some(value)),
                Err(error) => error,
            };
            if error.is_silent() || error.is_unsupported() {
                return Err(error);
            }

            match self.resolve(operation, Severity::Unrecoverable, &error).await {
                Resolution::Retry => continue,
                Resolution::Ignore => return Ok(None),
                Resolution::Disable => {
                    if let Err(e) = self.disable_after_failure().await {
                        tracing::error!(target: "service", service = %self.name(), error = %e, "Disabling failed");
                    }
                    return Err(error);
                }
            }
        }
    }

    /// Run a best-effort call, falling back on silent, ignored or disabling
    /// failures.
    async fn with_recoverable<T, F, Fut>(
        &self,
        operation: &'static str,
        fallback: impl FnOnce() -> T,
        mut call: F,
    ) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        loop {
            let error = match call().await {
                Ok(value) => return Ok(value),
                Err(error) => error,
            };
            if error.is_unsupported() {
                return Err(error);
            }
            if error.is_silent() {
                tracing::debug!(target: "service", service = %self.name(), operation, error = %error, "Silent failure");
                return Ok(fallback());
            }

            match self.resolve(operation, Severity::Recoverable, &error).await {
                Resolution::Retry => continue,
                Resolution::Ignore => return Ok(fallback()),
                Resolution::Disable => {
                    if let Err(e) = self.disable_after_failure().await {
                        tracing::error!(target: "service", service = %self.name(), error = %e, "Disabling failed");
                    }
                    return Ok(fallback());
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Album, ItemKey, ObjectCache, Song};
    use crate::store::{MemoryStateStore, StateStore};
    use crate::test_utils::{
        CallLog, MockBackend, ScriptedResolver, mock_song, shared_context,
    };

    fn service_with(
        backend: MockBackend,
        resolver: ScriptedResolver,
    ) -> (Arc<MusicService>, Arc<MockBackend>, Arc<ScriptedResolver>) {
        let backend = Arc::new(backend);
        let resolver = Arc::new(resolver);
        let context = shared_context(
            backend.cache(),
            resolver.clone(),
            Arc::new(MemoryStateStore::new()),
        );
        let service = MusicService::new(backend.clone(), context);
        (service, backend, resolver)
    }

    #[tokio::test]
    async fn test_concurrent_initialize_runs_hook_once() {
        let (service, backend, _) =
            service_with(MockBackend::new(SourceType::Local), ScriptedResolver::default());

        let (a, b) = tokio::join!(service.initialize(), service.initialize());

        assert!(a.is_ok() && b.is_ok());
        assert_eq!(backend.calls("initialize"), 1);
        assert!(service.is_initialized());
    }

    #[tokio::test]
    async fn test_concurrent_deinitialize_runs_hook_once() {
        let (service, backend, _) =
            service_with(MockBackend::new(SourceType::Local), ScriptedResolver::default());
        service.initialize().await.unwrap();

        let (a, b) = tokio::join!(service.deinitialize(), service.deinitialize());

        assert!(a.is_ok() && b.is_ok());
        assert_eq!(backend.calls("deinitialize"), 1);
        assert!(!service.is_initialized());
    }

    #[tokio::test]
    async fn test_failed_initialization_can_be_retried_later() {
        let backend = MockBackend::new(SourceType::Catalog)
            .fail("initialize", [Error::silent("not authorized")]);
        let (service, backend, resolver) = service_with(backend, ScriptedResolver::default());

        let err = service.initialize().await.unwrap_err();
        assert!(err.is_silent());
        assert!(!service.is_initialized());
        // Silent failures never reach the resolver
        assert!(resolver.contexts().is_empty());

        service.initialize().await.unwrap();
        assert_eq!(backend.calls("initialize"), 2);
    }

    #[tokio::test]
    async fn test_unrecoverable_retry_reinvokes() {
        let backend =
            MockBackend::new(SourceType::Local).fail("initialize", [Error::playback("device busy")]);
        let (service, backend, resolver) =
            service_with(backend, ScriptedResolver::new([Resolution::Retry]));

        service.initialize().await.unwrap();

        assert_eq!(backend.calls("initialize"), 2);
        let contexts = resolver.contexts();
        assert_eq!(contexts.len(), 1);
        assert_eq!(contexts[0].operation, "initialize");
        assert_eq!(contexts[0].severity, Severity::Unrecoverable);
        assert!(contexts[0].message.contains("device busy"));
    }

    #[tokio::test]
    async fn test_unrecoverable_ignore_returns_no_result() {
        let backend = MockBackend::new(SourceType::Local)
            .fail("getSongFromPreview", [Error::playback("bad preview")]);
        let (service, _, _) = service_with(backend, ScriptedResolver::new([Resolution::Ignore]));

        let preview = SongPreview::empty(SourceType::Local);
        assert!(service.get_song_from_preview(&preview).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_unrecoverable_disable_disables_and_reraises() {
        let backend = MockBackend::new(SourceType::Local).fail("play", [Error::playback("no device")]);
        let (service, backend, _) =
            service_with(backend, ScriptedResolver::new([Resolution::Disable]));

        service.enable().await.unwrap();
        service.change_song(backend.insert_song(mock_song("a"))).await.unwrap();

        let err = service.play().await.unwrap_err();
        assert!(err.to_string().contains("no device"));
        assert_eq!(service.state(), ServiceState::Disabled);
        assert_eq!(backend.calls("deinitialize"), 1);
        assert_eq!(
            service.context().store.service_state(SourceType::Local),
            Some(ServiceRecord { enabled: false })
        );
        assert!(!service.context().player().is_loading());
    }

    #[tokio::test]
    async fn test_recoverable_ignore_and_disable_return_fallback() {
        let backend = MockBackend::new(SourceType::Local)
            .with_capabilities(Capabilities::SEARCH_HINTS)
            .fail("getSearchHints", [Error::playback("a"), Error::playback("b")]);
        let (service, _, resolver) = service_with(
            backend,
            ScriptedResolver::new([Resolution::Ignore, Resolution::Disable]),
        );
        service.enable().await.unwrap();

        assert!(service.search_hints("x").await.unwrap().is_empty());
        assert!(service.is_enabled());

        assert!(service.search_hints("x").await.unwrap().is_empty());
        assert!(!service.is_enabled());
        assert_eq!(resolver.contexts()[1].severity, Severity::Recoverable);
    }

    #[tokio::test]
    async fn test_recoverable_retry_reinvokes() {
        let backend = MockBackend::new(SourceType::Local)
            .with_capabilities(Capabilities::SEARCH_HINTS)
            .fail("getSearchHints", [Error::playback("flaky network")]);
        let (service, backend, resolver) =
            service_with(backend, ScriptedResolver::new([Resolution::Retry]));

        let hints = service.search_hints("x").await.unwrap();

        assert_eq!(hints.len(), 1);
        assert!(hints[0].starts_with("x ("));
        assert_eq!(backend.calls("getSearchHints"), 2);
        let contexts = resolver.contexts();
        assert_eq!(contexts.len(), 1);
        assert_eq!(contexts[0].operation, "getSearchHints");
        assert_eq!(contexts[0].severity, Severity::Recoverable);
    }

    #[tokio::test]
    async fn test_album_from_preview_resolves_cached_album() {
        let (service, backend, resolver) = service_with(
            MockBackend::new(SourceType::Local),
            ScriptedResolver::new([Resolution::Ignore]),
        );
        let album = backend.cache().insert(Album {
            source: SourceType::Local,
            id: "alb".to_string(),
            title: "Debut".to_string(),
            songs: Vec::new(),
            artists: Vec::new(),
            artwork: None,
        });

        let preview = AlbumPreview::from(&*album.read());
        let resolved = service.get_album_from_preview(&preview).await.unwrap().unwrap();
        assert!(Arc::ptr_eq(&resolved, &album));

        // Unknown albums go through the unrecoverable resolver
        let missing = AlbumPreview::empty(SourceType::Local);
        assert!(service.get_album_from_preview(&missing).await.unwrap().is_none());
        let contexts = resolver.contexts();
        assert_eq!(contexts[0].operation, "getAlbumFromPreview");
        assert_eq!(contexts[0].severity, Severity::Unrecoverable);
    }

    #[tokio::test]
    async fn test_recoverable_silent_skips_resolver() {
        let backend = MockBackend::new(SourceType::Catalog)
            .with_capabilities(Capabilities::SEARCH_HINTS)
            .fail("getSearchHints", [Error::silent("sign in first")]);
        let (service, _, resolver) = service_with(backend, ScriptedResolver::default());

        assert!(service.search_hints("x").await.unwrap().is_empty());
        assert!(resolver.contexts().is_empty());
    }

    #[tokio::test]
    async fn test_unsupported_operation_is_distinct() {
        let (service, _, resolver) =
            service_with(MockBackend::new(SourceType::Local), ScriptedResolver::default());

        let err = match service.search_songs("x", 0, CancellationToken::new()).await {
            Ok(_) => panic!("search must be unsupported"),
            Err(e) => e,
        };
        assert!(err.is_unsupported());
        assert!(service.playlist("https://x/pl.1").await.unwrap_err().is_unsupported());
        assert!(resolver.contexts().is_empty());

        // Listing library songs of a library-less service is just empty
        let songs: Vec<_> = service
            .library_songs(CancellationToken::new())
            .await
            .unwrap()
            .collect()
            .await;
        assert!(songs.is_empty());
    }

    #[tokio::test]
    async fn test_play_stops_other_services_first() {
        let log = CallLog::default();
        let cache = Arc::new(ObjectCache::new());
        let context = shared_context(
            cache.clone(),
            Arc::new(ScriptedResolver::default()),
            Arc::new(MemoryStateStore::new()),
        );

        let backend_a = Arc::new(
            MockBackend::new(SourceType::Local)
                .with_cache(cache.clone())
                .with_log(log.clone()),
        );
        let backend_b = Arc::new(
            MockBackend::new(SourceType::Catalog)
                .with_cache(cache)
                .with_log(log.clone()),
        );
        let a = MusicService::new(backend_a.clone(), Arc::clone(&context));
        let b = MusicService::new(backend_b.clone(), Arc::clone(&context));
        a.enable().await.unwrap();
        b.enable().await.unwrap();

        a.change_song(backend_a.insert_song(mock_song("a"))).await.unwrap();
        a.play().await.unwrap();
        assert_eq!(a.state(), ServiceState::Playing);

        b.change_song(backend_b.insert_song(mock_song("b"))).await.unwrap();
        b.play().await.unwrap();

        let entries = log.entries();
        let stop_a = entries.iter().rposition(|e| e == "local:stop").unwrap();
        let play_b = entries.iter().position(|e| e == "catalog:play").unwrap();
        assert!(stop_a < play_b);
        assert_eq!(a.state(), ServiceState::Initialized);
        assert!(a.song().is_none());
        assert_eq!(b.state(), ServiceState::Playing);
        assert!(context.player().playing);
    }

    #[tokio::test]
    async fn test_second_play_resumes() {
        let (service, backend, _) =
            service_with(MockBackend::new(SourceType::Local), ScriptedResolver::default());
        service.change_song(backend.insert_song(mock_song("a"))).await.unwrap();

        service.play().await.unwrap();
        service.pause().await.unwrap();
        assert!(!service.context().player().playing);
        service.toggle_play().await.unwrap();

        assert_eq!(backend.calls("play"), 1);
        assert_eq!(backend.calls("resume"), 1);
        assert_eq!(backend.calls("seekToTime"), 1);
    }

    #[tokio::test]
    async fn test_change_song_same_handle_is_noop() {
        let (service, backend, _) =
            service_with(MockBackend::new(SourceType::Local), ScriptedResolver::default());
        service.initialize().await.unwrap();

        let song = backend.insert_song(mock_song("a"));
        service.change_song(song.clone()).await.unwrap();
        let stops = backend.calls("stop");

        service.change_song(song.clone()).await.unwrap();
        assert_eq!(backend.calls("stop"), stops);

        let other = backend.insert_song(Song {
            duration: Some(42.0),
            ..mock_song("b")
        });
        service.change_song(other).await.unwrap();
        assert_eq!(backend.calls("stop"), stops + 1);
        assert_eq!(service.context().player().duration, 42.0);
        assert_eq!(service.context().player().time, 0.0);
    }

    #[tokio::test]
    async fn test_refresh_with_new_id_leaves_cache_untouched() {
        let backend = MockBackend::new(SourceType::Local).refreshing_to(Song {
            title: "Changed".to_string(),
            ..mock_song("other")
        });
        let (service, backend, _) = service_with(backend, ScriptedResolver::default());
        let song = backend.insert_song(mock_song("a"));

        let err = service.refresh_song(&song).await.unwrap_err();

        assert!(matches!(err, Error::IdentityChanged { .. }));
        assert_eq!(song.read().title, "Song a");
        let cache = &service.context().cache;
        assert!(!cache.contains::<Song>(&ItemKey::song(SourceType::Local, "other")));
    }

    #[tokio::test]
    async fn test_refresh_mutates_shared_handle() {
        let backend = MockBackend::new(SourceType::Local).refreshing_to(Song {
            title: "Remastered".to_string(),
            ..mock_song("a")
        });
        let (service, backend, _) = service_with(backend, ScriptedResolver::default());
        let song = backend.insert_song(mock_song("a"));
        let queued = song.clone();

        let handle = service.refresh_song(&song).await.unwrap().unwrap();

        assert!(Arc::ptr_eq(&handle, &song));
        assert_eq!(queued.read().title, "Remastered");
    }

    #[tokio::test]
    async fn test_set_volume_clamps() {
        let (service, backend, _) =
            service_with(MockBackend::new(SourceType::Local), ScriptedResolver::default());

        service.set_volume(1.7).await.unwrap();
        assert_eq!(service.context().volume(), 1.0);
        service.set_volume(-0.2).await.unwrap();
        assert_eq!(service.context().volume(), 0.0);
        assert_eq!(backend.last_volume(), Some(0.0));
    }

    #[tokio::test]
    async fn test_restore_state_enables_persisted_service() {
        let store = Arc::new(MemoryStateStore::new());
        store
            .save_service_state(SourceType::Local, ServiceRecord { enabled: true })
            .unwrap();
        let context = shared_context(
            Arc::new(ObjectCache::new()),
            Arc::new(ScriptedResolver::default()),
            store,
        );
        let service = MusicService::new(Arc::new(MockBackend::new(SourceType::Local)), context);

        assert_eq!(service.state(), ServiceState::Disabled);
        service.restore_state().await.unwrap();
        assert_eq!(service.state(), ServiceState::Initialized);
    }

    #[tokio::test]
    async fn test_unavailable_service_is_never_enabled() {
        let (service, _, _) = service_with(
            MockBackend::new(SourceType::Local).unavailable(),
            ScriptedResolver::default(),
        );
        service.enable().await.unwrap();
        assert!(!service.is_enabled());
        assert_eq!(service.state(), ServiceState::Disabled);
    }

    #[tokio::test]
    async fn test_notify_updates_time_and_broadcasts() {
        let (service, _, _) =
            service_with(MockBackend::new(SourceType::Local), ScriptedResolver::default());
        let mut events = service.context().subscribe();

        service.notify(ServiceEvent::TimeUpdate(12.0));
        service.notify(ServiceEvent::Ended);

        assert_eq!(service.context().player().time, 12.0);
        let notice = events.recv().await.unwrap();
        assert_eq!(notice.event, ServiceEvent::Ended);
        assert_eq!(notice.source, SourceType::Local);
    }
}
