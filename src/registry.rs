//! Orchestrator over the registered music services.
//!
//! Holds one [`MusicService`] per [`SourceType`] and fans library and search
//! requests out to every enabled service that supports them. Results are
//! merged in registry order (local before catalog).

use futures::stream::{self, StreamExt};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use crate::error::{Error, Result};
use crate::model::{ItemKey, SharedSong, SourceType};
use crate::service::{
    AlbumStream, Capabilities, MusicBackend, MusicService, ServiceContext, SongStream,
};

/// The set of music services sharing one [`ServiceContext`].
pub struct ServiceRegistry {
    context: Arc<ServiceContext>,
    services: BTreeMap<SourceType, Arc<MusicService>>,
}

impl ServiceRegistry {
    pub fn new(context: Arc<ServiceContext>) -> Self {
        Self {
            context,
            services: BTreeMap::new(),
        }
    }

    pub fn context(&self) -> &Arc<ServiceContext> {
        &self.context
    }

    /// Wrap `backend` in a service and register it under its source.
    pub fn register(&mut self, backend: Arc<dyn MusicBackend>) -> Arc<MusicService> {
        let service = MusicService::new(backend, Arc::clone(&self.context));
        tracing::debug!(target: "registry", service = %service.name(), source = %service.source(), "Registered");
        self.services.insert(service.source(), Arc::clone(&service));
        service
    }

    /// The service for `source`, if registered, whatever its state.
    pub fn get(&self, source: SourceType) -> Option<&Arc<MusicService>> {
        self.services.get(&source)
    }

    /// The service for `source`, only if it is enabled.
    pub fn service(&self, source: SourceType) -> Option<Arc<MusicService>> {
        self.services
            .get(&source)
            .filter(|service| service.is_enabled())
            .cloned()
    }

    pub fn registered(&self) -> impl Iterator<Item = &Arc<MusicService>> {
        self.services.values()
    }

    pub fn enabled_services(&self) -> Vec<Arc<MusicService>> {
        self.services
            .values()
            .filter(|service| service.is_enabled())
            .cloned()
            .collect()
    }

    fn supporting(&self, capability: Capabilities) -> Vec<Arc<MusicService>> {
        self.enabled_services()
            .into_iter()
            .filter(|service| service.supports(capability))
            .collect()
    }

    /// Re-apply every service's persisted enabled flag.
    ///
    /// A service that fails to come back is logged and left disabled.
    pub async fn restore_all(&self) {
        for service in self.services.values() {
            if let Err(e) = service.restore_state().await {
                tracing::warn!(target: "registry", service = %service.name(), error = %e, "Failed to restore service");
            }
        }
    }

    /// Stop every enabled service except `except`, one after the other.
    pub async fn stop_services(&self, except: Option<SourceType>) -> Result<()> {
        for service in self.enabled_services() {
            if Some(service.source()) == except {
                continue;
            }
            service.stop().await?;
        }
        Ok(())
    }

    pub async fn search_songs(
        &self,
        term: &str,
        page: usize,
        cancel: CancellationToken,
    ) -> SongStream {
        let mut streams = Vec::new();
        for service in self.supporting(Capabilities::SEARCH) {
            match service.search_songs(term, page, cancel.clone()).await {
                Ok(songs) => streams.push(songs),
                Err(e) => skip(&service, "searchSongs", &e),
            }
        }
        stream::iter(streams).flatten().boxed()
    }

    /// Hints of every service, without duplicates.
    pub async fn search_hints(&self, term: &str) -> Vec<String> {
        let mut hints: Vec<String> = Vec::new();
        for service in self.supporting(Capabilities::SEARCH_HINTS) {
            match service.search_hints(term).await {
                Ok(found) => {
                    for hint in found {
                        if !hints.contains(&hint) {
                            hints.push(hint);
                        }
                    }
                }
                Err(e) => skip(&service, "getSearchHints", &e),
            }
        }
        hints
    }

    pub async fn library_songs(&self, cancel: CancellationToken) -> SongStream {
        let mut streams = Vec::new();
        for service in self.supporting(Capabilities::LIBRARY_SONGS) {
            match service.library_songs(cancel.clone()).await {
                Ok(songs) => streams.push(songs),
                Err(e) => skip(&service, "getLibrarySongs", &e),
            }
        }
        stream::iter(streams).flatten().boxed()
    }

    pub async fn library_albums(&self, cancel: CancellationToken) -> AlbumStream {
        let mut streams = Vec::new();
        for service in self.supporting(Capabilities::LIBRARY_ALBUMS) {
            match service.library_albums(cancel.clone()).await {
                Ok(albums) => streams.push(albums),
                Err(e) => skip(&service, "getLibraryAlbums", &e),
            }
        }
        stream::iter(streams).flatten().boxed()
    }

    pub async fn refresh_library_songs(&self) {
        for service in self.supporting(Capabilities::LIBRARY_SONGS) {
            if let Err(e) = service.refresh_library_songs().await {
                skip(&service, "refreshLibrarySongs", &e);
            }
        }
    }

    pub async fn refresh_library_albums(&self) {
        for service in self.supporting(Capabilities::LIBRARY_ALBUMS) {
            if let Err(e) = service.refresh_library_albums().await {
                skip(&service, "refreshLibraryAlbums", &e);
            }
        }
    }

    /// Look up a song through the service owning its source.
    pub async fn get_song(&self, key: &ItemKey) -> Result<Option<SharedSong>> {
        let service = self.owner(key.source)?;
        service.get_song(&key.id).await
    }

    /// Refresh a song through the service owning it.
    pub async fn refresh_song(&self, song: &SharedSong) -> Result<Option<SharedSong>> {
        let source = song.read().source();
        self.owner(source)?.refresh_song(song).await
    }

    fn owner(&self, source: SourceType) -> Result<Arc<MusicService>> {
        self.service(source)
            .ok_or_else(|| Error::not_found(format!("enabled {source} service")))
    }

    /// Set the volume of every enabled service and persist it.
    pub async fn set_volume(&self, level: f64) -> Result<()> {
        let level = level.clamp(0.0, 1.0);
        for service in self.enabled_services() {
            service.set_volume(level).await?;
        }
        self.context.update_player(|player| player.volume = level);
        self.context.store.save_volume(level)
    }
}

fn skip(service: &MusicService, operation: &str, error: &Error) {
    tracing::warn!(
        target: "registry",
        service = %service.name(),
        operation,
        error = %error,
        "Skipping service"
    );
}
