use parking_lot::RwLock;
use std::sync::{Arc, Weak};
use tokio::sync::broadcast;

use super::recovery::ErrorResolver;
use super::state::{LoadingGuard, Notice, PlayerState};
use super::MusicService;
use crate::model::ObjectCache;
use crate::store::StateStore;

/// Collaborators shared by every service.
///
/// Built once at startup and handed to each [`MusicService`].
pub struct ServiceContext {
    pub cache: Arc<ObjectCache>,
    pub resolver: Arc<dyn ErrorResolver>,
    pub store: Arc<dyn StateStore>,
    player: RwLock<PlayerState>,
    peers: RwLock<Vec<Weak<MusicService>>>,
    events: broadcast::Sender<Notice>,
}

impl ServiceContext {
    pub fn new(
        cache: Arc<ObjectCache>,
        resolver: Arc<dyn ErrorResolver>,
        store: Arc<dyn StateStore>,
    ) -> Arc<Self> {
        let volume = store.volume().unwrap_or(1.0).clamp(0.0, 1.0);
        let (events, _) = broadcast::channel(64);
        Arc::new(Self {
            cache,
            resolver,
            store,
            player: RwLock::new(PlayerState {
                volume,
                ..PlayerState::default()
            }),
            peers: RwLock::new(Vec::new()),
            events,
        })
    }

    pub fn player(&self) -> PlayerState {
        self.player.read().clone()
    }

    pub fn volume(&self) -> f64 {
        self.player.read().volume
    }

    pub(crate) fn update_player(&self, update: impl FnOnce(&mut PlayerState)) {
        update(&mut self.player.write());
    }

    pub(crate) fn begin_loading(&self) -> LoadingGuard<'_> {
        LoadingGuard::new(&self.player)
    }

    pub(crate) fn add_peer(&self, service: &Arc<MusicService>) {
        let mut peers = self.peers.write();
        peers.retain(|peer| peer.strong_count() > 0);
        peers.push(Arc::downgrade(service));
    }

    /// Live services sharing this context, in registration order.
    pub fn peers(&self) -> Vec<Arc<MusicService>> {
        self.peers.read().iter().filter_map(Weak::upgrade).collect()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Notice> {
        self.events.subscribe()
    }

    pub(crate) fn emit(&self, notice: Notice) {
        // No subscribers is fine
        let _ = self.events.send(notice);
    }
}
