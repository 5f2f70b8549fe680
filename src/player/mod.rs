//! Now-playing coordination over the registered services.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                            Player                               │
//! │     Owns the play queue, follows its current song around        │
//! └────────────────────────────┬────────────────────────────────────┘
//!                              │ change_song / play / initialize
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                 MusicService owning the song                    │
//! │        Stops its peers before it starts playing                 │
//! └────────────────────────────┬────────────────────────────────────┘
//!                              │ Notice (Ended)
//!                              ▼
//!                      Player::handle_event
//! ```
//!
//! Whenever the current song of the queue changes, the service owning it
//! adopts the song. The very first adoption only initializes the service;
//! every later one starts playback.

mod queue;

pub use queue::PlayQueue;

use parking_lot::Mutex;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::error::Result;
use crate::model::SharedSong;
use crate::registry::ServiceRegistry;
use crate::service::{MusicService, Notice, ServiceContext, ServiceEvent};

/// The play queue and the service currently playing from it.
pub struct Player {
    registry: Arc<ServiceRegistry>,
    queue: Mutex<PlayQueue>,
    /// Set once the first current song was adopted
    autoplay: AtomicBool,
}

impl Player {
    pub fn new(registry: Arc<ServiceRegistry>) -> Self {
        Self {
            registry,
            queue: Mutex::new(PlayQueue::new()),
            autoplay: AtomicBool::new(false),
        }
    }

    pub fn registry(&self) -> &Arc<ServiceRegistry> {
        &self.registry
    }

    pub fn context(&self) -> &Arc<ServiceContext> {
        self.registry.context()
    }

    /// Snapshot of the queue.
    pub fn queue(&self) -> PlayQueue {
        self.queue.lock().clone()
    }

    pub fn current(&self) -> Option<SharedSong> {
        self.queue.lock().current().cloned()
    }

    /// The enabled service owning the current song.
    pub fn current_service(&self) -> Option<Arc<MusicService>> {
        let source = self.current()?.read().source();
        self.registry.service(source)
    }

    pub fn has_next(&self) -> bool {
        self.queue.lock().has_next()
    }

    pub fn has_previous(&self) -> bool {
        self.queue.lock().has_previous()
    }

    // ------------------------------------------------------------------
    // Queue
    // ------------------------------------------------------------------

    /// Apply `change` to the queue, persist it and follow a new current
    /// song.
    async fn update_queue(&self, change: impl FnOnce(&mut PlayQueue)) -> Result<()> {
        let (changed, record) = {
            let mut queue = self.queue.lock();
            let before = queue.current().cloned();
            change(&mut queue);
            let after = queue.current();
            let changed = match (&before, after) {
                (Some(before), Some(after)) => !Arc::ptr_eq(before, after),
                (None, None) => false,
                _ => true,
            };
            (changed, queue.to_record())
        };

        if let Err(e) = self.context().store.save_queue(&record) {
            tracing::warn!(target: "player", error = %e, "Failed to persist queue");
        }

        if changed {
            self.sync_current().await?;
        }
        Ok(())
    }

    /// Insert `song` at `at`, or append it.
    pub async fn add(&self, song: SharedSong, at: Option<usize>) -> Result<()> {
        self.update_queue(|queue| queue.add(song, at)).await
    }

    pub async fn remove(&self, index: usize) -> Result<()> {
        self.update_queue(|queue| {
            queue.remove(index);
        })
        .await
    }

    pub async fn move_item(&self, from: usize, to: usize) -> Result<()> {
        self.update_queue(|queue| queue.move_item(from, to)).await
    }

    pub async fn clear(&self) -> Result<()> {
        self.update_queue(PlayQueue::clear).await
    }

    /// Make the song at `index` current.
    pub async fn select(&self, index: usize) -> Result<()> {
        self.update_queue(|queue| {
            queue.select(index);
        })
        .await
    }

    pub async fn skip_next(&self) -> Result<()> {
        self.update_queue(|queue| {
            queue.skip_next();
        })
        .await
    }

    pub async fn skip_previous(&self) -> Result<()> {
        self.update_queue(|queue| {
            queue.skip_previous();
        })
        .await
    }

    /// Hand the current song to the service owning it.
    ///
    /// The first call only initializes that service; later calls play.
    /// An empty queue stops every service.
    pub async fn sync_current(&self) -> Result<()> {
        let Some(song) = self.current() else {
            tracing::debug!(target: "player", "Queue has no current song, stopping services");
            return self.registry.stop_services(None).await;
        };

        let (source, title) = {
            let song = song.read();
            (song.source(), song.title.clone())
        };
        let Some(service) = self.registry.service(source) else {
            tracing::warn!(target: "player", %source, song = %title, "No enabled service for song");
            return Ok(());
        };

        tracing::debug!(target: "player", service = %service.name(), song = %title, "Changing song");
        service.change_song(song).await?;

        if self.autoplay.swap(true, Ordering::SeqCst) {
            service.play().await
        } else {
            service.initialize().await
        }
    }

    /// Rebuild the queue from the persisted record.
    ///
    /// Keys that no longer resolve are dropped. Returns the number of
    /// restored songs.
    pub async fn restore_queue(&self) -> Result<usize> {
        let Some(record) = self.context().store.queue() else {
            return Ok(0);
        };

        let mut songs = Vec::with_capacity(record.songs.len());
        let mut index = record.index;
        for (position, key) in record.songs.iter().enumerate() {
            match self.registry.get_song(key).await {
                Ok(Some(song)) => songs.push(song),
                result => {
                    if let Err(e) = result {
                        tracing::warn!(target: "player", %key, error = %e, "Dropping queued song");
                    } else {
                        tracing::warn!(target: "player", %key, "Queued song no longer exists");
                    }
                    if position < record.index {
                        index = index.saturating_sub(1);
                    }
                }
            }
        }

        let restored = songs.len();
        tracing::info!(target: "player", restored, dropped = record.songs.len() - restored, "Restored queue");
        *self.queue.lock() = PlayQueue::from_songs(songs, index);

        if restored > 0 {
            self.sync_current().await?;
        }
        Ok(restored)
    }

    // ------------------------------------------------------------------
    // Transport
    // ------------------------------------------------------------------

    pub async fn play(&self) -> Result<()> {
        match self.current_service() {
            Some(service) => service.play().await,
            None => Ok(()),
        }
    }

    pub async fn pause(&self) -> Result<()> {
        match self.current_service() {
            Some(service) => service.pause().await,
            None => Ok(()),
        }
    }

    pub async fn toggle_play(&self) -> Result<()> {
        match self.current_service() {
            Some(service) => service.toggle_play().await,
            None => Ok(()),
        }
    }

    /// Seek to a fraction of the current song's duration.
    pub async fn seek_progress(&self, fraction: f64) -> Result<()> {
        let Some(service) = self.current_service() else {
            return Ok(());
        };
        let duration = self.context().player().duration;
        service
            .seek_to_time(fraction.clamp(0.0, 1.0) * duration)
            .await
    }

    pub async fn set_volume(&self, level: f64) -> Result<()> {
        self.registry.set_volume(level).await
    }

    // ------------------------------------------------------------------
    // Events
    // ------------------------------------------------------------------

    /// React to a playback notification. The end of the current song
    /// advances the queue.
    pub async fn handle_event(&self, notice: Notice) -> Result<()> {
        if notice.event != ServiceEvent::Ended {
            return Ok(());
        }

        let from_current = self
            .current()
            .is_some_and(|song| song.read().source() == notice.source);
        if !from_current {
            return Ok(());
        }

        tracing::debug!(target: "player", source = %notice.source, "Song ended");
        self.skip_next().await
    }

    /// Feed every service notice into [`handle_event`](Self::handle_event)
    /// until `cancel` fires.
    pub fn follow_events(self: &Arc<Self>, cancel: CancellationToken) -> JoinHandle<()> {
        let mut events = self.context().subscribe();
        let player = Arc::clone(self);

        tokio::spawn(async move {
            loop {
                let notice = tokio::select! {
                    _ = cancel.cancelled() => break,
                    notice = events.recv() => notice,
                };

                match notice {
                    Ok(notice) => {
                        if let Err(e) = player.handle_event(notice).await {
                            tracing::warn!(target: "player", error = %e, "Failed to handle playback event");
                        }
                    }
                    Err(RecvError::Lagged(missed)) => {
                        tracing::warn!(target: "player", missed, "Dropped playback events");
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        })
    }
}
