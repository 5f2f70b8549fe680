//! Shared object cache.
//!
//! One entry per [`ItemKey`], kept in insertion (discovery) order. Inserting
//! an object whose key is already present overwrites the existing handle's
//! value in place, so every holder of that handle observes the update.

use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;

use super::{
    Album, ArtistPreview, Artist, ItemKey, ItemKind, Shared, SharedSong, Song, SourceType,
};

/// Objects the cache can hold.
pub trait Cacheable: Clone + Send + Sync + 'static {
    const KIND: ItemKind;

    fn source(&self) -> SourceType;

    fn id(&self) -> &str;

    fn cache_key(&self) -> ItemKey {
        ItemKey::new(self.source(), Self::KIND, self.id())
    }

    #[doc(hidden)]
    fn entries(cache: &ObjectCache) -> &RwLock<Entries<Self>>;
}

impl Cacheable for Song {
    const KIND: ItemKind = ItemKind::Song;

    fn source(&self) -> SourceType {
        Song::source(self)
    }

    fn id(&self) -> &str {
        &self.id
    }

    fn entries(cache: &ObjectCache) -> &RwLock<Entries<Self>> {
        &cache.songs
    }
}

impl Cacheable for Album {
    const KIND: ItemKind = ItemKind::Album;

    fn source(&self) -> SourceType {
        self.source
    }

    fn id(&self) -> &str {
        &self.id
    }

    fn entries(cache: &ObjectCache) -> &RwLock<Entries<Self>> {
        &cache.albums
    }
}

impl Cacheable for Artist {
    const KIND: ItemKind = ItemKind::Artist;

    fn source(&self) -> SourceType {
        self.source
    }

    fn id(&self) -> &str {
        &self.id
    }

    fn entries(cache: &ObjectCache) -> &RwLock<Entries<Self>> {
        &cache.artists
    }
}

#[doc(hidden)]
pub struct Entries<T> {
    order: Vec<ItemKey>,
    map: HashMap<ItemKey, Shared<T>>,
}

impl<T> Default for Entries<T> {
    fn default() -> Self {
        Self {
            order: Vec::new(),
            map: HashMap::new(),
        }
    }
}

/// Process-wide store of filled objects.
///
/// Constructed once and handed to services by `Arc`. The entry maps are
/// guarded by short-lived locks; a handle's own lock is only taken while
/// the map lock is held, never the other way around.
#[derive(Default)]
pub struct ObjectCache {
    songs: RwLock<Entries<Song>>,
    albums: RwLock<Entries<Album>>,
    artists: RwLock<Entries<Artist>>,
}

impl ObjectCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert an object, or overwrite the cached value in place.
    ///
    /// Returns the handle now stored under the object's key.
    pub fn insert<T: Cacheable>(&self, item: T) -> Shared<T> {
        let key = item.cache_key();
        let mut entries = T::entries(self).write();
        if let Some(existing) = entries.map.get(&key) {
            *existing.write() = item;
            return Arc::clone(existing);
        }

        let handle = Arc::new(RwLock::new(item));
        entries.order.push(key.clone());
        entries.map.insert(key, Arc::clone(&handle));
        handle
    }

    pub fn get<T: Cacheable>(&self, source: SourceType, id: &str) -> Option<Shared<T>> {
        self.get_by_key(&ItemKey::new(source, T::KIND, id))
    }

    pub fn get_by_key<T: Cacheable>(&self, key: &ItemKey) -> Option<Shared<T>> {
        T::entries(self).read().map.get(key).cloned()
    }

    pub fn contains<T: Cacheable>(&self, key: &ItemKey) -> bool {
        T::entries(self).read().map.contains_key(key)
    }

    /// Snapshot of every handle of one source, in insertion order.
    pub fn all<T: Cacheable>(&self, source: SourceType) -> Vec<Shared<T>> {
        let entries = T::entries(self).read();
        entries
            .order
            .iter()
            .filter(|key| key.source == source)
            .filter_map(|key| entries.map.get(key).cloned())
            .collect()
    }

    pub fn remove<T: Cacheable>(&self, key: &ItemKey) -> Option<Shared<T>> {
        let mut entries = T::entries(self).write();
        let removed = entries.map.remove(key)?;
        entries.order.retain(|k| k != key);
        Some(removed)
    }

    /// Evict every object of one source. Returns how many were removed.
    pub fn clear<T: Cacheable>(&self, source: SourceType) -> usize {
        let mut entries = T::entries(self).write();
        let before = entries.map.len();
        entries.map.retain(|key, _| key.source != source);
        entries.order.retain(|key| key.source != source);
        before - entries.map.len()
    }

    pub fn len<T: Cacheable>(&self, source: SourceType) -> usize {
        T::entries(self)
            .read()
            .order
            .iter()
            .filter(|key| key.source == source)
            .count()
    }

    /// Resolve an artist preview against cached artists.
    ///
    /// Falls back to the preview itself when the artist has no id or is
    /// not cached.
    pub fn fill_artist(&self, source: SourceType, preview: &ArtistPreview) -> ArtistPreview {
        preview
            .id
            .as_deref()
            .and_then(|id| self.get::<Artist>(source, id))
            .map(|artist| artist.read().preview())
            .unwrap_or_else(|| preview.clone())
    }

    /// Resolve an album's entries to song handles. Evicted songs are skipped.
    pub fn album_songs(&self, album: &Album) -> Vec<SharedSong> {
        let entries = self.songs.read();
        album
            .songs
            .iter()
            .filter_map(|entry| entries.map.get(&entry.song).cloned())
            .collect()
    }
}
