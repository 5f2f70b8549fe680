//! Album reconciliation.
//!
//! Local albums are derived from song tags. A song joins every cached album
//! with the same title that shares at least one artist with it; otherwise
//! it starts a new album. Albums survive a refresh, only their membership
//! is recomputed, so album handles held elsewhere stay valid.

use std::collections::HashSet;

use crate::model::{Album, AlbumSong, ArtistPreview, ObjectCache, SharedAlbum, Song, SourceType};

/// Recompute local album membership from the cached local songs.
///
/// Run after discovery has completed. Membership is computed on working
/// copies and written back at the end without suspending, so readers see
/// either the old or the new album set.
pub fn reconcile_albums(cache: &ObjectCache) -> Vec<SharedAlbum> {
    let existing = cache.all::<Album>(SourceType::Local);
    let mut working: Vec<Album> = existing
        .iter()
        .map(|album| {
            let mut album = album.read().clone();
            album.songs.clear();
            album
        })
        .collect();

    for song in cache.all::<Song>(SourceType::Local) {
        let song = song.read();
        let Some(title) = song.album.as_deref().filter(|t| !t.is_empty()) else {
            continue;
        };

        let artists = filled_titles(cache, &song.artists);
        let (disc_number, track_number) = song.position();
        let entry = AlbumSong {
            song: song.key(),
            disc_number,
            track_number,
        };

        let mut matched = false;
        for album in working.iter_mut().filter(|album| album.title == title) {
            let album_artists = filled_titles(cache, &album.artists);
            if album_artists.iter().any(|a| artists.contains(a)) {
                album.songs.push(entry.clone());
                matched = true;
            }
        }

        if !matched {
            working.push(Album {
                source: SourceType::Local,
                id: uuid::Uuid::new_v4().to_string(),
                title: title.to_string(),
                songs: vec![entry],
                artists: song.artists.clone(),
                artwork: song.artwork.clone(),
            });
        }
    }

    let (kept, empty): (Vec<Album>, Vec<Album>) =
        working.into_iter().partition(|album| !album.songs.is_empty());

    for album in &empty {
        cache.remove::<Album>(&album.key());
    }
    for mut album in kept {
        album.songs.sort_by_key(AlbumSong::order);
        cache.insert(album);
    }

    let albums = cache.all::<Album>(SourceType::Local);
    tracing::info!(
        target: "local::albums",
        albums = albums.len(),
        dropped = empty.len(),
        "Reconciled albums"
    );
    albums
}

/// Artist titles after resolving previews against cached artists.
fn filled_titles(cache: &ObjectCache, artists: &[ArtistPreview]) -> HashSet<String> {
    artists
        .iter()
        .map(|artist| cache.fill_artist(SourceType::Local, artist).title)
        .collect()
}
