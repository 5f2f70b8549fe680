//! Adapter layer: Convert catalog DTOs to domain models
//!
//! This is the ONLY place where DTO types are converted to domain types.

use super::dto;
use crate::model::{
    Album, AlbumSong, Artist, ArtistPreview, Artwork, Playlist, Song, SongData, SongPreview,
    SourceType,
};

/// Edge length requested from artwork templates.
pub const ARTWORK_SIZE: u32 = 256;

/// Catalog ids are numeric; library ids are not.
pub fn is_catalog_id(id: &str) -> bool {
    !id.is_empty() && id.bytes().all(|b| b.is_ascii_digit())
}

/// Fill an artwork URL template.
pub fn artwork_url(artwork: &dto::ArtworkDto, size: u32) -> String {
    let size = size.to_string();
    artwork
        .url
        .replace("{w}", &size)
        .replace("{h}", &size)
        .replace("{c}", "")
        .replace("{f}", "jpg")
}

fn to_artwork(artwork: Option<&dto::ArtworkDto>) -> Option<Artwork> {
    artwork.map(|a| Artwork::Remote {
        url: artwork_url(a, ARTWORK_SIZE),
    })
}

/// Convert a song resource. Resources without attributes are unusable.
pub fn to_song(resource: dto::SongResource) -> Option<Song> {
    let attributes = resource.attributes?;

    let catalog_id = if is_catalog_id(&resource.id) {
        Some(resource.id.clone())
    } else {
        attributes
            .play_params
            .as_ref()
            .and_then(|p| p.catalog_id.clone())
    };

    Some(Song {
        title: attributes.name.unwrap_or_else(|| resource.id.clone()),
        id: resource.id,
        album: attributes.album_name,
        duration: attributes
            .duration_in_millis
            .map(|ms| ms as f64 / 1000.0),
        genres: attributes.genre_names,
        explicit: attributes.content_rating.as_deref() == Some("explicit"),
        available: attributes.play_params.is_some(),
        artists: attributes
            .artist_name
            .map(ArtistPreview::named)
            .into_iter()
            .collect(),
        artwork: to_artwork(attributes.artwork.as_ref()),
        data: SongData::Catalog { catalog_id },
    })
}

/// Whether a song resource can be played.
pub fn is_playable(resource: &dto::SongResource) -> bool {
    resource
        .attributes
        .as_ref()
        .is_some_and(|a| a.play_params.is_some())
}

pub fn to_artist(resource: dto::ArtistResource) -> Option<Artist> {
    let attributes = resource.attributes?;
    Some(Artist {
        source: SourceType::Catalog,
        title: attributes.name.unwrap_or_else(|| resource.id.clone()),
        id: resource.id,
        genres: attributes.genre_names,
        artwork: to_artwork(attributes.artwork.as_ref()),
    })
}

/// Convert an album together with its track songs.
///
/// Entries are ordered by disc and track. An album without usable tracks
/// converts to `None`.
pub fn to_album(resource: dto::AlbumResource) -> Option<(Album, Vec<Song>)> {
    let attributes = resource.attributes?;
    let tracks = resource
        .relationships
        .and_then(|r| r.tracks)
        .map(|tracks| tracks.data)
        .unwrap_or_default();

    let mut songs = Vec::with_capacity(tracks.len());
    let mut entries = Vec::with_capacity(tracks.len());
    for track in tracks {
        let (disc_number, track_number) = track
            .attributes
            .as_ref()
            .map(|a| (a.disc_number, a.track_number))
            .unwrap_or_default();
        if let Some(song) = to_song(track) {
            entries.push(AlbumSong {
                song: song.key(),
                disc_number,
                track_number,
            });
            songs.push(song);
        }
    }
    if entries.is_empty() {
        return None;
    }
    entries.sort_by_key(AlbumSong::order);

    let album = Album {
        source: SourceType::Catalog,
        title: attributes.name.unwrap_or_else(|| resource.id.clone()),
        id: resource.id,
        songs: entries,
        artists: attributes
            .artist_name
            .map(ArtistPreview::named)
            .into_iter()
            .collect(),
        artwork: to_artwork(attributes.artwork.as_ref()),
    };
    Some((album, songs))
}

/// Convert a playlist; its tracks become previews.
pub fn to_playlist(resource: dto::PlaylistResource) -> Playlist {
    let attributes = resource.attributes.unwrap_or_default();
    let songs = resource
        .relationships
        .and_then(|r| r.tracks)
        .map(|tracks| tracks.data)
        .unwrap_or_default()
        .into_iter()
        .filter_map(to_song)
        .map(|song| SongPreview::from(&song))
        .collect();

    Playlist {
        source: SourceType::Catalog,
        title: attributes.name.unwrap_or_else(|| resource.id.clone()),
        id: resource.id,
        description: attributes.description.and_then(|d| d.standard.or(d.short)),
        artwork: to_artwork(attributes.artwork.as_ref()),
        songs,
    }
}

/// Playlist id from a share URL: its last path segment.
pub fn playlist_id_from_url(url: &str) -> Option<String> {
    let path = url.split(['?', '#']).next()?;
    let segment = path.rsplit('/').find(|s| !s.is_empty())?;
    let decoded = urlencoding::decode(segment).ok()?;
    Some(decoded.into_owned())
}
