//! Catalog API Data Transfer Objects
//!
//! These types mirror the JSON envelopes the catalog returns.
//! DO NOT use these types outside the catalog module - convert to domain
//! types in the adapter.
//!
//! Every resource list is paginated through `next`, a relative URL that is
//! present while more items exist.

use serde::{Deserialize, Serialize};

/// A page of resources.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ResourceList<T> {
    #[serde(default = "Vec::new")]
    pub data: Vec<T>,
    /// Relative URL of the next page
    pub next: Option<String>,
}

impl<T> Default for ResourceList<T> {
    fn default() -> Self {
        Self {
            data: Vec::new(),
            next: None,
        }
    }
}

/// `/v1/catalog/{storefront}/search`
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SearchResponse {
    #[serde(default)]
    pub results: SearchResults,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct SearchResults {
    /// Absent when nothing matched
    pub songs: Option<ResourceList<SongResource>>,
}

/// `/v1/catalog/{storefront}/search/hints`
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct HintsResponse {
    #[serde(default)]
    pub results: Hints,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Hints {
    #[serde(default)]
    pub terms: Vec<String>,
}

/// A catalog or library song.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SongResource {
    /// Numeric for catalog songs, `i.`-prefixed for library songs
    pub id: String,
    /// `songs` or `library-songs`
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub attributes: Option<SongAttributes>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SongAttributes {
    pub name: Option<String>,
    pub artist_name: Option<String>,
    pub album_name: Option<String>,
    pub duration_in_millis: Option<u64>,
    #[serde(default)]
    pub genre_names: Vec<String>,
    pub artwork: Option<ArtworkDto>,
    /// `explicit` or `clean`
    pub content_rating: Option<String>,
    /// Missing when the song cannot be played
    pub play_params: Option<PlayParams>,
    pub disc_number: Option<u32>,
    pub track_number: Option<u32>,
}

/// Artwork URL template with `{w}` and `{h}` placeholders.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ArtworkDto {
    pub url: String,
    pub width: Option<u32>,
    pub height: Option<u32>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayParams {
    pub id: String,
    pub kind: String,
    /// Catalog id of a library item
    pub catalog_id: Option<String>,
    pub is_library: Option<bool>,
}

/// A catalog or library artist.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ArtistResource {
    pub id: String,
    pub attributes: Option<ArtistAttributes>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ArtistAttributes {
    pub name: Option<String>,
    #[serde(default)]
    pub genre_names: Vec<String>,
    pub artwork: Option<ArtworkDto>,
}

/// A catalog or library album.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AlbumResource {
    /// Numeric for catalog albums, `l.`-prefixed for library albums
    pub id: String,
    pub attributes: Option<AlbumAttributes>,
    pub relationships: Option<AlbumRelationships>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AlbumAttributes {
    pub name: Option<String>,
    pub artist_name: Option<String>,
    pub artwork: Option<ArtworkDto>,
    pub track_count: Option<u32>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct AlbumRelationships {
    pub tracks: Option<ResourceList<SongResource>>,
}

/// A catalog or library playlist.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PlaylistResource {
    pub id: String,
    pub attributes: Option<PlaylistAttributes>,
    pub relationships: Option<PlaylistRelationships>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct PlaylistAttributes {
    pub name: Option<String>,
    pub description: Option<Description>,
    pub artwork: Option<ArtworkDto>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Description {
    pub standard: Option<String>,
    pub short: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct PlaylistRelationships {
    pub tracks: Option<ResourceList<SongResource>>,
}

/// Error envelope.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ApiErrorResponse {
    #[serde(default)]
    pub errors: Vec<ApiError>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ApiError {
    pub status: Option<String>,
    pub title: Option<String>,
    pub detail: Option<String>,
}

impl ApiErrorResponse {
    /// First error, as one line.
    pub fn message(&self) -> Option<String> {
        let error = self.errors.first()?;
        match (&error.title, &error.detail) {
            (Some(title), Some(detail)) => Some(format!("{title}: {detail}")),
            (Some(message), None) | (None, Some(message)) => Some(message.clone()),
            (None, None) => None,
        }
    }
}

// ============================================================================
// CONTRACT TESTS
// These verify our DTOs match what the catalog returns.
// ============================================================================
