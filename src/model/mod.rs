//! Core data models shared by every music source.
//!
//! Defines the primary entities: [`Song`], [`SongPreview`], [`Album`],
//! [`AlbumPreview`], [`Artist`] and [`Playlist`]. Every entity is tagged with the
//! [`SourceType`] of the backend that produced it; `(source, kind, id)`
//! is its identity, see [`ItemKey`].
//!
//! Filled objects live in the [`ObjectCache`] behind [`Shared`] handles so
//! that a refresh is observed by every holder (queue, now playing, albums).

mod cache;

pub use cache::{Cacheable, ObjectCache};

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

/// Shared, mutable handle to a cached object.
pub type Shared<T> = Arc<RwLock<T>>;

pub type SharedSong = Shared<Song>;
pub type SharedAlbum = Shared<Album>;
pub type SharedArtist = Shared<Artist>;

/// The backend an object belongs to.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum SourceType {
    /// Files on the local file system
    Local,
    /// Streaming catalog
    Catalog,
}

impl SourceType {
    pub const ALL: [SourceType; 2] = [SourceType::Local, SourceType::Catalog];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Local => "local",
            Self::Catalog => "catalog",
        }
    }
}

impl fmt::Display for SourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SourceType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "local" => Ok(Self::Local),
            "catalog" => Ok(Self::Catalog),
            other => Err(format!("unknown source '{other}' (expected local or catalog)")),
        }
    }
}

/// The kind of a cached object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemKind {
    Song,
    Album,
    Artist,
    Playlist,
}

impl ItemKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Song => "song",
            Self::Album => "album",
            Self::Artist => "artist",
            Self::Playlist => "playlist",
        }
    }
}

/// Identity of an object: a pure function of `(source, kind, id)`.
///
/// Albums refer to their songs through keys instead of handles, so an
/// evicted song simply stops resolving.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ItemKey {
    pub source: SourceType,
    pub kind: ItemKind,
    pub id: String,
}

impl ItemKey {
    pub fn new(source: SourceType, kind: ItemKind, id: impl Into<String>) -> Self {
        Self {
            source,
            kind,
            id: id.into(),
        }
    }

    pub fn song(source: SourceType, id: impl Into<String>) -> Self {
        Self::new(source, ItemKind::Song, id)
    }
}

impl fmt::Display for ItemKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.source, self.kind.as_str(), self.id)
    }
}

/// Reference to cover art.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Artwork {
    /// Stored in the local artwork store under this id
    Local { id: String },
    /// Hosted remotely
    Remote { url: String },
}

/// A possibly unfilled artist reference.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtistPreview {
    pub id: Option<String>,
    pub title: String,
}

impl ArtistPreview {
    pub fn named(title: impl Into<String>) -> Self {
        Self {
            id: None,
            title: title.into(),
        }
    }
}

/// A filled artist.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Artist {
    pub source: SourceType,
    pub id: String,
    pub title: String,
    pub genres: Vec<String>,
    pub artwork: Option<Artwork>,
}

impl Artist {
    pub fn key(&self) -> ItemKey {
        ItemKey::new(self.source, ItemKind::Artist, self.id.clone())
    }

    pub fn preview(&self) -> ArtistPreview {
        ArtistPreview {
            id: Some(self.id.clone()),
            title: self.title.clone(),
        }
    }
}

/// Backend specific song payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum SongData {
    Local {
        path: String,
        disc_number: Option<u32>,
        track_number: Option<u32>,
    },
    Catalog {
        /// Catalog id of a library song, when the catalog knows it
        catalog_id: Option<String>,
    },
}

/// A filled song.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Song {
    pub id: String,
    pub title: String,
    pub album: Option<String>,
    /// Duration in seconds
    pub duration: Option<f64>,
    pub genres: Vec<String>,
    pub explicit: bool,
    pub available: bool,
    pub artists: Vec<ArtistPreview>,
    pub artwork: Option<Artwork>,
    pub data: SongData,
}

impl Song {
    pub fn source(&self) -> SourceType {
        match self.data {
            SongData::Local { .. } => SourceType::Local,
            SongData::Catalog { .. } => SourceType::Catalog,
        }
    }

    pub fn key(&self) -> ItemKey {
        ItemKey::song(self.source(), self.id.clone())
    }

    /// Local file path, if this is a local song.
    pub fn path(&self) -> Option<&str> {
        match &self.data {
            SongData::Local { path, .. } => Some(path),
            SongData::Catalog { .. } => None,
        }
    }

    /// `(disc, track)` numbers, if known.
    pub fn position(&self) -> (Option<u32>, Option<u32>) {
        match &self.data {
            SongData::Local {
                disc_number,
                track_number,
                ..
            } => (*disc_number, *track_number),
            SongData::Catalog { .. } => (None, None),
        }
    }

    /// Artist titles joined for display.
    pub fn artist_line(&self) -> String {
        self.artists
            .iter()
            .map(|a| a.title.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    }
}

/// A partially populated song, as returned by searches.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SongPreview {
    pub source: SourceType,
    pub id: Option<String>,
    pub title: Option<String>,
    pub album: Option<String>,
    pub duration: Option<f64>,
    pub genres: Vec<String>,
    pub explicit: Option<bool>,
    pub available: Option<bool>,
    pub artists: Vec<ArtistPreview>,
    pub artwork: Option<Artwork>,
    /// Local file path hint
    pub path: Option<String>,
}

impl SongPreview {
    pub fn empty(source: SourceType) -> Self {
        Self {
            source,
            id: None,
            title: None,
            album: None,
            duration: None,
            genres: Vec::new(),
            explicit: None,
            available: None,
            artists: Vec::new(),
            artwork: None,
            path: None,
        }
    }
}

impl From<&Song> for SongPreview {
    fn from(song: &Song) -> Self {
        Self {
            source: song.source(),
            id: Some(song.id.clone()),
            title: Some(song.title.clone()),
            album: song.album.clone(),
            duration: song.duration,
            genres: song.genres.clone(),
            explicit: Some(song.explicit),
            available: Some(song.available),
            artists: song.artists.clone(),
            artwork: song.artwork.clone(),
            path: song.path().map(str::to_string),
        }
    }
}

/// An album entry, referring to its song by key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlbumSong {
    pub song: ItemKey,
    pub disc_number: Option<u32>,
    pub track_number: Option<u32>,
}

impl AlbumSong {
    /// Sort key; missing numbers sort as 0.
    pub fn order(&self) -> (u32, u32) {
        (
            self.disc_number.unwrap_or(0),
            self.track_number.unwrap_or(0),
        )
    }
}

/// An album.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Album {
    pub source: SourceType,
    pub id: String,
    pub title: String,
    pub songs: Vec<AlbumSong>,
    pub artists: Vec<ArtistPreview>,
    pub artwork: Option<Artwork>,
}

impl Album {
    pub fn key(&self) -> ItemKey {
        ItemKey::new(self.source, ItemKind::Album, self.id.clone())
    }

    /// Whether any artist appears on both albums, by exact title.
    pub fn shares_artist(&self, artists: &[ArtistPreview]) -> bool {
        self.artists
            .iter()
            .any(|a| artists.iter().any(|b| a.title == b.title))
    }
}

/// A partially populated album, as returned by searches.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlbumPreview {
    pub source: SourceType,
    pub id: Option<String>,
    pub title: Option<String>,
    pub artists: Vec<ArtistPreview>,
    pub artwork: Option<Artwork>,
}

impl AlbumPreview {
    pub fn empty(source: SourceType) -> Self {
        Self {
            source,
            id: None,
            title: None,
            artists: Vec::new(),
            artwork: None,
        }
    }
}

impl From<&Album> for AlbumPreview {
    fn from(album: &Album) -> Self {
        Self {
            source: album.source,
            id: Some(album.id.clone()),
            title: Some(album.title.clone()),
            artists: album.artists.clone(),
            artwork: album.artwork.clone(),
        }
    }
}

/// A playlist. Tracks stay previews until resolved.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Playlist {
    pub source: SourceType,
    pub id: String,
    pub title: String,
    pub description: Option<String>,
    pub artwork: Option<Artwork>,
    pub songs: Vec<SongPreview>,
}
