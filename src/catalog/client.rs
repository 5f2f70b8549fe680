//! Catalog HTTP client
//!
//! Every request carries the developer token as a bearer token. Library
//! endpoints (`/v1/me/...`) additionally need the user token.
//! `{storefront}` in a path is replaced with the configured storefront.

use async_trait::async_trait;
use serde::de::DeserializeOwned;

use super::dto;
use crate::config::{CatalogConfig, Credentials};
use crate::error::CatalogError;

/// User agent sent with every request
const USER_AGENT: &str = concat!("Medley/", env!("CARGO_PKG_VERSION"));

/// Header carrying the user's authorization
const USER_TOKEN_HEADER: &str = "Music-User-Token";

/// Catalog requests the backend needs.
#[async_trait]
pub trait CatalogApi: Send + Sync {
    /// A developer token is configured.
    fn has_developer_token(&self) -> bool;

    /// The user has authorized access to their library.
    fn is_authorized(&self) -> bool;

    async fn search_songs(
        &self,
        term: &str,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<dto::SongResource>, CatalogError>;

    async fn search_hints(&self, term: &str) -> Result<Vec<String>, CatalogError>;

    async fn library_songs(
        &self,
        limit: usize,
        offset: usize,
    ) -> Result<dto::ResourceList<dto::SongResource>, CatalogError>;

    async fn library_artists(
        &self,
        limit: usize,
        offset: usize,
    ) -> Result<dto::ResourceList<dto::ArtistResource>, CatalogError>;

    /// A song by catalog id, or by library id when `library` is set.
    async fn song(&self, id: &str, library: bool)
    -> Result<Option<dto::SongResource>, CatalogError>;

    async fn artist(&self, id: &str) -> Result<Option<dto::ArtistResource>, CatalogError>;

    async fn artist_top_songs(&self, id: &str) -> Result<Vec<dto::SongResource>, CatalogError>;

    /// An album with its tracks, by catalog id or by library id when
    /// `library` is set.
    async fn album(&self, id: &str, library: bool)
    -> Result<Option<dto::AlbumResource>, CatalogError>;

    async fn playlist(
        &self,
        id: &str,
        library: bool,
    ) -> Result<Option<dto::PlaylistResource>, CatalogError>;
}

/// reqwest implementation of [`CatalogApi`].
pub struct CatalogClient {
    http_client: reqwest::Client,
    base_url: String,
    storefront: String,
    developer_token: Option<String>,
    user_token: Option<String>,
}

impl CatalogClient {
    pub fn new(config: &CatalogConfig, credentials: &Credentials) -> Result<Self, CatalogError> {
        let http_client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| CatalogError::Network(e.to_string()))?;

        Ok(Self {
            http_client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            storefront: config.storefront.clone(),
            developer_token: credentials
                .catalog_developer_token
                .clone()
                .filter(|t| !t.is_empty()),
            user_token: credentials
                .catalog_user_token
                .clone()
                .filter(|t| !t.is_empty()),
        })
    }

    fn url(&self, path: &str) -> String {
        format!(
            "{}{}",
            self.base_url,
            path.replace("{storefront}", &self.storefront)
        )
    }

    /// Send a GET request and parse the response
    async fn get<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<T, CatalogError> {
        let Some(developer_token) = &self.developer_token else {
            return Err(CatalogError::Unauthorized(
                "no developer token configured".to_string(),
            ));
        };

        let url = self.url(path);
        tracing::debug!(target: "catalog", url = %url, "GET");

        let mut request = self
            .http_client
            .get(&url)
            .bearer_auth(developer_token)
            .query(query);
        if let Some(user_token) = &self.user_token {
            request = request.header(USER_TOKEN_HEADER, user_token);
        }

        let response = request
            .send()
            .await
            .map_err(|e| CatalogError::Network(e.to_string()))?;

        let status = response.status();

        if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN
        {
            return Err(CatalogError::Unauthorized(format!("HTTP {status}")));
        }

        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(CatalogError::NotFound(path.to_string()));
        }

        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(CatalogError::RateLimited);
        }

        if !status.is_success() {
            // Try to parse error response
            if let Ok(error) = response.json::<dto::ApiErrorResponse>().await
                && let Some(message) = error.message()
            {
                return Err(CatalogError::Api(message));
            }
            return Err(CatalogError::Network(format!(
                "HTTP {}: {}",
                status,
                status.canonical_reason().unwrap_or("Unknown")
            )));
        }

        response
            .json::<T>()
            .await
            .map_err(|e| CatalogError::Parse(e.to_string()))
    }

    /// Like [`get`](Self::get), with a 404 meaning "no such item".
    async fn get_optional<T: DeserializeOwned>(
        &self,
        path: &str,
    ) -> Result<Option<T>, CatalogError> {
        match self.get::<dto::ResourceList<T>>(path, &[]).await {
            Ok(list) => Ok(list.data.into_iter().next()),
            Err(CatalogError::NotFound(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }
}

fn page_query(limit: usize, offset: usize) -> [(&'static str, String); 2] {
    [("limit", limit.to_string()), ("offset", offset.to_string())]
}

#[async_trait]
impl CatalogApi for CatalogClient {
    fn has_developer_token(&self) -> bool {
        self.developer_token.is_some()
    }

    fn is_authorized(&self) -> bool {
        self.developer_token.is_some() && self.user_token.is_some()
    }

    async fn search_songs(
        &self,
        term: &str,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<dto::SongResource>, CatalogError> {
        let [limit, offset] = page_query(limit, offset);
        let response: dto::SearchResponse = self
            .get(
                "/v1/catalog/{storefront}/search",
                &[
                    ("term", term.to_string()),
                    ("types", "songs".to_string()),
                    limit,
                    offset,
                ],
            )
            .await?;
        Ok(response.results.songs.map(|s| s.data).unwrap_or_default())
    }

    async fn search_hints(&self, term: &str) -> Result<Vec<String>, CatalogError> {
        let response: dto::HintsResponse = self
            .get(
                "/v1/catalog/{storefront}/search/hints",
                &[("term", term.to_string())],
            )
            .await?;
        Ok(response.results.terms)
    }

    async fn library_songs(
        &self,
        limit: usize,
        offset: usize,
    ) -> Result<dto::ResourceList<dto::SongResource>, CatalogError> {
        self.get("/v1/me/library/songs", &page_query(limit, offset))
            .await
    }

    async fn library_artists(
        &self,
        limit: usize,
        offset: usize,
    ) -> Result<dto::ResourceList<dto::ArtistResource>, CatalogError> {
        self.get("/v1/me/library/artists", &page_query(limit, offset))
            .await
    }

    async fn song(
        &self,
        id: &str,
        library: bool,
    ) -> Result<Option<dto::SongResource>, CatalogError> {
        let path = if library {
            format!("/v1/me/library/songs/{id}")
        } else {
            format!("/v1/catalog/{{storefront}}/songs/{id}")
        };
        self.get_optional(&path).await
    }

    async fn artist(&self, id: &str) -> Result<Option<dto::ArtistResource>, CatalogError> {
        self.get_optional(&format!("/v1/catalog/{{storefront}}/artists/{id}"))
            .await
    }

    async fn artist_top_songs(&self, id: &str) -> Result<Vec<dto::SongResource>, CatalogError> {
        let list: dto::ResourceList<dto::SongResource> = self
            .get(
                &format!("/v1/catalog/{{storefront}}/artists/{id}/view/top-songs"),
                &[],
            )
            .await?;
        Ok(list.data)
    }

    async fn album(
        &self,
        id: &str,
        library: bool,
    ) -> Result<Option<dto::AlbumResource>, CatalogError> {
        let path = if library {
            format!("/v1/me/library/albums/{id}?include=tracks")
        } else {
            format!("/v1/catalog/{{storefront}}/albums/{id}")
        };
        self.get_optional(&path).await
    }

    async fn playlist(
        &self,
        id: &str,
        library: bool,
    ) -> Result<Option<dto::PlaylistResource>, CatalogError> {
        let path = if library {
            format!("/v1/me/library/playlists/{id}?include=tracks")
        } else {
            format!("/v1/catalog/{{storefront}}/playlists/{id}")
        };
        self.get_optional(&path).await
    }
}
