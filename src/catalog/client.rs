//! HTTP adapter for the upstream catalog providers.
//!
//! Two providers are spoken to: a primary catalog with paginated song
//! search and richer lookups, and a single-page fallback catalog with a
//! flat response shape. Every request is bounded by a per-class timeout
//! and cancelled when the calling future is dropped.

use async_trait::async_trait;
use futures::join;
use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

use super::models::{
    Artist, BroadResults, PrimaryPage, RawBroadPayload, RawFallbackSong, RawPrimaryPage,
    RawQualityUrl, Song,
};
use crate::catalog::models::QualityUrl;

/// Default timeout for primary song searches.
pub const PRIMARY_TIMEOUT_MS: u64 = 2200;
/// Default timeout for fallback searches.
pub const FALLBACK_TIMEOUT_MS: u64 = 1800;
/// Default timeout for catalog utility lookups.
pub const LOOKUP_TIMEOUT_MS: u64 = 1500;

/// Which upstream a failure originated from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Provider {
    Primary,
    Fallback,
}

impl std::fmt::Display for Provider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Provider::Primary => write!(f, "primary"),
            Provider::Fallback => write!(f, "fallback"),
        }
    }
}

/// Upstream failure, classified for the search engine's absorption
/// policy. Connection failures count as timeouts: either way the
/// provider was not reachable within the deadline.
#[derive(Debug, Clone, Error)]
pub enum UpstreamError {
    #[error("{provider} catalog timed out")]
    Timeout { provider: Provider },

    #[error("{provider} catalog returned status {status}")]
    Status { provider: Provider, status: u16 },

    #[error("{provider} catalog returned an unparseable payload: {detail}")]
    Parse { provider: Provider, detail: String },
}

impl UpstreamError {
    pub fn provider(&self) -> Provider {
        match self {
            UpstreamError::Timeout { provider }
            | UpstreamError::Status { provider, .. }
            | UpstreamError::Parse { provider, .. } => *provider,
        }
    }

    fn from_reqwest(provider: Provider, err: reqwest::Error) -> Self {
        if err.is_decode() {
            UpstreamError::Parse {
                provider,
                detail: err.to_string(),
            }
        } else {
            UpstreamError::Timeout { provider }
        }
    }
}

/// Seam between the smart search engine and the upstream catalogs.
///
/// The HTTP client below is the production implementation; tests
/// substitute their own.
#[async_trait]
pub trait CatalogProvider: Send + Sync {
    async fn primary_songs(&self, query: &str, page: u32) -> Result<PrimaryPage, UpstreamError>;

    /// The fallback catalog is single-page. Absence of results is not an
    /// error; an empty list is returned.
    async fn fallback_songs(&self, query: &str) -> Result<Vec<Song>, UpstreamError>;

    async fn broad_search(&self, query: &str, page: u32) -> Result<BroadResults, UpstreamError>;

    async fn song_by_id(&self, id: &str) -> Result<Option<Song>, UpstreamError>;

    async fn album_by_id(&self, id: &str) -> Result<Option<serde_json::Value>, UpstreamError>;

    async fn albums_by_query(&self, query: &str) -> Result<serde_json::Value, UpstreamError>;

    async fn artists_by_query(&self, query: &str) -> Result<serde_json::Value, UpstreamError>;

    /// Issues two parallel queries (`"Top <L> Artists"` and
    /// `"Popular <L> Artists"`) and merges the results by artist id.
    async fn artists_by_language(&self, language: &str) -> Result<Vec<Artist>, UpstreamError>;

    async fn artist_albums(
        &self,
        artist_id: &str,
        limit: u32,
        page: u32,
    ) -> Result<serde_json::Value, UpstreamError>;
}

/// HTTP client for the primary and fallback catalog providers.
pub struct HttpCatalogClient {
    primary_client: reqwest::Client,
    fallback_client: reqwest::Client,
    lookup_client: reqwest::Client,
    primary_base_url: String,
    fallback_base_url: String,
}

#[derive(Debug, Deserialize)]
struct RawArtistSearch {
    #[serde(default)]
    results: Vec<RawArtistRecord>,
}

#[derive(Debug, Deserialize)]
struct RawArtistRecord {
    id: Option<String>,
    name: Option<String>,
    #[serde(default)]
    image: Vec<RawQualityUrl>,
}

impl HttpCatalogClient {
    pub fn new(primary_base_url: &str, fallback_base_url: &str) -> anyhow::Result<Self> {
        Self::with_timeouts(
            primary_base_url,
            fallback_base_url,
            Duration::from_millis(PRIMARY_TIMEOUT_MS),
            Duration::from_millis(FALLBACK_TIMEOUT_MS),
            Duration::from_millis(LOOKUP_TIMEOUT_MS),
        )
    }

    pub fn with_timeouts(
        primary_base_url: &str,
        fallback_base_url: &str,
        primary_timeout: Duration,
        fallback_timeout: Duration,
        lookup_timeout: Duration,
    ) -> anyhow::Result<Self> {
        let build = |timeout: Duration| reqwest::Client::builder().timeout(timeout).build();

        Ok(Self {
            primary_client: build(primary_timeout)?,
            fallback_client: build(fallback_timeout)?,
            lookup_client: build(lookup_timeout)?,
            primary_base_url: primary_base_url.trim_end_matches('/').to_string(),
            fallback_base_url: fallback_base_url.trim_end_matches('/').to_string(),
        })
    }

    async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        client: &reqwest::Client,
        provider: Provider,
        url: &str,
        query: &[(&str, String)],
    ) -> Result<T, UpstreamError> {
        let response = client
            .get(url)
            .query(query)
            .send()
            .await
            .map_err(|e| UpstreamError::from_reqwest(provider, e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(UpstreamError::Status {
                provider,
                status: status.as_u16(),
            });
        }

        response
            .json()
            .await
            .map_err(|e| UpstreamError::from_reqwest(provider, e))
    }

    async fn artist_search_page(&self, query: &str) -> Result<Vec<RawArtistRecord>, UpstreamError> {
        let url = format!("{}/search/artists", self.primary_base_url);
        let page: RawArtistSearch = self
            .get_json(
                &self.lookup_client,
                Provider::Primary,
                &url,
                &[("query", query.to_string())],
            )
            .await?;
        Ok(page.results)
    }
}

fn map_artist(raw: RawArtistRecord) -> Option<Artist> {
    let id = raw.id.filter(|s| !s.trim().is_empty())?;
    let name = raw.name.filter(|s| !s.trim().is_empty())?;
    let image_urls = raw
        .image
        .into_iter()
        .filter_map(|u| {
            let url = u.url.filter(|s| !s.is_empty())?;
            Some(QualityUrl {
                quality: u.quality.unwrap_or_default(),
                url,
            })
        })
        .collect();
    Some(Artist {
        id,
        name,
        image_urls,
    })
}

#[async_trait]
impl CatalogProvider for HttpCatalogClient {
    async fn primary_songs(&self, query: &str, page: u32) -> Result<PrimaryPage, UpstreamError> {
        let url = format!("{}/search/songs", self.primary_base_url);
        let raw: RawPrimaryPage = self
            .get_json(
                &self.primary_client,
                Provider::Primary,
                &url,
                &[("query", query.to_string()), ("page", page.to_string())],
            )
            .await?;

        Ok(PrimaryPage {
            start: raw.start,
            total: raw.total,
            songs: raw.results.into_iter().filter_map(Song::from_primary).collect(),
        })
    }

    async fn fallback_songs(&self, query: &str) -> Result<Vec<Song>, UpstreamError> {
        let url = format!("{}/result.php", self.fallback_base_url);
        let result: Result<Vec<RawFallbackSong>, UpstreamError> = self
            .get_json(
                &self.fallback_client,
                Provider::Fallback,
                &url,
                &[("query", query.to_string())],
            )
            .await;

        match result {
            Ok(raw) => Ok(raw.into_iter().filter_map(Song::from_fallback).collect()),
            // The fallback signals absence with a 404; that is not a failure.
            Err(UpstreamError::Status { status: 404, .. }) => Ok(Vec::new()),
            Err(err) => Err(err),
        }
    }

    async fn broad_search(&self, query: &str, page: u32) -> Result<BroadResults, UpstreamError> {
        let url = format!("{}/search", self.primary_base_url);
        let raw: RawBroadPayload = self
            .get_json(
                &self.primary_client,
                Provider::Primary,
                &url,
                &[("query", query.to_string()), ("page", page.to_string())],
            )
            .await?;

        Ok(BroadResults {
            songs: raw
                .songs
                .results
                .into_iter()
                .filter_map(Song::from_primary)
                .collect(),
            albums: raw.albums.results,
            artists: raw.artists.results,
        })
    }

    async fn song_by_id(&self, id: &str) -> Result<Option<Song>, UpstreamError> {
        let url = format!("{}/songs/{}", self.primary_base_url, id);
        let result: Result<RawPrimaryPage, UpstreamError> = self
            .get_json(&self.lookup_client, Provider::Primary, &url, &[])
            .await;

        match result {
            Ok(raw) => Ok(raw.results.into_iter().find_map(Song::from_primary)),
            Err(UpstreamError::Status { status: 404, .. }) => Ok(None),
            Err(err) => Err(err),
        }
    }

    async fn album_by_id(&self, id: &str) -> Result<Option<serde_json::Value>, UpstreamError> {
        let url = format!("{}/albums", self.primary_base_url);
        let result: Result<serde_json::Value, UpstreamError> = self
            .get_json(
                &self.lookup_client,
                Provider::Primary,
                &url,
                &[("id", id.to_string())],
            )
            .await;

        match result {
            Ok(value) => Ok(Some(value)),
            Err(UpstreamError::Status { status: 404, .. }) => Ok(None),
            Err(err) => Err(err),
        }
    }

    async fn albums_by_query(&self, query: &str) -> Result<serde_json::Value, UpstreamError> {
        let url = format!("{}/search/albums", self.primary_base_url);
        self.get_json(
            &self.lookup_client,
            Provider::Primary,
            &url,
            &[("query", query.to_string())],
        )
        .await
    }

    async fn artists_by_query(&self, query: &str) -> Result<serde_json::Value, UpstreamError> {
        let url = format!("{}/search/artists", self.primary_base_url);
        self.get_json(
            &self.lookup_client,
            Provider::Primary,
            &url,
            &[("query", query.to_string())],
        )
        .await
    }

    async fn artists_by_language(&self, language: &str) -> Result<Vec<Artist>, UpstreamError> {
        let top_query = format!("Top {} Artists", language);
        let popular_query = format!("Popular {} Artists", language);
        let top = self.artist_search_page(&top_query);
        let popular = self.artist_search_page(&popular_query);
        let (top, popular) = join!(top, popular);

        // One failing leg is tolerated as long as the other produced data.
        let (top, popular) = match (top, popular) {
            (Err(a), Err(b)) => {
                debug!("both artist queries failed: {a}; {b}");
                return Err(a);
            }
            (a, b) => (a.unwrap_or_default(), b.unwrap_or_default()),
        };

        let mut merged: Vec<Artist> = Vec::new();
        for raw in top.into_iter().chain(popular) {
            if let Some(artist) = map_artist(raw) {
                if !merged.iter().any(|a| a.id == artist.id) {
                    merged.push(artist);
                }
            }
        }
        Ok(merged)
    }

    async fn artist_albums(
        &self,
        artist_id: &str,
        limit: u32,
        page: u32,
    ) -> Result<serde_json::Value, UpstreamError> {
        let url = format!("{}/artists/{}/albums", self.primary_base_url, artist_id);
        self.get_json(
            &self.lookup_client,
            Provider::Primary,
            &url,
            &[("limit", limit.to_string()), ("page", page.to_string())],
        )
        .await
    }
}
