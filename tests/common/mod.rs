//! Shared test harness: an app wired with a mock catalog provider, the
//! in-memory tree store and the local token verifier, driven through
//! `tower::ServiceExt::oneshot`.

#![allow(dead_code)]

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use serde_json::Value;
use std::sync::Arc;
use tower::ServiceExt;

use tunehub_server::catalog::{
    AlbumRef, Artist, ArtistRef, Artists, BroadResults, CatalogProvider, PrimaryPage, Song,
    UpstreamError,
};
use tunehub_server::profile::{ProfileStore, TreeProfileStore};
use tunehub_server::server::{make_app, make_state, LocalTokenVerifier};
use tunehub_server::store::MemoryTreeStore;

/// Catalog stub: every song search returns the configured set; the
/// scorer decides what survives.
pub struct MockCatalog {
    pub songs: Vec<Song>,
}

#[async_trait]
impl CatalogProvider for MockCatalog {
    async fn primary_songs(&self, _query: &str, _page: u32) -> Result<PrimaryPage, UpstreamError> {
        Ok(PrimaryPage {
            start: 0,
            total: self.songs.len() as u32,
            songs: self.songs.clone(),
        })
    }

    async fn fallback_songs(&self, _query: &str) -> Result<Vec<Song>, UpstreamError> {
        Ok(Vec::new())
    }

    async fn broad_search(&self, _query: &str, _page: u32) -> Result<BroadResults, UpstreamError> {
        Ok(BroadResults::default())
    }

    async fn song_by_id(&self, id: &str) -> Result<Option<Song>, UpstreamError> {
        Ok(self.songs.iter().find(|s| s.id == id).cloned())
    }

    async fn album_by_id(&self, _id: &str) -> Result<Option<Value>, UpstreamError> {
        Ok(None)
    }

    async fn albums_by_query(&self, query: &str) -> Result<Value, UpstreamError> {
        Ok(serde_json::json!({"query": query, "results": []}))
    }

    async fn artists_by_query(&self, _query: &str) -> Result<Value, UpstreamError> {
        Ok(serde_json::json!({"results": []}))
    }

    async fn artists_by_language(&self, language: &str) -> Result<Vec<Artist>, UpstreamError> {
        Ok(vec![Artist {
            id: format!("{language}-artist"),
            name: format!("Top {language} Artist"),
            image_urls: vec![],
        }])
    }

    async fn artist_albums(
        &self,
        artist_id: &str,
        _limit: u32,
        _page: u32,
    ) -> Result<Value, UpstreamError> {
        Ok(serde_json::json!({"artistId": artist_id, "albums": []}))
    }
}

pub struct TestApp {
    pub app: Router,
    pub profiles: Arc<dyn ProfileStore>,
}

pub fn test_app(songs: Vec<Song>) -> TestApp {
    let provider = Arc::new(MockCatalog { songs });
    let profiles: Arc<dyn ProfileStore> =
        Arc::new(TreeProfileStore::new(Arc::new(MemoryTreeStore::new())));
    let state = make_state(provider, profiles.clone(), Arc::new(LocalTokenVerifier)).unwrap();
    TestApp {
        app: make_app(state),
        profiles,
    }
}

pub fn song(id: &str, name: &str, artist: &str, language: &str) -> Song {
    Song {
        id: id.into(),
        name: name.into(),
        language: language.into(),
        album: AlbumRef {
            id: format!("al-{id}"),
            name: format!("Album {id}"),
        },
        artists: Artists {
            primary: vec![ArtistRef {
                id: format!("ar-{id}"),
                name: artist.into(),
            }],
        },
        image_urls: vec![],
        download_urls: vec![],
        year: None,
        duration_sec: None,
        popularity: None,
        genre: None,
        ranking: None,
        next_reason: None,
    }
}

pub async fn request(
    app: &Router,
    method: &str,
    uri: &str,
    token: Option<&str>,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header("Authorization", format!("Bearer {token}"));
    }
    let request = match body {
        Some(value) => builder
            .header("content-type", "application/json")
            .body(Body::from(value.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(Value::Null)
    };
    (status, value)
}
