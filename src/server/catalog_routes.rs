//! Catalog lookup routes: thin passthroughs over the upstream adapter.

use axum::extract::{Path, Query, State};
use axum::routing::get;
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;

use super::error::ApiError;
use super::state::AppState;
use crate::catalog::CatalogProvider;

const MAX_ARTIST_ALBUMS_LIMIT: u32 = 50;
const DEFAULT_ARTIST_ALBUMS_LIMIT: u32 = 10;

async fn get_song(
    State(provider): State<Arc<dyn CatalogProvider>>,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    match provider.song_by_id(&id).await? {
        Some(song) => Ok(Json(json!({"success": true, "data": song}))),
        None => Err(ApiError::NotFound(format!("song {id} not found"))),
    }
}

#[derive(Debug, Deserialize)]
struct AlbumsParams {
    id: Option<String>,
    query: Option<String>,
}

async fn get_albums(
    State(provider): State<Arc<dyn CatalogProvider>>,
    Query(params): Query<AlbumsParams>,
) -> Result<Json<serde_json::Value>, ApiError> {
    match (params.id, params.query) {
        (Some(id), None) => match provider.album_by_id(&id).await? {
            Some(album) => Ok(Json(album)),
            None => Err(ApiError::NotFound(format!("album {id} not found"))),
        },
        (None, Some(query)) if !query.trim().is_empty() => {
            Ok(Json(provider.albums_by_query(query.trim()).await?))
        }
        _ => Err(ApiError::InvalidInput(
            "exactly one of id or query is required".to_string(),
        )),
    }
}

#[derive(Debug, Deserialize)]
struct ByLanguageParams {
    language: Option<String>,
}

async fn artists_by_language(
    State(provider): State<Arc<dyn CatalogProvider>>,
    Query(params): Query<ByLanguageParams>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let language = params
        .language
        .as_deref()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .ok_or_else(|| ApiError::InvalidInput("language parameter is required".to_string()))?;

    let artists = provider.artists_by_language(language).await?;
    Ok(Json(json!({
        "success": true,
        "count": artists.len(),
        "data": artists,
    })))
}

#[derive(Debug, Deserialize)]
struct ArtistAlbumsParams {
    limit: Option<u32>,
    page: Option<u32>,
}

async fn artist_albums(
    State(provider): State<Arc<dyn CatalogProvider>>,
    Path(id): Path<String>,
    Query(params): Query<ArtistAlbumsParams>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let limit = params
        .limit
        .unwrap_or(DEFAULT_ARTIST_ALBUMS_LIMIT)
        .clamp(1, MAX_ARTIST_ALBUMS_LIMIT);
    let page = params.page.unwrap_or(1).max(1);
    Ok(Json(provider.artist_albums(&id, limit, page).await?))
}

pub fn make_catalog_routes(state: AppState) -> Router {
    Router::new()
        .route("/songs/{id}", get(get_song))
        .route("/albums", get(get_albums))
        .route("/artists/by-language", get(artists_by_language))
        .route("/artists/{id}/albums", get(artist_albums))
        .with_state(state)
}
