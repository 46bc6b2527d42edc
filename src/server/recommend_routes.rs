//! Recommendation routes: the general personalized feed and the
//! next-track continuation endpoint.

use axum::extract::{Query, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::json;

use super::auth::Session;
use super::error::ApiError;
use super::state::AppState;
use crate::catalog::{AlbumRef, Artists, Song};

const RECOMMEND_DEFAULT_LIMIT: usize = 50;
const RECOMMEND_MAX_LIMIT: usize = 100;
const NEXT_DEFAULT_LIMIT: usize = 10;
const NEXT_MAX_LIMIT: usize = 20;

#[derive(Debug, Deserialize)]
struct RecommendParams {
    limit: Option<usize>,
}

async fn recommendations(
    session: Session,
    State(state): State<AppState>,
    Query(params): Query<RecommendParams>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let limit = params
        .limit
        .unwrap_or(RECOMMEND_DEFAULT_LIMIT)
        .clamp(1, RECOMMEND_MAX_LIMIT);

    let preferences = state
        .profiles
        .preferences(session.uid())
        .await?
        .ok_or_else(|| {
            ApiError::NotFound(
                "no preferences saved yet; POST /api/user/preferences to get recommendations"
                    .to_string(),
            )
        })?;

    let songs = state
        .recommendations
        .generate(session.uid(), &preferences, limit)
        .await;

    Ok(Json(json!({
        "success": true,
        "count": songs.len(),
        "data": songs,
    })))
}

/// The client sends whatever metadata it has about the playing song;
/// thin records are enriched server-side.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CurrentSongBody {
    id: String,
    #[serde(default)]
    name: String,
    #[serde(default)]
    language: String,
    #[serde(default)]
    album: AlbumRef,
    #[serde(default)]
    artists: Artists,
    #[serde(default)]
    genre: Option<String>,
    #[serde(default)]
    year: Option<i32>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct NextTrackBody {
    current_song: Option<CurrentSongBody>,
    limit: Option<usize>,
}

async fn next_track(
    session: Session,
    State(state): State<AppState>,
    Json(body): Json<NextTrackBody>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let current = body
        .current_song
        .filter(|s| !s.id.trim().is_empty())
        .ok_or_else(|| {
            ApiError::InvalidInput("currentSong with a non-empty id is required".to_string())
        })?;
    let limit = body
        .limit
        .unwrap_or(NEXT_DEFAULT_LIMIT)
        .clamp(1, NEXT_MAX_LIMIT);

    let current = Song {
        id: current.id,
        name: current.name,
        language: current.language.to_lowercase(),
        album: current.album,
        artists: current.artists,
        image_urls: vec![],
        download_urls: vec![],
        year: current.year,
        duration_sec: None,
        popularity: None,
        genre: current.genre,
        ranking: None,
        next_reason: None,
    };

    let songs = state
        .recommendations
        .next_track(session.uid(), current, limit)
        .await;

    Ok(Json(json!({
        "success": true,
        "count": songs.len(),
        "data": songs,
    })))
}

pub fn make_recommend_routes(state: AppState) -> Router {
    Router::new()
        .route("/recommendations", get(recommendations))
        .route("/recommendations/next", post(next_track))
        .with_state(state)
}
