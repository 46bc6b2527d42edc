//! User preference and activity routes.

use axum::extract::{Path, Query, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::json;

use super::auth::Session;
use super::error::ApiError;
use super::state::AppState;
use crate::profile::{ActivityEvent, ActivityType, PreferencesUpdate};

const HISTORY_DEFAULT_LIMIT: usize = 50;
const HISTORY_MAX_LIMIT: usize = 200;

async fn save_preferences(
    session: Session,
    State(state): State<AppState>,
    Json(update): Json<PreferencesUpdate>,
) -> Result<Json<serde_json::Value>, ApiError> {
    if update.is_empty() {
        return Err(ApiError::InvalidInput(
            "at least one of languages or favoriteArtists is required".to_string(),
        ));
    }

    let saved = state.profiles.save_preferences(session.uid(), update).await?;
    // Search resolves languages through a short-lived cache; a
    // preference change must not serve the old list for its TTL.
    state.languages.invalidate(session.uid());

    Ok(Json(json!({
        "success": true,
        "message": "preferences saved",
        "data": saved,
    })))
}

async fn get_preferences(
    session: Session,
    State(state): State<AppState>,
) -> Result<Json<serde_json::Value>, ApiError> {
    match state.profiles.preferences(session.uid()).await? {
        Some(preferences) => Ok(Json(json!({"success": true, "data": preferences}))),
        None => Err(ApiError::NotFound(
            "no preferences saved yet; POST /api/user/preferences first".to_string(),
        )),
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ActivityBody {
    song_id: Option<String>,
    song_name: Option<String>,
    artist: Option<String>,
    language: Option<String>,
    genre: Option<String>,
    query: Option<String>,
    duration: Option<f64>,
    skip_time: Option<f64>,
}

async fn log_activity(
    session: Session,
    State(state): State<AppState>,
    Path(kind): Path<String>,
    Json(body): Json<ActivityBody>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let kind: ActivityType = kind
        .parse()
        .map_err(|_| ApiError::InvalidInput(format!("unknown activity type \"{kind}\"")))?;

    if matches!(kind, ActivityType::Play | ActivityType::Skip)
        && body.song_id.as_deref().map_or(true, |s| s.trim().is_empty())
    {
        return Err(ApiError::InvalidInput(format!(
            "songId is required for {} events",
            kind.as_str()
        )));
    }
    if kind == ActivityType::Search
        && body.query.as_deref().map_or(true, |q| q.trim().is_empty())
    {
        return Err(ApiError::InvalidInput(
            "query is required for search events".to_string(),
        ));
    }

    let event = ActivityEvent {
        kind,
        timestamp: chrono::Utc::now().timestamp_millis(),
        song_id: body.song_id,
        song_name: body.song_name,
        artist: body.artist,
        language: body.language.map(|l| l.to_lowercase()),
        genre: body.genre,
        query: body.query,
        duration: body.duration,
        skip_time: body.skip_time,
    };

    let id = state.profiles.log_event(session.uid(), event.clone()).await?;
    Ok(Json(json!({
        "success": true,
        "data": {"id": id, "event": event},
    })))
}

#[derive(Debug, Deserialize)]
struct HistoryParams {
    #[serde(rename = "type")]
    kind: Option<String>,
    limit: Option<usize>,
}

async fn activity_history(
    session: Session,
    State(state): State<AppState>,
    Query(params): Query<HistoryParams>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let kind = match params.kind.as_deref() {
        Some(raw) => Some(raw.parse::<ActivityType>().map_err(|_| {
            ApiError::InvalidInput(format!("unknown activity type \"{raw}\""))
        })?),
        None => None,
    };
    let limit = params
        .limit
        .unwrap_or(HISTORY_DEFAULT_LIMIT)
        .clamp(1, HISTORY_MAX_LIMIT);

    let events = state.profiles.recent_events(session.uid(), kind, limit).await?;
    Ok(Json(json!({"success": true, "data": events})))
}

pub fn make_user_routes(state: AppState) -> Router {
    Router::new()
        .route("/user/preferences", post(save_preferences))
        .route("/user/preferences", get(get_preferences))
        .route("/activity/{type}", post(log_activity))
        .route("/activity/history", get(activity_history))
        .with_state(state)
}
