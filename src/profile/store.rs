//! Preference and activity persistence over the key-value tree.
//!
//! The append-only activity log is the durable anchor: its write must
//! succeed. The derived nodes (search history, song aggregate,
//! listening history and the liked/skipped projections) are caches
//! rebuilt from it; their writes run concurrently and failures are
//! logged, never surfaced.

use async_trait::async_trait;
use serde_json::{json, Map, Value};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::warn;

use super::models::{
    ActivityEvent, ActivityType, ListeningHistoryEntry, PreferencesUpdate, RealtimeProfile,
    SearchHistoryEntry, SongAggregate, SongInteraction, UserPreferences,
    MAX_PROFILE_INTERACTIONS, MAX_PROFILE_SEARCH_TERMS,
};
use crate::store::{safe_key, StoreError, TreeStore};

fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

fn to_value<T: serde::Serialize>(value: &T) -> Result<Value, StoreError> {
    serde_json::to_value(value).map_err(|e| StoreError::Backend(e.to_string()))
}

/// Read side the reranker and recommendation generator depend on, plus
/// the write paths for preferences and activity.
#[async_trait]
pub trait ProfileStore: Send + Sync {
    async fn preferences(&self, uid: &str) -> Result<Option<UserPreferences>, StoreError>;

    async fn save_preferences(
        &self,
        uid: &str,
        update: PreferencesUpdate,
    ) -> Result<UserPreferences, StoreError>;

    /// Append an activity event; returns the push id of the log entry.
    async fn log_event(&self, uid: &str, event: ActivityEvent) -> Result<String, StoreError>;

    /// Most recent events, newest first, optionally filtered by type.
    async fn recent_events(
        &self,
        uid: &str,
        kind: Option<ActivityType>,
        limit: usize,
    ) -> Result<Vec<ActivityEvent>, StoreError>;

    /// Artists ranked by play count, from the per-song aggregates.
    async fn top_played_artists(
        &self,
        uid: &str,
        limit: usize,
    ) -> Result<Vec<(String, u32)>, StoreError>;

    /// Song ids of the most recent events of one type, newest first,
    /// deduplicated.
    async fn recent_song_ids(
        &self,
        uid: &str,
        kind: ActivityType,
        limit: usize,
    ) -> Result<Vec<String>, StoreError>;

    async fn realtime_profile(&self, uid: &str) -> Result<RealtimeProfile, StoreError>;
}

/// [`ProfileStore`] implementation over a [`TreeStore`].
pub struct TreeProfileStore {
    store: Arc<dyn TreeStore>,
}

impl TreeProfileStore {
    pub fn new(store: Arc<dyn TreeStore>) -> Self {
        Self { store }
    }

    fn user_path(uid: &str) -> String {
        format!("users/{}", safe_key(uid))
    }

    async fn update_search_history(&self, uid: &str, event: &ActivityEvent) -> Result<(), StoreError> {
        let Some(query) = event.query.as_ref().filter(|q| !q.trim().is_empty()) else {
            return Ok(());
        };
        let path = format!("{}/search_history/{}", Self::user_path(uid), safe_key(query));
        let query = query.clone();
        let timestamp = event.timestamp;
        self.store
            .transaction(
                &path,
                Box::new(move |current| {
                    let mut entry: SearchHistoryEntry = current
                        .and_then(|v| serde_json::from_value(v).ok())
                        .unwrap_or_default();
                    entry.query = query.clone();
                    entry.count += 1;
                    entry.last_searched = timestamp;
                    serde_json::to_value(&entry).ok()
                }),
            )
            .await
    }

    async fn update_song_aggregate(&self, uid: &str, event: &ActivityEvent) -> Result<(), StoreError> {
        let Some(song_id) = event.song_id.as_ref() else {
            return Ok(());
        };
        let path = format!("user_activity/{}/{}", safe_key(uid), safe_key(song_id));
        let kind = event.kind;
        let timestamp = event.timestamp;
        let artist = event.artist.clone();
        let language = event.language.clone();
        self.store
            .transaction(
                &path,
                Box::new(move |current| {
                    let mut aggregate: SongAggregate = current
                        .and_then(|v| serde_json::from_value(v).ok())
                        .unwrap_or_default();
                    match kind {
                        ActivityType::Play => {
                            aggregate.play_count += 1;
                            aggregate.last_played = timestamp;
                        }
                        ActivityType::Skip => aggregate.skip_count += 1,
                        ActivityType::SearchClick => aggregate.search_clicked += 1,
                        ActivityType::Search => {}
                    }
                    if artist.is_some() {
                        aggregate.artist = artist.clone();
                    }
                    if language.is_some() {
                        aggregate.language = language.clone();
                    }
                    aggregate.recompute_affinity();
                    serde_json::to_value(&aggregate).ok()
                }),
            )
            .await
    }

    async fn update_listening_history(
        &self,
        uid: &str,
        event: &ActivityEvent,
    ) -> Result<(), StoreError> {
        let Some(song_id) = event.song_id.as_ref() else {
            return Ok(());
        };
        if !matches!(event.kind, ActivityType::Play | ActivityType::Skip) {
            return Ok(());
        }

        let path = format!(
            "{}/listening_history/{}",
            Self::user_path(uid),
            safe_key(song_id)
        );
        let kind = event.kind;
        let timestamp = event.timestamp;
        self.store
            .transaction(
                &path,
                Box::new(move |current| {
                    let mut entry: ListeningHistoryEntry = current
                        .and_then(|v| serde_json::from_value(v).ok())
                        .unwrap_or_default();
                    match kind {
                        ActivityType::Play => {
                            entry.play_count += 1;
                            entry.last_play = timestamp;
                        }
                        ActivityType::Skip => {
                            entry.skip_count += 1;
                            entry.last_skip = timestamp;
                        }
                        _ => {}
                    }
                    serde_json::to_value(&entry).ok()
                }),
            )
            .await?;

        // Liked / skipped projections piggyback on the same branch.
        let projection = match event.kind {
            ActivityType::Play => "liked_songs",
            ActivityType::Skip => "skipped_songs",
            _ => return Ok(()),
        };
        let projection_path = format!(
            "{}/{}/{}",
            Self::user_path(uid),
            projection,
            safe_key(song_id)
        );
        self.store
            .set(
                &projection_path,
                json!({
                    "songName": event.song_name,
                    "artist": event.artist,
                    "language": event.language,
                    "timestamp": timestamp,
                }),
            )
            .await
    }

    async fn song_aggregates(&self, uid: &str) -> Result<HashMap<String, SongAggregate>, StoreError> {
        let path = format!("user_activity/{}", safe_key(uid));
        let Some(value) = self.store.get(&path).await? else {
            return Ok(HashMap::new());
        };
        let Some(children) = value.as_object() else {
            return Ok(HashMap::new());
        };
        Ok(children
            .iter()
            .filter_map(|(song_id, v)| {
                serde_json::from_value::<SongAggregate>(v.clone())
                    .ok()
                    .map(|aggregate| (song_id.clone(), aggregate))
            })
            .collect())
    }
}

#[async_trait]
impl ProfileStore for TreeProfileStore {
    async fn preferences(&self, uid: &str) -> Result<Option<UserPreferences>, StoreError> {
        let Some(value) = self.store.get(&Self::user_path(uid)).await? else {
            return Ok(None);
        };
        let preferences: UserPreferences = serde_json::from_value::<UserPreferences>(value)
            .map_err(|e| StoreError::Backend(e.to_string()))?
            .normalized();
        // A bare subtree (activity only, no saved preferences) does not
        // count as having preferences.
        if preferences.languages.is_empty() && preferences.favorite_artists.is_empty() {
            return Ok(None);
        }
        Ok(Some(preferences))
    }

    async fn save_preferences(
        &self,
        uid: &str,
        update: PreferencesUpdate,
    ) -> Result<UserPreferences, StoreError> {
        let existing = self.preferences(uid).await?.unwrap_or_default();
        let now = now_millis();

        let merged = UserPreferences {
            uid: uid.to_string(),
            languages: update
                .languages
                .map(|langs| {
                    langs
                        .into_iter()
                        .map(|l| l.trim().to_lowercase())
                        .filter(|l| !l.is_empty())
                        .collect()
                })
                .unwrap_or(existing.languages),
            preferred_language: Vec::new(),
            favorite_artists: update.favorite_artists.unwrap_or(existing.favorite_artists),
            display_name: existing.display_name,
            email: existing.email,
            created_at: if existing.created_at > 0 {
                existing.created_at
            } else {
                now
            },
            updated_at: now,
        };

        let mut fields = match to_value(&merged)? {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        // Backward compatibility: older clients read the language list
        // under `preferred_language`.
        fields.insert(
            "preferred_language".to_string(),
            to_value(&merged.languages)?,
        );
        self.store.update(&Self::user_path(uid), fields).await?;
        Ok(merged)
    }

    async fn log_event(&self, uid: &str, event: ActivityEvent) -> Result<String, StoreError> {
        let path = format!("{}/activity", Self::user_path(uid));
        let push_id = self.store.push(&path, to_value(&event)?).await?;

        // Derived nodes update concurrently through independent
        // transactions; the log append above is the durable anchor.
        let (search, aggregate, listening) = tokio::join!(
            self.update_search_history(uid, &event),
            self.update_song_aggregate(uid, &event),
            self.update_listening_history(uid, &event),
        );
        for (name, result) in [
            ("search_history", search),
            ("song_aggregate", aggregate),
            ("listening_history", listening),
        ] {
            if let Err(err) = result {
                warn!("derived {name} update failed for uid {uid}: {err}");
            }
        }

        Ok(push_id)
    }

    async fn recent_events(
        &self,
        uid: &str,
        kind: Option<ActivityType>,
        limit: usize,
    ) -> Result<Vec<ActivityEvent>, StoreError> {
        let path = format!("{}/activity", Self::user_path(uid));
        let Some(value) = self.store.get(&path).await? else {
            return Ok(Vec::new());
        };
        let Some(children) = value.as_object() else {
            return Ok(Vec::new());
        };

        // Push keys sort chronologically; walk newest first.
        Ok(children
            .values()
            .rev()
            .filter_map(|v| serde_json::from_value::<ActivityEvent>(v.clone()).ok())
            .filter(|event| kind.map_or(true, |k| event.kind == k))
            .take(limit)
            .collect())
    }

    async fn top_played_artists(
        &self,
        uid: &str,
        limit: usize,
    ) -> Result<Vec<(String, u32)>, StoreError> {
        let aggregates = self.song_aggregates(uid).await?;

        let mut counts: HashMap<String, u32> = HashMap::new();
        for aggregate in aggregates.values() {
            if let Some(artist) = aggregate.artist.as_ref().filter(|a| !a.is_empty()) {
                *counts.entry(artist.clone()).or_default() += aggregate.play_count;
            }
        }

        let mut ranked: Vec<(String, u32)> = counts.into_iter().collect();
        ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        ranked.truncate(limit);
        Ok(ranked)
    }

    async fn recent_song_ids(
        &self,
        uid: &str,
        kind: ActivityType,
        limit: usize,
    ) -> Result<Vec<String>, StoreError> {
        let events = self.recent_events(uid, Some(kind), limit * 2).await?;
        let mut ids = Vec::new();
        for event in events {
            if let Some(song_id) = event.song_id {
                if !ids.contains(&song_id) {
                    ids.push(song_id);
                    if ids.len() == limit {
                        break;
                    }
                }
            }
        }
        Ok(ids)
    }

    async fn realtime_profile(&self, uid: &str) -> Result<RealtimeProfile, StoreError> {
        let preferences = self.preferences(uid).await?.unwrap_or_default();

        let mut interactions: Vec<(String, SongAggregate)> =
            self.song_aggregates(uid).await?.into_iter().collect();
        interactions.sort_by(|a, b| b.1.last_played.cmp(&a.1.last_played));
        interactions.truncate(MAX_PROFILE_INTERACTIONS);

        let mut language_affinity: HashMap<String, f64> = HashMap::new();
        let mut artist_affinity: HashMap<String, f64> = HashMap::new();
        let mut song_interactions: HashMap<String, SongInteraction> = HashMap::new();
        for (song_id, aggregate) in interactions {
            if let Some(language) = aggregate.language.as_ref().filter(|l| !l.is_empty()) {
                *language_affinity.entry(language.to_lowercase()).or_default() +=
                    aggregate.affinity;
            }
            if let Some(artist) = aggregate.artist.as_ref().filter(|a| !a.is_empty()) {
                *artist_affinity.entry(artist.clone()).or_default() += aggregate.affinity;
            }
            song_interactions.insert(
                song_id,
                SongInteraction {
                    play_count: aggregate.play_count,
                    skip_count: aggregate.skip_count,
                    affinity: aggregate.affinity,
                    last_played: aggregate.last_played,
                    artist: aggregate.artist,
                    language: aggregate.language,
                },
            );
        }

        let search_path = format!("{}/search_history", Self::user_path(uid));
        let mut history: Vec<SearchHistoryEntry> = match self.store.get(&search_path).await? {
            Some(Value::Object(children)) => children
                .into_iter()
                .filter_map(|(_, v)| serde_json::from_value(v).ok())
                .collect(),
            _ => Vec::new(),
        };
        history.sort_by(|a, b| b.last_searched.cmp(&a.last_searched));

        let mut search_terms = Vec::new();
        for entry in history {
            let term = entry.query.trim().to_lowercase();
            if !term.is_empty() && !search_terms.contains(&term) {
                search_terms.push(term);
                if search_terms.len() == MAX_PROFILE_SEARCH_TERMS {
                    break;
                }
            }
        }

        Ok(RealtimeProfile {
            languages: preferences
                .languages
                .iter()
                .map(|l| l.to_lowercase())
                .collect(),
            language_affinity,
            favorite_artists: preferences
                .favorite_artists
                .into_iter()
                .map(|a| a.name)
                .collect(),
            artist_affinity,
            search_terms,
            song_interactions,
        })
    }
}
