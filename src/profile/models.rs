//! User preference, activity and profile records.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::catalog::ArtistRef;

/// Kinds of activity the clients report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivityType {
    Search,
    Play,
    Skip,
    SearchClick,
}

impl ActivityType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActivityType::Search => "search",
            ActivityType::Play => "play",
            ActivityType::Skip => "skip",
            ActivityType::SearchClick => "search_click",
        }
    }
}

impl std::str::FromStr for ActivityType {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "search" => Ok(ActivityType::Search),
            "play" => Ok(ActivityType::Play),
            "skip" => Ok(ActivityType::Skip),
            "search_click" => Ok(ActivityType::SearchClick),
            _ => Err(()),
        }
    }
}

/// One entry of the append-only activity log under
/// `users/{uid}/activity`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivityEvent {
    #[serde(rename = "type")]
    pub kind: ActivityType,
    /// Millis since epoch.
    pub timestamp: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub song_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub song_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub artist: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub genre: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub query: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub skip_time: Option<f64>,
}

/// Stored user preferences. Older clients wrote the language list under
/// `preferred_language`; reads accept either key and writes emit both.
/// Both keys may be present in one record, so the legacy key is a
/// separate field folded in by [`UserPreferences::normalized`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserPreferences {
    #[serde(default)]
    pub uid: String,
    #[serde(default)]
    pub languages: Vec<String>,
    #[serde(default, rename = "preferred_language", skip_serializing)]
    pub preferred_language: Vec<String>,
    #[serde(default)]
    pub favorite_artists: Vec<ArtistRef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default)]
    pub created_at: i64,
    #[serde(default)]
    pub updated_at: i64,
}

impl UserPreferences {
    /// Fold the legacy `preferred_language` key into `languages`.
    pub fn normalized(mut self) -> Self {
        if self.languages.is_empty() && !self.preferred_language.is_empty() {
            self.languages = std::mem::take(&mut self.preferred_language);
        } else {
            self.preferred_language.clear();
        }
        self
    }
}

/// Partial preference update coming from the API.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PreferencesUpdate {
    pub languages: Option<Vec<String>>,
    pub favorite_artists: Option<Vec<ArtistRef>>,
}

impl PreferencesUpdate {
    pub fn is_empty(&self) -> bool {
        self.languages.is_none() && self.favorite_artists.is_none()
    }
}

/// ML-friendly per-song aggregate rebuilt from the activity log, stored
/// under `user_activity/{uid}/{songId}`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SongAggregate {
    #[serde(default)]
    pub play_count: u32,
    #[serde(default)]
    pub skip_count: u32,
    #[serde(default)]
    pub search_clicked: u32,
    #[serde(default)]
    pub last_played: i64,
    #[serde(default)]
    pub affinity: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub artist: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
}

impl SongAggregate {
    /// Affinity formula shared by every writer of the aggregate.
    pub fn recompute_affinity(&mut self) {
        self.affinity = self.play_count as f64 * 2.0 + self.search_clicked as f64 * 0.75
            - self.skip_count as f64 * 2.5;
    }
}

/// Transactional counters under `users/{uid}/search_history/{safeKey}`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchHistoryEntry {
    #[serde(default)]
    pub query: String,
    #[serde(default)]
    pub count: u32,
    #[serde(default)]
    pub last_searched: i64,
}

/// Transactional counters under `users/{uid}/listening_history/{songId}`
/// with a per-type last timestamp.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListeningHistoryEntry {
    #[serde(default)]
    pub play_count: u32,
    #[serde(default)]
    pub skip_count: u32,
    #[serde(default)]
    pub last_play: i64,
    #[serde(default)]
    pub last_skip: i64,
}

/// One song's interaction summary inside a [`RealtimeProfile`].
#[derive(Debug, Clone, Default)]
pub struct SongInteraction {
    pub play_count: u32,
    pub skip_count: u32,
    pub affinity: f64,
    pub last_played: i64,
    pub artist: Option<String>,
    pub language: Option<String>,
}

/// Maximum deduplicated search terms kept on a profile.
pub const MAX_PROFILE_SEARCH_TERMS: usize = 40;

/// Maximum most-recent song interactions kept on a profile.
pub const MAX_PROFILE_INTERACTIONS: usize = 500;

/// The on-demand taste profile the reranker consumes. Built from
/// preferences plus activity aggregates; cached by the reranker.
#[derive(Debug, Clone, Default)]
pub struct RealtimeProfile {
    pub languages: Vec<String>,
    pub language_affinity: HashMap<String, f64>,
    pub favorite_artists: Vec<String>,
    pub artist_affinity: HashMap<String, f64>,
    pub search_terms: Vec<String>,
    pub song_interactions: HashMap<String, SongInteraction>,
}
