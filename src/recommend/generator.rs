//! General-mode recommendations: seed queries synthesized from
//! preferences and activity, candidates collected through smart search,
//! rule scoring, then a reranker pass blended back in.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use futures::future::join_all;
use tracing::{debug, warn};

use crate::catalog::{CatalogProvider, Song};
use crate::profile::{ActivityEvent, ActivityType, ProfileStore, UserPreferences};
use crate::ranking::{Reranker, RerankOptions};
use crate::search::{SearchOptions, SmartSearchEngine};

/// Maximum seed queries fanned out per request.
pub const MAX_SEED_QUERIES: usize = 15;

/// Candidates kept after rule scoring, before the reranker pass.
pub const PRE_RERANK_CAP: usize = 100;

const RULE_BASE: f64 = 10.0;
const RULE_FAVORITE_ARTIST: f64 = 30.0;
const RULE_PLAY_COUNT_SCALE: f64 = 5.0;
const RULE_SKIPPED: f64 = -100.0;
const RULE_PREFERRED_LANGUAGE: f64 = 10.0;

pub struct RecommendationEngine {
    search: SmartSearchEngine,
    provider: Arc<dyn CatalogProvider>,
    profiles: Arc<dyn ProfileStore>,
    reranker: Arc<Reranker>,
}

impl RecommendationEngine {
    pub fn new(
        search: SmartSearchEngine,
        provider: Arc<dyn CatalogProvider>,
        profiles: Arc<dyn ProfileStore>,
        reranker: Arc<Reranker>,
    ) -> Self {
        Self {
            search,
            provider,
            profiles,
            reranker,
        }
    }

    pub(crate) fn provider(&self) -> &Arc<dyn CatalogProvider> {
        &self.provider
    }

    pub(crate) fn profiles(&self) -> &Arc<dyn ProfileStore> {
        &self.profiles
    }

    pub(crate) fn search(&self) -> &SmartSearchEngine {
        &self.search
    }

    pub(crate) fn reranker(&self) -> &Arc<Reranker> {
        &self.reranker
    }

    /// Build a personalized recommendation list of at most `limit`
    /// songs. Aggregate reads and individual seed searches degrade
    /// softly: a failing piece is logged and skipped.
    pub async fn generate(
        &self,
        uid: &str,
        preferences: &UserPreferences,
        limit: usize,
    ) -> Vec<Song> {
        let (top_artists, skipped_ids, search_events, play_events) = tokio::join!(
            self.profiles.top_played_artists(uid, 10),
            self.profiles.recent_song_ids(uid, ActivityType::Skip, 100),
            self.profiles.recent_events(uid, Some(ActivityType::Search), 10),
            self.profiles.recent_events(uid, Some(ActivityType::Play), 20),
        );
        let top_artists = top_artists.unwrap_or_else(|e| {
            warn!("top played artists unavailable for {uid}: {e}");
            Vec::new()
        });
        let skipped_ids = skipped_ids.unwrap_or_else(|e| {
            warn!("recent skips unavailable for {uid}: {e}");
            Vec::new()
        });
        let search_events = search_events.unwrap_or_else(|e| {
            warn!("recent searches unavailable for {uid}: {e}");
            Vec::new()
        });
        let play_events = play_events.unwrap_or_else(|e| {
            warn!("recent plays unavailable for {uid}: {e}");
            Vec::new()
        });

        let seeds = build_seed_queries(preferences, &top_artists, &search_events, &play_events);
        debug!("recommendation seeds for {uid}: {seeds:?}");

        let options = SearchOptions {
            wait_for_fresh: false,
            preferred_languages: preferences.languages.clone(),
        };
        let results = join_all(seeds.iter().map(|seed| {
            let search = self.search.clone();
            let options = options.clone();
            async move { search.smart_search(seed, options).await }
        }))
        .await;

        let mut candidates: Vec<Song> = Vec::new();
        let mut seen: HashSet<String> = HashSet::new();
        for (seed, result) in seeds.iter().zip(results) {
            match result {
                Ok(songs) => {
                    for song in songs {
                        if seen.insert(song.id.clone()) {
                            candidates.push(song);
                        }
                    }
                }
                // One failing seed never aborts the pipeline.
                Err(err) => debug!("seed \"{seed}\" failed: {err}"),
            }
        }

        let preferred: Vec<String> = preferences
            .languages
            .iter()
            .map(|l| l.to_lowercase())
            .collect();
        let favorite_names: Vec<String> = preferences
            .favorite_artists
            .iter()
            .map(|a| a.name.to_lowercase())
            .collect();
        let play_counts: HashMap<String, u32> = top_artists
            .iter()
            .map(|(name, count)| (name.to_lowercase(), *count))
            .collect();
        let skipped: HashSet<&String> = skipped_ids.iter().collect();

        let mut rule_scores: HashMap<String, f64> = HashMap::new();
        for song in &candidates {
            let mut score = RULE_BASE;
            for artist in song.artist_names() {
                let artist = artist.to_lowercase();
                if favorite_names.contains(&artist) {
                    score += RULE_FAVORITE_ARTIST;
                }
                if let Some(count) = play_counts.get(&artist) {
                    score += RULE_PLAY_COUNT_SCALE * *count as f64;
                }
            }
            if skipped.contains(&song.id) {
                score += RULE_SKIPPED;
            }
            if preferred.contains(&song.language.to_lowercase()) {
                score += RULE_PREFERRED_LANGUAGE;
            }
            rule_scores.insert(song.id.clone(), score);
        }

        candidates.sort_by(|a, b| {
            let ra = rule_scores.get(&a.id).copied().unwrap_or(0.0);
            let rb = rule_scores.get(&b.id).copied().unwrap_or(0.0);
            rb.partial_cmp(&ra)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.id.cmp(&b.id))
        });

        if !preferred.is_empty() {
            // Stable partition: in-preferred-language first, everything
            // else after, relative order untouched.
            let (matching, other): (Vec<Song>, Vec<Song>) = candidates
                .into_iter()
                .partition(|s| preferred.contains(&s.language.to_lowercase()));
            candidates = matching;
            candidates.extend(other);
        }
        candidates.truncate(PRE_RERANK_CAP);

        let rerank_options = RerankOptions {
            query: None,
            preferred_languages: preferred.clone(),
        };
        let reranked = match self
            .reranker
            .rerank(Some(uid), candidates.clone(), &rerank_options)
            .await
        {
            Ok(songs) => songs,
            Err(err) => {
                warn!("reranker failed for {uid}, serving rule-scored list: {err}");
                candidates
            }
        };

        let mut blended: Vec<(Song, f64)> = reranked
            .into_iter()
            .map(|song| {
                let rule = rule_scores.get(&song.id).copied().unwrap_or(0.0);
                let model = song.ranking.as_ref().map(|r| r.final_score).unwrap_or(0.0);
                let blend = ((rule * 0.6 + model * 100.0 * 0.4) * 100.0).round() / 100.0;
                (song, blend)
            })
            .collect();
        blended.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));

        blended
            .into_iter()
            .take(limit)
            .map(|(song, _)| song)
            .collect()
    }
}

fn push_seed(seeds: &mut Vec<String>, seed: String) {
    let trimmed = seed.trim().to_string();
    if trimmed.is_empty() {
        return;
    }
    if seeds.iter().any(|s| s.eq_ignore_ascii_case(&trimmed)) {
        return;
    }
    seeds.push(trimmed);
}

/// Seed-query synthesis. Priority: favorite artists, then top-played
/// artists, then recent search queries; thin profiles back-fill from
/// recently played artists, then per-language defaults.
pub fn build_seed_queries(
    preferences: &UserPreferences,
    top_artists: &[(String, u32)],
    search_events: &[ActivityEvent],
    play_events: &[ActivityEvent],
) -> Vec<String> {
    let mut seeds = Vec::new();

    for artist in preferences.favorite_artists.iter().take(5) {
        push_seed(&mut seeds, artist.name.clone());
    }
    for (artist, _) in top_artists.iter().take(5) {
        push_seed(&mut seeds, artist.clone());
    }
    for event in search_events.iter().take(5) {
        if let Some(query) = &event.query {
            push_seed(&mut seeds, query.clone());
        }
    }

    if seeds.len() < 3 {
        for event in play_events {
            if let Some(artist) = &event.artist {
                push_seed(&mut seeds, artist.clone());
            }
        }
    }

    if seeds.is_empty() {
        for language in preferences.languages.iter().take(3) {
            push_seed(&mut seeds, format!("Top {language} songs"));
        }
    }
    if seeds.is_empty() {
        seeds.push("Top Hindi songs".to_string());
    }

    seeds.truncate(MAX_SEED_QUERIES);
    seeds
}
