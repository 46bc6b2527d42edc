//! "Next track" recommendations with hard playback-continuity
//! constraints: same language, different artist, different album, and
//! no canonical-title duplicates or recently heard songs.

use std::collections::HashSet;

use futures::future::join_all;
use tracing::{debug, warn};

use super::generator::RecommendationEngine;
use crate::catalog::Song;
use crate::profile::ActivityType;
use crate::ranking::RerankOptions;
use crate::search::{text, SearchOptions};

/// Seed queries fanned out per next-track request.
const MAX_NEXT_SEEDS: usize = 6;

/// Plays and skips each contributing to the recent-exclusion set.
const RECENT_EXCLUSION_WINDOW: usize = 40;

/// Candidates passed to the reranker, as a multiple of the requested
/// limit.
const RERANK_POOL_FACTOR: usize = 4;

const DECORATOR_KEYWORDS: &[&str] = &[
    "remix",
    "version",
    "live",
    "slowed",
    "reverb",
    "karaoke",
    "instrumental",
    "lofi",
    "cover",
];

/// Normalize a title for duplicate detection: parenthesized and
/// bracketed segments go, then version/mix decorator words.
pub fn canonical_title(name: &str) -> String {
    let mut stripped = String::with_capacity(name.len());
    let mut paren_depth = 0usize;
    let mut bracket_depth = 0usize;
    for ch in name.chars() {
        match ch {
            '(' => paren_depth += 1,
            ')' => paren_depth = paren_depth.saturating_sub(1),
            '[' => bracket_depth += 1,
            ']' => bracket_depth = bracket_depth.saturating_sub(1),
            _ if paren_depth == 0 && bracket_depth == 0 => stripped.push(ch),
            _ => {}
        }
    }

    text::tokenize(&stripped)
        .into_iter()
        .filter(|token| !DECORATOR_KEYWORDS.contains(&token.as_str()))
        .collect::<Vec<_>>()
        .join(" ")
}

/// The playback context extracted from the current song.
struct NextTrackContext {
    language: String,
    genre: Option<String>,
    artist_ids: HashSet<String>,
    artist_names: HashSet<String>,
    album_id: String,
    album_name: String,
    canonical: String,
}

impl NextTrackContext {
    fn from_song(song: &Song) -> Self {
        Self {
            language: song.language.trim().to_lowercase(),
            genre: song
                .genre
                .as_ref()
                .map(|g| g.trim().to_lowercase())
                .filter(|g| !g.is_empty()),
            artist_ids: song
                .artists
                .primary
                .iter()
                .map(|a| a.id.clone())
                .filter(|id| !id.is_empty())
                .collect(),
            artist_names: song
                .artists
                .primary
                .iter()
                .map(|a| text::normalize(&a.name))
                .filter(|n| !n.is_empty())
                .collect(),
            album_id: song.album.id.clone(),
            album_name: text::normalize(&song.album.name),
            canonical: canonical_title(&song.name),
        }
    }

    fn admits(&self, candidate: &Song, excluded: &HashSet<String>) -> bool {
        if excluded.contains(&candidate.id) {
            return false;
        }
        if !self.language.is_empty() && candidate.language.trim().to_lowercase() != self.language {
            return false;
        }

        let shares_artist = candidate.artists.primary.iter().any(|a| {
            (!a.id.is_empty() && self.artist_ids.contains(&a.id))
                || self.artist_names.contains(&text::normalize(&a.name))
        });
        if shares_artist {
            return false;
        }

        if !self.album_id.is_empty() && candidate.album.id == self.album_id {
            return false;
        }
        if !self.album_name.is_empty() && text::normalize(&candidate.album.name) == self.album_name
        {
            return false;
        }

        if !self.canonical.is_empty() {
            let candidate_canonical = canonical_title(&candidate.name);
            if candidate_canonical == self.canonical
                || candidate_canonical.contains(&self.canonical)
            {
                return false;
            }
        }
        true
    }

    fn seed_queries(&self, title: &str) -> Vec<String> {
        let mut seeds: Vec<String> = Vec::new();
        let mut push = |seed: String| {
            let seed = seed.trim().to_string();
            if !seed.is_empty() && !seeds.iter().any(|s| s.eq_ignore_ascii_case(&seed)) {
                seeds.push(seed);
            }
        };

        if let (false, Some(genre)) = (self.language.is_empty(), &self.genre) {
            push(format!("Top {} {}", self.language, genre));
            push(format!("{} {}", self.language, genre));
        }
        if !self.language.is_empty() {
            push(format!("Top {}", self.language));
            push(format!("Latest {}", self.language));
            push(self.language.clone());
        }
        if let Some(genre) = &self.genre {
            push(format!("Top {genre}"));
        }
        push(title.to_string());

        if seeds.is_empty() {
            seeds.push("Top Hindi songs".to_string());
        }
        seeds.truncate(MAX_NEXT_SEEDS);
        seeds
    }
}

fn popularity_norm(song: &Song) -> f64 {
    match song.popularity {
        Some(raw) if raw >= 0.0 => ((raw + 1.0).log10() / 3.2).clamp(0.0, 1.0),
        _ => 0.45,
    }
}

fn pre_score(candidate: &Song, ctx: &NextTrackContext) -> f64 {
    let mut score = 0.0;
    if !ctx.language.is_empty() && candidate.language.trim().to_lowercase() == ctx.language {
        score += 120.0;
    }
    if let (Some(genre), Some(candidate_genre)) = (&ctx.genre, &candidate.genre) {
        let candidate_genre = candidate_genre.trim().to_lowercase();
        if candidate_genre == *genre {
            score += 50.0;
        } else if candidate_genre.contains(genre.as_str()) || genre.contains(&candidate_genre) {
            score += 30.0;
        }
    }
    score += 40.0 * popularity_norm(candidate);
    match candidate.year {
        Some(year) if year >= 2020 => score += 8.0,
        Some(year) if year >= 2015 => score += 4.0,
        _ => {}
    }
    score
}

fn next_reason(candidate: &Song, ctx: &NextTrackContext) -> String {
    let mut parts = vec![];
    if !ctx.language.is_empty() {
        parts.push(format!("same language ({})", ctx.language));
    }
    if let (Some(genre), Some(candidate_genre)) = (&ctx.genre, &candidate.genre) {
        if candidate_genre.trim().to_lowercase() == *genre {
            parts.push(format!("same genre ({genre})"));
        }
    }
    if parts.is_empty() {
        parts.push("fresh pick".to_string());
    }
    parts.join(", ")
}

impl RecommendationEngine {
    /// Pick up to `limit` continuation candidates for the song the user
    /// is currently hearing.
    pub async fn next_track(&self, uid: &str, current: Song, limit: usize) -> Vec<Song> {
        let limit = limit.max(1);

        // Thin metadata gets one enrichment attempt; failure is fine.
        let mut current = current;
        if current.language.trim().is_empty() || current.artists.primary.is_empty() {
            match self.provider().song_by_id(&current.id).await {
                Ok(Some(full)) => {
                    if current.language.trim().is_empty() {
                        current.language = full.language;
                    }
                    if current.artists.primary.is_empty() {
                        current.artists = full.artists;
                    }
                    if current.album.id.is_empty() {
                        current.album = full.album;
                    }
                    if current.genre.is_none() {
                        current.genre = full.genre;
                    }
                }
                Ok(None) => {}
                Err(err) => debug!("next-track enrichment failed for {}: {err}", current.id),
            }
        }
        let ctx = NextTrackContext::from_song(&current);

        let (plays, skips) = tokio::join!(
            self.profiles()
                .recent_song_ids(uid, ActivityType::Play, RECENT_EXCLUSION_WINDOW),
            self.profiles()
                .recent_song_ids(uid, ActivityType::Skip, RECENT_EXCLUSION_WINDOW),
        );
        let mut excluded: HashSet<String> = HashSet::new();
        excluded.insert(current.id.clone());
        for result in [plays, skips] {
            match result {
                Ok(ids) => excluded.extend(ids),
                Err(err) => warn!("recent exclusions unavailable for {uid}: {err}"),
            }
        }

        let seeds = ctx.seed_queries(&current.name);
        debug!("next-track seeds for {uid}: {seeds:?}");

        let options = SearchOptions {
            wait_for_fresh: false,
            preferred_languages: if ctx.language.is_empty() {
                Vec::new()
            } else {
                vec![ctx.language.clone()]
            },
        };
        let results = join_all(seeds.iter().map(|seed| {
            let search = self.search().clone();
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
                Err(err) => debug!("next-track seed \"{seed}\" failed: {err}"),
            }
        }

        let mut admitted: Vec<(Song, f64)> = candidates
            .into_iter()
            .filter(|candidate| ctx.admits(candidate, &excluded))
            .map(|candidate| {
                let score = pre_score(&candidate, &ctx);
                (candidate, score)
            })
            .collect();
        admitted.sort_by(|a, b| {
            b.1.partial_cmp(&a.1)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.0.id.cmp(&b.0.id))
        });
        admitted.truncate(limit * RERANK_POOL_FACTOR);

        let pool: Vec<Song> = admitted.into_iter().map(|(song, _)| song).collect();
        let rerank_options = RerankOptions {
            query: None,
            preferred_languages: options.preferred_languages.clone(),
        };
        let reranked = match self
            .reranker()
            .rerank(Some(uid), pool.clone(), &rerank_options)
            .await
        {
            Ok(songs) => songs,
            Err(err) => {
                warn!("next-track reranker failed for {uid}: {err}");
                pool
            }
        };

        reranked
            .into_iter()
            .take(limit)
            .map(|mut song| {
                song.next_reason = Some(next_reason(&song, &ctx));
                song
            })
            .collect()
    }
}
