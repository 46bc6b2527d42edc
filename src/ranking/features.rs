//! Per-song feature extraction for the personalized reranker.
//!
//! All features are clamped to [0, 1]. Their order matches the rows of
//! the neural head's weight matrix.

use super::embedding::{similarity, song_embedding, Embedding};
use super::neural::INPUT_DIM;
use crate::catalog::Song;
use crate::profile::RealtimeProfile;
use crate::search::text;

const POPULARITY_DEFAULT: f64 = 0.45;
const INTERACTION_DEFAULT: f64 = 0.35;
const SKIP_RISK_DEFAULT: f64 = 0.2;

fn clamp01(value: f64) -> f64 {
    value.clamp(0.0, 1.0)
}

fn sigmoid(x: f64) -> f64 {
    1.0 / (1.0 + (-x).exp())
}

/// Affinity nudge: positive affinities pull the score up against the
/// `up` divisor, negative ones push down against the `down` divisor,
/// both capped at ±0.35.
fn affinity_adjustment(affinity: f64, up: f64, down: f64) -> f64 {
    if affinity >= 0.0 {
        (affinity / up).min(0.35)
    } else {
        -((-affinity) / down).min(0.35)
    }
}

/// The eight reranker features for one candidate.
#[derive(Debug, Clone, Copy)]
pub struct SongFeatures {
    pub text_rank: f64,
    pub embedding_similarity: f64,
    pub language: f64,
    pub artist: f64,
    pub popularity: f64,
    pub interaction: f64,
    pub skip_risk: f64,
    pub query_intent: f64,
}

impl SongFeatures {
    pub fn to_array(self) -> [f64; INPUT_DIM] {
        [
            self.text_rank,
            self.embedding_similarity,
            self.language,
            self.artist,
            self.popularity,
            self.interaction,
            self.skip_risk,
            self.query_intent,
        ]
    }

    /// The preference aggregate used by the rule-based blend.
    pub fn preference_match(&self) -> f64 {
        (self.embedding_similarity + self.language + self.artist) / 3.0
    }
}

/// Query-independent context shared across one rerank call.
pub struct FeatureContext<'a> {
    pub profile: &'a RealtimeProfile,
    pub user_embedding: Embedding,
    pub preferred_languages: Vec<String>,
    pub query_tokens: Vec<String>,
    /// Total candidates in the list being reranked.
    pub total: usize,
}

impl<'a> FeatureContext<'a> {
    pub fn new(
        profile: &'a RealtimeProfile,
        user_embedding: Embedding,
        preferred_languages: &[String],
        query: Option<&str>,
    ) -> Self {
        let mut languages: Vec<String> = preferred_languages
            .iter()
            .map(|l| l.trim().to_lowercase())
            .filter(|l| !l.is_empty())
            .collect();
        if languages.is_empty() {
            languages = profile.languages.iter().map(|l| l.to_lowercase()).collect();
        }

        Self {
            profile,
            user_embedding,
            preferred_languages: languages,
            query_tokens: query.map(text::tokenize).unwrap_or_default(),
            total: 0,
        }
    }
}

pub fn compute_features(song: &Song, index: usize, ctx: &FeatureContext<'_>) -> SongFeatures {
    let language = song.language.to_lowercase();

    // 1. Upstream order as a prior.
    let text_rank = if ctx.total > 1 {
        clamp01(1.0 - index as f64 / (ctx.total - 1) as f64)
    } else {
        1.0
    };

    // 2. Taste vector alignment.
    let embedding_similarity = similarity(&ctx.user_embedding, &song_embedding(song));

    // 3. Language preference with affinity adjustment.
    let mut language_score = if !language.is_empty() && ctx.preferred_languages.contains(&language)
    {
        1.0
    } else {
        0.25
    };
    if let Some(affinity) = ctx.profile.language_affinity.get(&language) {
        language_score += affinity_adjustment(*affinity, 12.0, 10.0);
    }
    let language_score = clamp01(language_score);

    // 4. Artist preference.
    let mut artist_score: f64 = 0.1;
    let mut best_affinity: Option<f64> = None;
    for artist in song.artist_names() {
        if ctx
            .profile
            .favorite_artists
            .iter()
            .any(|fav| fav.eq_ignore_ascii_case(artist))
        {
            artist_score += 0.45;
        }
        if let Some(affinity) = ctx.profile.artist_affinity.get(artist) {
            best_affinity = Some(best_affinity.map_or(*affinity, |b: f64| b.max(*affinity)));
        }
    }
    if let Some(affinity) = best_affinity {
        artist_score += affinity_adjustment(affinity, 14.0, 12.0);
    }
    let artist_score = clamp01(artist_score);

    // 5. Popularity on a log scale.
    let popularity = match song.popularity {
        Some(raw) if raw >= 0.0 => clamp01((raw + 1.0).log10() / 3.2),
        _ => POPULARITY_DEFAULT,
    };

    // 6 & 7. Interaction history.
    let interaction_entry = ctx.profile.song_interactions.get(&song.id);
    let interaction = interaction_entry
        .map(|entry| sigmoid(entry.affinity * 0.35))
        .unwrap_or(INTERACTION_DEFAULT);
    let skip_risk = interaction_entry
        .map(|entry| {
            let total = entry.play_count + entry.skip_count;
            if total > 0 {
                entry.skip_count as f64 / total as f64
            } else {
                SKIP_RISK_DEFAULT
            }
        })
        .unwrap_or(SKIP_RISK_DEFAULT);

    // 8. Query intent: fraction of query tokens present in title or
    // artist string.
    let query_intent = if ctx.query_tokens.is_empty() {
        0.0
    } else {
        let title = song.name.to_lowercase();
        let artists = song.artist_names().join(" ").to_lowercase();
        let hits = ctx
            .query_tokens
            .iter()
            .filter(|t| title.contains(t.as_str()) || artists.contains(t.as_str()))
            .count();
        clamp01(hits as f64 / ctx.query_tokens.len() as f64)
    };

    SongFeatures {
        text_rank,
        embedding_similarity,
        language: language_score,
        artist: artist_score,
        popularity,
        interaction,
        skip_risk,
        query_intent,
    }
}
