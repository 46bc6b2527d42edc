//! Lexical and fuzzy match scoring for search candidates.
//!
//! Every candidate gets a discrete match tier and a numeric score. The
//! tier dominates ordering; the score only breaks ties within a tier.

use std::collections::HashMap;

use super::text::{
    self, is_language_name, is_noise_word, levenshtein, max_edit_distance, SongText,
};
use crate::catalog::Song;

/// Coarse match quality bucket. Ordering is part of the contract:
/// a better (lower) tier always outranks a worse one regardless of the
/// numeric score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum MatchTier {
    Exact = 0,
    StartsWith = 1,
    Contains = 2,
    Fuzzy = 3,
}

/// Where a candidate was obtained from. Sources with stronger metadata
/// get a larger score bump.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SongSource {
    Primary,
    Broad,
    Fallback,
    LocalIndex,
}

impl SongSource {
    pub fn weight(&self) -> f64 {
        match self {
            SongSource::Primary => 15.0,
            SongSource::Broad => 8.0,
            SongSource::Fallback => 5.0,
            SongSource::LocalIndex => 20.0,
        }
    }
}

const TIER_EXACT_BASE: f64 = 260.0;
const TIER_STARTS_WITH_BASE: f64 = 200.0;
const TIER_CONTAINS_BASE: f64 = 140.0;
const TIER_FUZZY_BASE: f64 = 80.0;

const TERM_IN_NAME_BONUS: f64 = 20.0;
const TERM_IN_ARTISTS_BONUS: f64 = 13.0;
const TERM_IN_ALBUM_BONUS: f64 = 10.0;
const FUZZY_TOKEN_BONUS: f64 = 6.0;
const LANGUAGE_HINT_MATCH: f64 = 18.0;
const LANGUAGE_HINT_MISS: f64 = -4.0;
const PREFERRED_LANGUAGE_MATCH: f64 = 28.0;
const PREFERRED_LANGUAGE_MISS: f64 = -2.0;
const VARIANT_PENALTY: f64 = 10.0;
const FUZZY_TIER_PENALTY: f64 = 10.0;

/// A candidate song together with its match quality.
#[derive(Debug, Clone)]
pub struct ScoredSong {
    pub song: Song,
    pub tier: MatchTier,
    pub score: f64,
}

/// Precomputed query-side state, built once per variant.
#[derive(Debug, Clone)]
pub struct QueryContext {
    pub query: String,
    pub compact_query: String,
    pub tokens: Vec<String>,
    /// Tokens that are not noise words; falls back to all tokens when
    /// the query is nothing but noise.
    pub effective_terms: Vec<String>,
    /// A query token naming a catalog language, if any.
    pub language_hint: Option<String>,
    pub preferred_languages: Vec<String>,
}

impl QueryContext {
    pub fn new(query: &str, preferred_languages: &[String]) -> QueryContext {
        let query = text::normalize(query);
        let tokens = text::tokenize(&query);
        let effective: Vec<String> = tokens
            .iter()
            .filter(|t| !is_noise_word(t))
            .cloned()
            .collect();
        let effective_terms = if effective.is_empty() {
            tokens.clone()
        } else {
            effective
        };
        let language_hint = tokens.iter().find(|t| is_language_name(t)).cloned();

        QueryContext {
            compact_query: text::compact(&query),
            tokens,
            effective_terms,
            language_hint,
            preferred_languages: preferred_languages
                .iter()
                .map(|l| l.trim().to_lowercase())
                .filter(|l| !l.is_empty())
                .collect(),
            query,
        }
    }
}

fn fuzzy_token_matches(term: &str, tokens: &[String]) -> bool {
    let budget = max_edit_distance(term.chars().count());
    let first = match term.chars().next() {
        Some(c) => c,
        None => return false,
    };
    tokens.iter().any(|token| {
        if token.chars().next() != Some(first) {
            return false;
        }
        let delta = token.chars().count().abs_diff(term.chars().count());
        delta <= budget && levenshtein(term, token) <= budget
    })
}

/// Score one candidate against a query variant. Returns `None` when the
/// candidate does not clear the admission rules for any tier.
pub fn score_song_match(
    text: &SongText,
    song_language: &str,
    ctx: &QueryContext,
    source: SongSource,
    variant_index: usize,
) -> Option<(MatchTier, f64)> {
    if ctx.query.is_empty() {
        return None;
    }

    let has_compact = !ctx.compact_query.is_empty() && !text.compact_name.is_empty();

    // Term-level matching feeds both the bonuses and the fuzzy
    // admission rule.
    let mut term_bonus = 0.0;
    let mut matched_terms = 0usize;
    for term in &ctx.tokens {
        let mut hit = false;
        if text.name.contains(term.as_str()) {
            term_bonus += TERM_IN_NAME_BONUS;
            hit = true;
        } else if text.artists.contains(term.as_str()) {
            term_bonus += TERM_IN_ARTISTS_BONUS;
            hit = true;
        } else if text.album.contains(term.as_str()) {
            term_bonus += TERM_IN_ALBUM_BONUS;
            hit = true;
        } else if fuzzy_token_matches(term, &text.haystack_tokens) {
            term_bonus += FUZZY_TOKEN_BONUS;
            hit = true;
        }
        if hit && ctx.effective_terms.contains(term) {
            matched_terms += 1;
        }
    }

    let tier = if text.name == ctx.query || (has_compact && text.compact_name == ctx.compact_query)
    {
        MatchTier::Exact
    } else if text.name.starts_with(&ctx.query)
        || (has_compact && text.compact_name.starts_with(&ctx.compact_query))
    {
        MatchTier::StartsWith
    } else if text.name.contains(&ctx.query)
        || text.haystack.contains(&ctx.query)
        || (!ctx.compact_query.is_empty() && text.compact_haystack.contains(&ctx.compact_query))
    {
        MatchTier::Contains
    } else {
        let coverage_ok = matched_terms >= std::cmp::max(1, ctx.effective_terms.len() - 1);
        let distance_ok = has_compact
            && levenshtein(&text.compact_name, &ctx.compact_query)
                <= max_edit_distance(ctx.compact_query.chars().count());
        if !coverage_ok && !distance_ok {
            return None;
        }
        MatchTier::Fuzzy
    };

    // Long queries that match nothing at the term level are noise below
    // the CONTAINS tier.
    if ctx.effective_terms.len() >= 2 && matched_terms == 0 && tier > MatchTier::Contains {
        return None;
    }

    let mut score = match tier {
        MatchTier::Exact => TIER_EXACT_BASE,
        MatchTier::StartsWith => TIER_STARTS_WITH_BASE,
        MatchTier::Contains => TIER_CONTAINS_BASE,
        MatchTier::Fuzzy => TIER_FUZZY_BASE - FUZZY_TIER_PENALTY,
    };
    score += term_bonus;

    if let Some(hint) = &ctx.language_hint {
        score += if song_language == hint.as_str() {
            LANGUAGE_HINT_MATCH
        } else {
            LANGUAGE_HINT_MISS
        };
    }

    if !ctx.preferred_languages.is_empty() {
        score += if ctx.preferred_languages.iter().any(|l| l == song_language) {
            PREFERRED_LANGUAGE_MATCH
        } else {
            PREFERRED_LANGUAGE_MISS
        };
    }

    score += source.weight();
    score -= variant_index as f64 * VARIANT_PENALTY;

    Some((tier, score))
}

/// Merge scored candidates into the ranked set, deduplicating by song
/// id and keeping whichever entry has the better `(tier, score)`.
pub fn add_ranked_songs(
    ranked: &mut HashMap<String, ScoredSong>,
    songs: Vec<Song>,
    ctx: &QueryContext,
    source: SongSource,
    variant_index: usize,
) {
    for song in songs {
        let song_text = SongText::from_song(&song);
        let Some((tier, score)) = score_song_match(
            &song_text,
            &song.language,
            ctx,
            source,
            variant_index,
        ) else {
            continue;
        };
        add_scored(ranked, ScoredSong { song, tier, score });
    }
}

/// Insert a single pre-scored candidate with the same dedup policy.
pub fn add_scored(ranked: &mut HashMap<String, ScoredSong>, candidate: ScoredSong) {
    match ranked.get(&candidate.song.id) {
        Some(existing)
            if (existing.tier, -existing.score) <= (candidate.tier, -candidate.score) => {}
        _ => {
            ranked.insert(candidate.song.id.clone(), candidate);
        }
    }
}

/// Drain the ranked set into its final order: tier-major, score
/// descending inside a tier, id as the deterministic tie-break.
pub fn into_sorted(ranked: HashMap<String, ScoredSong>) -> Vec<ScoredSong> {
    let mut out: Vec<ScoredSong> = ranked.into_values().collect();
    out.sort_by(|a, b| {
        a.tier
            .cmp(&b.tier)
            .then_with(|| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal))
            .then_with(|| a.song.id.cmp(&b.song.id))
    });
    out
}
