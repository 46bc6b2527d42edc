//! Deterministic hashed embeddings for users and songs.
//!
//! Both sides project weighted feature tokens into a small fixed-size
//! vector through a seeded hash, then L2-normalize. No learned state:
//! the same tokens always produce the same vector.

use crate::catalog::Song;
use crate::profile::RealtimeProfile;
use crate::search::text;

/// Embedding dimensionality.
pub const EMBED_DIM: usize = 16;

/// Search terms considered from the profile, newest first.
const MAX_SEARCH_TERM_CONTRIBUTIONS: usize = 20;

/// Song interactions considered from the profile, newest first.
const MAX_INTERACTION_CONTRIBUTIONS: usize = 200;

const FAVORITE_ARTIST_WEIGHT: f64 = 2.4;
const INTERACTION_SONG_SCALE: f64 = 0.15;
const INTERACTION_ARTIST_SCALE: f64 = 0.08;
const INTERACTION_LANGUAGE_SCALE: f64 = 0.06;

/// Hash a token into a signed scalar in roughly (-0.5, 0.5]:
/// FNV-1a folded into [-48, 48] and scaled by 97.
fn signed_hash(key: &str) -> f64 {
    let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
    for byte in key.bytes() {
        hash ^= byte as u64;
        hash = hash.wrapping_mul(0x0000_0100_0000_01b3);
    }
    ((hash % 97) as i64 - 48) as f64 / 97.0
}

#[derive(Debug, Clone)]
pub struct Embedding(pub [f64; EMBED_DIM]);

impl Embedding {
    fn zero() -> Self {
        Embedding([0.0; EMBED_DIM])
    }

    fn add(&mut self, token: &str, weight: f64) {
        if weight == 0.0 || token.is_empty() {
            return;
        }
        for (i, slot) in self.0.iter_mut().enumerate() {
            *slot += signed_hash(&format!("{token}#{i}")) * weight;
        }
    }

    fn normalize(mut self) -> Self {
        let norm = self.0.iter().map(|v| v * v).sum::<f64>().sqrt();
        if norm > f64::EPSILON {
            for slot in self.0.iter_mut() {
                *slot /= norm;
            }
        }
        self
    }

    pub fn dot(&self, other: &Embedding) -> f64 {
        self.0.iter().zip(other.0.iter()).map(|(a, b)| a * b).sum()
    }
}

/// Cosine-derived similarity mapped into [0, 1].
pub fn similarity(a: &Embedding, b: &Embedding) -> f64 {
    ((a.dot(b) + 1.0) / 2.0).clamp(0.0, 1.0)
}

fn clamp(value: f64, lo: f64, hi: f64) -> f64 {
    value.clamp(lo, hi)
}

/// Build the taste vector for one user profile.
pub fn user_embedding(profile: &RealtimeProfile) -> Embedding {
    let mut vec = Embedding::zero();

    for artist in &profile.favorite_artists {
        vec.add(
            &format!("fav_artist:{}", artist.to_lowercase()),
            FAVORITE_ARTIST_WEIGHT,
        );
    }

    for (language, affinity) in &profile.language_affinity {
        let weight = 0.9 + clamp(*affinity, -2.0, 8.0) * 0.08;
        vec.add(&format!("language:{}", language.to_lowercase()), weight);
    }

    for (artist, affinity) in &profile.artist_affinity {
        let weight = clamp(*affinity, -4.0, 10.0) * 0.25;
        vec.add(&format!("artist:{}", artist.to_lowercase()), weight);
    }

    for (i, term) in profile
        .search_terms
        .iter()
        .take(MAX_SEARCH_TERM_CONTRIBUTIONS)
        .enumerate()
    {
        let weight = 1.0 / (1.0 + i as f64 * 0.45);
        for token in text::tokenize(term) {
            vec.add(&token, weight);
        }
    }

    let mut interactions: Vec<_> = profile.song_interactions.iter().collect();
    interactions.sort_by(|a, b| b.1.last_played.cmp(&a.1.last_played));
    for (song_id, interaction) in interactions.into_iter().take(MAX_INTERACTION_CONTRIBUTIONS) {
        vec.add(
            &format!("song:{song_id}"),
            interaction.affinity * INTERACTION_SONG_SCALE,
        );
        if let Some(artist) = &interaction.artist {
            vec.add(
                &format!("artist:{}", artist.to_lowercase()),
                interaction.affinity * INTERACTION_ARTIST_SCALE,
            );
        }
        if let Some(language) = &interaction.language {
            vec.add(
                &format!("language:{}", language.to_lowercase()),
                interaction.affinity * INTERACTION_LANGUAGE_SCALE,
            );
        }
    }

    vec.normalize()
}

/// Build the content vector for one song from its extracted fields,
/// using the same token namespace as the user side.
pub fn song_embedding(song: &Song) -> Embedding {
    let mut vec = Embedding::zero();

    vec.add(&format!("song:{}", song.id), 1.0);

    for artist in song.artist_names() {
        let artist = artist.to_lowercase();
        vec.add(&format!("artist:{artist}"), 1.0);
        vec.add(&format!("fav_artist:{artist}"), 0.6);
    }

    if !song.language.is_empty() {
        vec.add(&format!("language:{}", song.language.to_lowercase()), 0.9);
    }

    for token in text::tokenize(&song.name) {
        vec.add(&token, 0.5);
    }

    vec.normalize()
}
