//! Text normalization primitives shared by the local index and the
//! match scorer. Everything here is precomputable so that scoring a
//! candidate does no allocation beyond the score itself.

use crate::catalog::Song;

/// Language names the catalog providers tag songs with. A query token
/// matching one of these acts as a language hint during scoring.
pub const LANGUAGE_NAMES: &[&str] = &[
    "hindi",
    "english",
    "punjabi",
    "tamil",
    "telugu",
    "marathi",
    "gujarati",
    "bengali",
    "kannada",
    "bhojpuri",
    "malayalam",
    "urdu",
    "haryanvi",
    "rajasthani",
    "odia",
    "assamese",
    "spanish",
    "korean",
];

/// Tokens that carry no matching signal. The language names double as
/// noise for matching purposes since they are handled separately as
/// hints.
const DOMAIN_NOISE_WORDS: &[&str] = &[
    "song", "songs", "movie", "album", "lyrics", "official", "audio", "music", "theme", "bgm",
    "ost",
];

pub fn is_noise_word(token: &str) -> bool {
    DOMAIN_NOISE_WORDS.contains(&token) || LANGUAGE_NAMES.contains(&token)
}

pub fn is_language_name(token: &str) -> bool {
    LANGUAGE_NAMES.contains(&token)
}

/// Lowercase, collapse internal whitespace, trim.
pub fn normalize(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut pending_space = false;
    for ch in text.trim().chars() {
        if ch.is_whitespace() {
            pending_space = !out.is_empty();
        } else {
            if pending_space {
                out.push(' ');
                pending_space = false;
            }
            for lower in ch.to_lowercase() {
                out.push(lower);
            }
        }
    }
    out
}

/// Keep only unicode letters and digits, lowercased.
pub fn compact(text: &str) -> String {
    text.chars()
        .filter(|c| c.is_alphanumeric())
        .flat_map(|c| c.to_lowercase())
        .collect()
}

pub fn tokenize(text: &str) -> Vec<String> {
    normalize(text)
        .split(' ')
        .filter(|t| !t.is_empty())
        .map(|t| t.to_string())
        .collect()
}

/// Levenshtein (edit) distance between two strings, two-row variant.
pub fn levenshtein(a: &str, b: &str) -> usize {
    let a_chars: Vec<char> = a.chars().collect();
    let b_chars: Vec<char> = b.chars().collect();
    let a_len = a_chars.len();
    let b_len = b_chars.len();

    if a_len == 0 {
        return b_len;
    }
    if b_len == 0 {
        return a_len;
    }

    let mut prev_row: Vec<usize> = (0..=b_len).collect();
    let mut curr_row: Vec<usize> = vec![0; b_len + 1];

    for (i, a_char) in a_chars.iter().enumerate() {
        curr_row[0] = i + 1;

        for (j, b_char) in b_chars.iter().enumerate() {
            let cost = if a_char == b_char { 0 } else { 1 };

            curr_row[j + 1] = (prev_row[j + 1] + 1)
                .min(curr_row[j] + 1)
                .min(prev_row[j] + cost);
        }

        std::mem::swap(&mut prev_row, &mut curr_row);
    }

    prev_row[b_len]
}

/// Edit-distance budget for a string of the given length.
pub fn max_edit_distance(len: usize) -> usize {
    if len < 6 {
        1
    } else if len <= 9 {
        2
    } else {
        3
    }
}

/// Searchable fields precomputed from a [`Song`] once, at insertion or
/// merge time.
#[derive(Debug, Clone)]
pub struct SongText {
    /// Lowercased, whitespace-collapsed name.
    pub name: String,
    /// Primary artist names, normalized and joined.
    pub artists: String,
    /// Normalized album name.
    pub album: String,
    /// `"name artists album"` joined.
    pub haystack: String,
    pub compact_name: String,
    pub compact_haystack: String,
    /// Tokenized haystack. Noise words are kept; stripping happens at
    /// query-variant level, not here.
    pub haystack_tokens: Vec<String>,
}

impl SongText {
    pub fn from_song(song: &Song) -> SongText {
        let name = normalize(&song.name);
        let artists = normalize(&song.artist_names().join(" "));
        let album = normalize(&song.album.name);

        let mut haystack = name.clone();
        if !artists.is_empty() {
            haystack.push(' ');
            haystack.push_str(&artists);
        }
        if !album.is_empty() {
            haystack.push(' ');
            haystack.push_str(&album);
        }

        SongText {
            compact_name: compact(&name),
            compact_haystack: compact(&haystack),
            haystack_tokens: tokenize(&haystack),
            name,
            artists,
            album,
            haystack,
        }
    }
}
