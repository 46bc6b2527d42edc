//! Bounded in-memory index of every song seen in an upstream response.
//!
//! Entries carry precomputed searchable fields so that the zero-latency
//! first pass of smart search scores candidates without any I/O or
//! per-candidate allocation.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Instant;

use super::scoring::{score_song_match, QueryContext, ScoredSong, SongSource};
use super::text::SongText;
use crate::catalog::Song;

/// Default maximum number of indexed songs.
pub const LOCAL_INDEX_CAP: usize = 6000;

/// Maximum candidates returned by a single local search pass.
pub const LOCAL_SEARCH_CAP: usize = 120;

struct IndexEntry {
    song: Song,
    text: SongText,
    #[allow(dead_code)]
    updated_at: Instant,
    last_access_at: Instant,
}

/// LRU-bounded map from song id to its precomputed index entry.
pub struct LocalSongIndex {
    entries: Mutex<HashMap<String, IndexEntry>>,
    cap: usize,
}

impl LocalSongIndex {
    pub fn new() -> Self {
        Self::with_capacity(LOCAL_INDEX_CAP)
    }

    pub fn with_capacity(cap: usize) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            cap: cap.max(1),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Insert or refresh a song. Ranking annotations never enter the
    /// index; they belong to one response, not to the song.
    pub fn upsert(&self, song: &Song) {
        let mut song = song.clone();
        song.ranking = None;
        song.next_reason = None;

        let now = Instant::now();
        let entry = IndexEntry {
            text: SongText::from_song(&song),
            song,
            updated_at: now,
            last_access_at: now,
        };

        let mut entries = self.entries.lock().unwrap();
        entries.insert(entry.song.id.clone(), entry);

        while entries.len() > self.cap {
            let oldest = entries
                .iter()
                .min_by_key(|(_, e)| e.last_access_at)
                .map(|(id, _)| id.clone());
            match oldest {
                Some(id) => {
                    entries.remove(&id);
                }
                None => break,
            }
        }
    }

    pub fn upsert_all<'a>(&self, songs: impl IntoIterator<Item = &'a Song>) {
        for song in songs {
            self.upsert(song);
        }
    }

    /// Score every indexed song against the query context and return the
    /// best [`LOCAL_SEARCH_CAP`] matches. Returned entries count as
    /// accessed for LRU purposes.
    pub fn search_local(&self, ctx: &QueryContext) -> Vec<ScoredSong> {
        let mut entries = self.entries.lock().unwrap();

        let mut matches: Vec<(String, super::scoring::MatchTier, f64)> = entries
            .iter()
            .filter_map(|(id, entry)| {
                score_song_match(&entry.text, &entry.song.language, ctx, SongSource::LocalIndex, 0)
                    .map(|(tier, score)| (id.clone(), tier, score))
            })
            .collect();

        matches.sort_by(|a, b| {
            a.1.cmp(&b.1)
                .then_with(|| b.2.partial_cmp(&a.2).unwrap_or(std::cmp::Ordering::Equal))
                .then_with(|| a.0.cmp(&b.0))
        });
        matches.truncate(LOCAL_SEARCH_CAP);

        let now = Instant::now();
        matches
            .into_iter()
            .filter_map(|(id, tier, score)| {
                entries.get_mut(&id).map(|entry| {
                    entry.last_access_at = now;
                    ScoredSong {
                        song: entry.song.clone(),
                        tier,
                        score,
                    }
                })
            })
            .collect()
    }
}

impl Default for LocalSongIndex {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{AlbumRef, ArtistRef, Artists};

    fn song(id: &str, name: &str, artist: &str) -> Song {
        Song {
            id: id.into(),
            name: name.into(),
            language: "english".into(),
            album: AlbumRef::default(),
            artists: Artists {
                primary: vec![ArtistRef {
                    id: format!("{id}-ar"),
                    name: artist.into(),
                }],
            },
            image_urls: vec![],
            download_urls: vec![],
            year: None,
            duration_sec: None,
            popularity: None,
            genre: None,
            ranking: None,
            next_reason: None,
        }
    }

    #[test]
    fn test_search_local_finds_indexed_songs() {
        let index = LocalSongIndex::new();
        index.upsert(&song("1", "Believer", "Imagine Dragons"));
        index.upsert(&song("2", "Thunder", "Imagine Dragons"));
        index.upsert(&song("3", "Feliz Navidad", "Jose Feliciano"));

        let ctx = QueryContext::new("believer", &[]);
        let results = index.search_local(&ctx);
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].song.id, "1");
    }

    #[test]
    fn test_artist_query_matches_haystack() {
        let index = LocalSongIndex::new();
        index.upsert(&song("1", "Believer", "Imagine Dragons"));
        index.upsert(&song("2", "Thunder", "Imagine Dragons"));

        let ctx = QueryContext::new("imagine dragons", &[]);
        let results = index.search_local(&ctx);
        assert_eq!(results.len(), 2);
    }

    #[test]
    fn test_upsert_same_id_replaces() {
        let index = LocalSongIndex::new();
        index.upsert(&song("1", "Believer", "Imagine Dragons"));
        index.upsert(&song("1", "Believer (Remix)", "Imagine Dragons"));
        assert_eq!(index.len(), 1);
    }

    #[test]
    fn test_lru_eviction_drops_least_recently_accessed() {
        let index = LocalSongIndex::with_capacity(2);
        index.upsert(&song("1", "Alpha", "A"));
        index.upsert(&song("2", "Beta", "B"));

        // Touch "1" so that "2" becomes the eviction candidate.
        let ctx = QueryContext::new("alpha", &[]);
        assert_eq!(index.search_local(&ctx).len(), 1);

        index.upsert(&song("3", "Gamma", "C"));
        assert_eq!(index.len(), 2);

        let ctx = QueryContext::new("beta", &[]);
        assert!(index.search_local(&ctx).is_empty(), "evicted entry must not match");
        let ctx = QueryContext::new("alpha", &[]);
        assert_eq!(index.search_local(&ctx).len(), 1);
    }

    #[test]
    fn test_ranking_annotation_not_indexed() {
        let mut annotated = song("1", "Believer", "Imagine Dragons");
        annotated.next_reason = Some("same language".into());
        let index = LocalSongIndex::new();
        index.upsert(&annotated);

        let ctx = QueryContext::new("believer", &[]);
        let results = index.search_local(&ctx);
        assert!(results[0].song.next_reason.is_none());
    }
}
