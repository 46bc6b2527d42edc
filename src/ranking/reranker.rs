//! Personalized reranking of a candidate song list.
//!
//! The blend keeps the upstream (lexical) order as a strong prior and
//! lets the profile-driven features and the neural head reorder within
//! it. Every returned song carries a `_ranking` annotation.

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tracing::debug;

use super::embedding::user_embedding;
use super::features::{compute_features, FeatureContext};
use super::neural;
use crate::catalog::{RankingInfo, Song};
use crate::profile::{ProfileStore, RealtimeProfile};
use crate::search::TieredCache;

/// Per-user profile cache TTL.
pub const PROFILE_CACHE_TTL: Duration = Duration::from_secs(120);

/// Profile cache capacity (users).
pub const PROFILE_CACHE_CAP: usize = 300;

const RULE_WEIGHT: f64 = 0.65;
const NEURAL_WEIGHT: f64 = 0.35;

#[derive(Debug, Clone, Error)]
pub enum RankerError {
    #[error("profile load failed for uid {uid}: {detail}")]
    ProfileLoad { uid: String, detail: String },
}

/// Options carried through one rerank call.
#[derive(Debug, Clone, Default)]
pub struct RerankOptions {
    pub query: Option<String>,
    pub preferred_languages: Vec<String>,
}

pub struct Reranker {
    profiles: Arc<dyn ProfileStore>,
    cache: TieredCache<String, Arc<RealtimeProfile>>,
}

fn round4(value: f64) -> f64 {
    (value * 10_000.0).round() / 10_000.0
}

impl Reranker {
    /// Weight shapes are checked once here; a malformed table refuses to
    /// start rather than mis-scoring every request.
    pub fn new(profiles: Arc<dyn ProfileStore>) -> anyhow::Result<Self> {
        neural::verify_weights()?;
        Ok(Self {
            profiles,
            cache: TieredCache::with_ttl(PROFILE_CACHE_TTL, PROFILE_CACHE_CAP),
        })
    }

    async fn profile_for(&self, uid: &str) -> Result<Arc<RealtimeProfile>, RankerError> {
        if let Some((profile, _)) = self.cache.get(&uid.to_string()) {
            return Ok(profile);
        }
        // An occasional double-fetch under concurrency is tolerable
        // here; profiles are cheap to build compared to a search.
        let profile = self
            .profiles
            .realtime_profile(uid)
            .await
            .map_err(|e| RankerError::ProfileLoad {
                uid: uid.to_string(),
                detail: e.to_string(),
            })?;
        let profile = Arc::new(profile);
        self.cache.put(uid.to_string(), profile.clone());
        Ok(profile)
    }

    /// Reorder `songs` for the given user. Without a uid, or with an
    /// empty candidate list, the input passes through untouched.
    pub async fn rerank(
        &self,
        uid: Option<&str>,
        songs: Vec<Song>,
        options: &RerankOptions,
    ) -> Result<Vec<Song>, RankerError> {
        let Some(uid) = uid.filter(|u| !u.is_empty()) else {
            return Ok(songs);
        };
        if songs.is_empty() {
            return Ok(songs);
        }

        let profile = self.profile_for(uid).await?;
        let mut ctx = FeatureContext::new(
            &profile,
            user_embedding(&profile),
            &options.preferred_languages,
            options.query.as_deref(),
        );
        ctx.total = songs.len();

        let mut scored: Vec<(Song, f64)> = songs
            .into_iter()
            .enumerate()
            .map(|(index, mut song)| {
                let features = compute_features(&song, index, &ctx);
                let preference_match = features.preference_match();
                let rule = 0.4 * features.text_rank
                    + 0.3 * preference_match
                    + 0.2 * features.popularity
                    + 0.1 * features.interaction;
                let neural_score = neural::forward(&features.to_array());
                let final_score =
                    rule.clamp(0.0, 1.0) * RULE_WEIGHT + neural_score * NEURAL_WEIGHT;

                song.ranking = Some(RankingInfo {
                    final_score: round4(final_score),
                    text_rank_score: round4(features.text_rank),
                    preference_match: round4(preference_match),
                    popularity_score: round4(features.popularity),
                    interaction_score: round4(features.interaction),
                    neural_score: round4(neural_score),
                });
                (song, final_score)
            })
            .collect();

        // Stable sort: equal blends keep their upstream order.
        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));

        debug!("reranked {} songs for uid {uid}", scored.len());
        Ok(scored.into_iter().map(|(song, _)| song).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{AlbumRef, ArtistRef, Artists};
    use crate::profile::{
        ActivityEvent, ActivityType, PreferencesUpdate, SongInteraction, UserPreferences,
    };
    use crate::store::StoreError;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct MockProfileStore {
        profile: RealtimeProfile,
        fetches: AtomicUsize,
    }

    impl MockProfileStore {
        fn new(profile: RealtimeProfile) -> Self {
            Self {
                profile,
                fetches: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl ProfileStore for MockProfileStore {
        async fn preferences(&self, _uid: &str) -> Result<Option<UserPreferences>, StoreError> {
            Ok(None)
        }

        async fn save_preferences(
            &self,
            _uid: &str,
            _update: PreferencesUpdate,
        ) -> Result<UserPreferences, StoreError> {
            unimplemented!("not used by reranker tests")
        }

        async fn log_event(
            &self,
            _uid: &str,
            _event: ActivityEvent,
        ) -> Result<String, StoreError> {
            unimplemented!("not used by reranker tests")
        }

        async fn recent_events(
            &self,
            _uid: &str,
            _kind: Option<ActivityType>,
            _limit: usize,
        ) -> Result<Vec<ActivityEvent>, StoreError> {
            Ok(Vec::new())
        }

        async fn top_played_artists(
            &self,
            _uid: &str,
            _limit: usize,
        ) -> Result<Vec<(String, u32)>, StoreError> {
            Ok(Vec::new())
        }

        async fn recent_song_ids(
            &self,
            _uid: &str,
            _kind: ActivityType,
            _limit: usize,
        ) -> Result<Vec<String>, StoreError> {
            Ok(Vec::new())
        }

        async fn realtime_profile(&self, _uid: &str) -> Result<RealtimeProfile, StoreError> {
            self.fetches.fetch_add(1, Ordering::SeqCst);
            Ok(self.profile.clone())
        }
    }

    fn song(id: &str, name: &str, artist: &str, language: &str) -> Song {
        Song {
            id: id.into(),
            name: name.into(),
            language: language.into(),
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

    fn fan_profile() -> RealtimeProfile {
        let mut profile = RealtimeProfile {
            favorite_artists: vec!["Arijit Singh".into()],
            languages: vec!["hindi".into()],
            ..Default::default()
        };
        profile.language_affinity.insert("hindi".into(), 6.0);
        profile.artist_affinity.insert("Arijit Singh".into(), 8.0);
        profile.song_interactions.insert(
            "y1".into(),
            SongInteraction {
                play_count: 5,
                skip_count: 0,
                affinity: 5.0,
                last_played: 1000,
                artist: Some("Arijit Singh".into()),
                language: Some("hindi".into()),
            },
        );
        profile
    }

    fn reranker_with(profile: RealtimeProfile) -> (Reranker, Arc<MockProfileStore>) {
        let store = Arc::new(MockProfileStore::new(profile));
        (Reranker::new(store.clone()).unwrap(), store)
    }

    #[tokio::test]
    async fn test_passthrough_without_uid() {
        let (reranker, store) = reranker_with(fan_profile());
        let songs = vec![song("a", "A", "X", "hindi"), song("b", "B", "Y", "hindi")];
        let out = reranker
            .rerank(None, songs.clone(), &RerankOptions::default())
            .await
            .unwrap();
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].id, "a");
        assert!(out[0].ranking.is_none(), "passthrough must not annotate");
        assert_eq!(store.fetches.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_preferred_candidate_overtakes_upstream_leader() {
        let (reranker, _) = reranker_with(fan_profile());

        // Upstream puts the unrelated song first; the fan profile must
        // pull the favorite-artist song to the top despite its zero
        // text-rank prior.
        let x = song("x1", "Shape of You", "Ed Sheeran", "english");
        let y = song("y1", "Tum Hi Ho", "Arijit Singh", "hindi");

        let options = RerankOptions {
            query: None,
            preferred_languages: vec!["hindi".to_string()],
        };
        let out = reranker
            .rerank(Some("u1"), vec![x, y], &options)
            .await
            .unwrap();

        assert_eq!(out[0].id, "y1");
        assert_eq!(out[1].id, "x1");

        let y_rank = out[0].ranking.as_ref().unwrap();
        let x_rank = out[1].ranking.as_ref().unwrap();
        assert_eq!(x_rank.text_rank_score, 1.0);
        assert_eq!(y_rank.text_rank_score, 0.0);
        assert!(y_rank.final_score > x_rank.final_score);
        assert!(y_rank.preference_match > x_rank.preference_match);
    }

    #[tokio::test]
    async fn test_annotations_are_rounded() {
        let (reranker, _) = reranker_with(fan_profile());
        let out = reranker
            .rerank(
                Some("u1"),
                vec![song("y1", "Tum Hi Ho", "Arijit Singh", "hindi")],
                &RerankOptions::default(),
            )
            .await
            .unwrap();

        let rank = out[0].ranking.as_ref().unwrap();
        for value in [
            rank.final_score,
            rank.text_rank_score,
            rank.preference_match,
            rank.popularity_score,
            rank.interaction_score,
            rank.neural_score,
        ] {
            assert_eq!(value, round4(value), "annotation must be 4-decimal rounded");
        }
    }

    #[tokio::test]
    async fn test_profile_cache_avoids_refetch() {
        let (reranker, store) = reranker_with(fan_profile());
        let songs = vec![song("a", "A", "X", "hindi")];
        reranker
            .rerank(Some("u1"), songs.clone(), &RerankOptions::default())
            .await
            .unwrap();
        reranker
            .rerank(Some("u1"), songs, &RerankOptions::default())
            .await
            .unwrap();
        assert_eq!(store.fetches.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_deterministic_ordering() {
        let (reranker, _) = reranker_with(fan_profile());
        let songs = vec![
            song("a", "Tum Hi Ho", "Arijit Singh", "hindi"),
            song("b", "Kesariya", "Arijit Singh", "hindi"),
            song("c", "Shape of You", "Ed Sheeran", "english"),
        ];
        let options = RerankOptions {
            query: Some("romantic hindi".into()),
            preferred_languages: vec!["hindi".into()],
        };
        let first = reranker
            .rerank(Some("u1"), songs.clone(), &options)
            .await
            .unwrap();
        let second = reranker.rerank(Some("u1"), songs, &options).await.unwrap();
        let first_ids: Vec<_> = first.iter().map(|s| &s.id).collect();
        let second_ids: Vec<_> = second.iter().map(|s| &s.id).collect();
        assert_eq!(first_ids, second_ids);
    }
}
