//! The smart search pipeline: cache policy, local-index fast path,
//! variant fan-out to the upstream catalogs, and tier-major ranking.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use futures::future::{BoxFuture, FutureExt, Shared};
use thiserror::Error;
use tracing::{debug, warn};

use super::cache::{Freshness, TieredCache, FRESH_TTL, STALE_TTL};
use super::local_index::LocalSongIndex;
use super::scoring::{
    add_ranked_songs, add_scored, into_sorted, MatchTier, QueryContext, ScoredSong, SongSource,
};
use super::text;
use super::variants::generate_variants;
use crate::catalog::{CatalogProvider, Song, UpstreamError};

/// Hard cap on the ranked result list.
pub const MAX_SMART_RESULTS: usize = 40;

/// Ranked-set size at which the variant loop stops early.
pub const SMART_MIN_RESULTS: usize = 8;

/// Latency budget for the upstream loop.
pub const SMART_MAX_LATENCY: Duration = Duration::from_millis(3200);

const SEARCH_CACHE_CAP: usize = 512;

/// Search failure surfaced to callers. Individual provider errors are
/// absorbed as long as any provider yields data; this fires only when
/// every attempted provider failed and nothing was ranked.
#[derive(Debug, Clone, Error)]
pub enum SearchError {
    #[error("all catalog providers failed for \"{query}\": {detail}")]
    AllProvidersFailed { query: String, detail: String },
}

/// Caller-supplied search options.
#[derive(Debug, Clone, Default)]
pub struct SearchOptions {
    /// Recompute synchronously instead of serving a stale entry.
    pub wait_for_fresh: bool,
    pub preferred_languages: Vec<String>,
}

type RefreshFuture = Shared<BoxFuture<'static, Result<Vec<Song>, SearchError>>>;

struct EngineInner {
    provider: Arc<dyn CatalogProvider>,
    index: Arc<LocalSongIndex>,
    cache: TieredCache<String, Arc<Vec<Song>>>,
    in_flight: Mutex<HashMap<String, RefreshFuture>>,
}

/// Cache-backed, multi-provider, variant-rewriting search engine.
///
/// Cheap to clone; all state is shared.
#[derive(Clone)]
pub struct SmartSearchEngine {
    inner: Arc<EngineInner>,
}

fn cache_key(normalized_query: &str, preferred_languages: &[String]) -> String {
    let mut languages: Vec<String> = preferred_languages
        .iter()
        .map(|l| l.trim().to_lowercase())
        .filter(|l| !l.is_empty())
        .collect();
    languages.sort();
    languages.dedup();

    if languages.is_empty() {
        format!("{normalized_query}|_")
    } else {
        format!("{normalized_query}|{}", languages.join(","))
    }
}

impl SmartSearchEngine {
    pub fn new(provider: Arc<dyn CatalogProvider>, index: Arc<LocalSongIndex>) -> Self {
        Self {
            inner: Arc::new(EngineInner {
                provider,
                index,
                cache: TieredCache::new(FRESH_TTL, STALE_TTL, SEARCH_CACHE_CAP),
                in_flight: Mutex::new(HashMap::new()),
            }),
        }
    }

    pub fn index(&self) -> &LocalSongIndex {
        &self.inner.index
    }

    /// Ranked, deduplicated search returning at most
    /// [`MAX_SMART_RESULTS`] songs.
    pub async fn smart_search(
        &self,
        query: &str,
        options: SearchOptions,
    ) -> Result<Vec<Song>, SearchError> {
        let normalized = text::normalize(query);
        if normalized.is_empty() {
            return Ok(Vec::new());
        }
        let key = cache_key(&normalized, &options.preferred_languages);

        let cached = self.inner.cache.get(&key);
        if let Some((songs, freshness)) = &cached {
            match freshness {
                Freshness::Fresh => return Ok(songs.as_ref().clone()),
                Freshness::Stale if !options.wait_for_fresh => {
                    // Serve stale data now; revalidate off the request
                    // path. Single-flight keeps concurrent revalidations
                    // collapsed to one.
                    let refresh = self.refresh_shared(
                        key,
                        normalized,
                        options.preferred_languages.clone(),
                    );
                    tokio::spawn(async move {
                        if let Err(err) = refresh.await {
                            warn!("background search refresh failed: {err}");
                        }
                    });
                    return Ok(songs.as_ref().clone());
                }
                Freshness::Stale => {}
            }
        }

        let refresh = self.refresh_shared(key, normalized, options.preferred_languages.clone());
        match refresh.await {
            Ok(songs) => Ok(songs),
            Err(err) => match cached {
                // A failed refresh never evicts stale data.
                Some((songs, _)) => {
                    warn!("search refresh failed, serving stale entry: {err}");
                    Ok(songs.as_ref().clone())
                }
                None => Err(err),
            },
        }
    }

    /// Get or start the single in-flight computation for a cache key.
    fn refresh_shared(
        &self,
        key: String,
        query: String,
        preferred_languages: Vec<String>,
    ) -> RefreshFuture {
        let mut in_flight = self.inner.in_flight.lock().unwrap();
        if let Some(existing) = in_flight.get(&key) {
            return existing.clone();
        }

        let engine = self.clone();
        let task_key = key.clone();
        let future: BoxFuture<'static, Result<Vec<Song>, SearchError>> = Box::pin(async move {
            let result = engine.compute(&query, &preferred_languages).await;
            if let Ok(songs) = &result {
                engine
                    .inner
                    .cache
                    .put(task_key.clone(), Arc::new(songs.clone()));
            }
            // Completion, success or failure, clears the marker.
            engine.inner.in_flight.lock().unwrap().remove(&task_key);
            result
        });
        let shared = future.shared();
        in_flight.insert(key, shared.clone());
        shared
    }

    async fn compute(
        &self,
        query: &str,
        preferred_languages: &[String],
    ) -> Result<Vec<Song>, SearchError> {
        let started = Instant::now();
        let variants = generate_variants(query);
        if variants.is_empty() {
            return Ok(Vec::new());
        }

        let mut ranked: HashMap<String, ScoredSong> = HashMap::new();

        // Zero-latency first pass over the local index.
        let base_ctx = QueryContext::new(query, preferred_languages);
        let local = self.inner.index.search_local(&base_ctx);
        let strong_local = local
            .iter()
            .filter(|s| s.tier <= MatchTier::Contains)
            .count();
        for candidate in local {
            add_scored(&mut ranked, candidate);
        }
        if strong_local >= SMART_MIN_RESULTS {
            debug!("local index satisfied \"{query}\" with {strong_local} strong matches");
            return Ok(finalize(ranked));
        }

        let mut attempted = false;
        let mut succeeded = false;
        let mut last_error: Option<UpstreamError> = None;

        for (i, variant) in variants.iter().enumerate() {
            let ctx = QueryContext::new(variant, preferred_languages);
            let want_broad = i < 2 || ranked.len() < SMART_MIN_RESULTS;
            let want_fallback = i == 0 || ranked.len() < SMART_MIN_RESULTS / 2;
            attempted = true;

            let primary = self.inner.provider.primary_songs(variant, 1);
            let broad = async {
                if want_broad {
                    Some(self.inner.provider.broad_search(variant, 1).await)
                } else {
                    None
                }
            };
            let fallback = async {
                if want_fallback {
                    Some(self.inner.provider.fallback_songs(variant).await)
                } else {
                    None
                }
            };
            let (primary, broad, fallback) = tokio::join!(primary, broad, fallback);

            // Results may arrive in any order; merging happens in the
            // fixed primary, broad, fallback order so scoring stays
            // stable.
            match primary {
                Ok(page) => {
                    succeeded = true;
                    self.inner.index.upsert_all(&page.songs);
                    add_ranked_songs(&mut ranked, page.songs, &ctx, SongSource::Primary, i);
                }
                Err(err) => {
                    debug!("primary songs failed for variant \"{variant}\": {err}");
                    last_error = Some(err);
                }
            }
            if let Some(result) = broad {
                match result {
                    Ok(results) => {
                        succeeded = true;
                        self.inner.index.upsert_all(&results.songs);
                        add_ranked_songs(&mut ranked, results.songs, &ctx, SongSource::Broad, i);
                    }
                    Err(err) => {
                        debug!("broad search failed for variant \"{variant}\": {err}");
                        last_error = Some(err);
                    }
                }
            }
            if let Some(result) = fallback {
                match result {
                    Ok(songs) => {
                        succeeded = true;
                        self.inner.index.upsert_all(&songs);
                        add_ranked_songs(&mut ranked, songs, &ctx, SongSource::Fallback, i);
                    }
                    Err(err) => {
                        debug!("fallback search failed for variant \"{variant}\": {err}");
                        last_error = Some(err);
                    }
                }
            }

            if ranked.len() >= SMART_MIN_RESULTS {
                break;
            }
            if started.elapsed() >= SMART_MAX_LATENCY && !ranked.is_empty() {
                debug!("latency budget exhausted for \"{query}\" after variant {i}");
                break;
            }
        }

        // One last broad pass on the original query when nothing matched
        // exactly.
        let has_exact = ranked.values().any(|s| s.tier == MatchTier::Exact);
        if !has_exact {
            attempted = true;
            let ctx = QueryContext::new(query, preferred_languages);
            let (broad, fallback) = tokio::join!(
                self.inner.provider.broad_search(query, 1),
                self.inner.provider.fallback_songs(query)
            );
            match broad {
                Ok(results) => {
                    succeeded = true;
                    self.inner.index.upsert_all(&results.songs);
                    add_ranked_songs(&mut ranked, results.songs, &ctx, SongSource::Broad, 0);
                }
                Err(err) => last_error = Some(err),
            }
            match fallback {
                Ok(songs) => {
                    succeeded = true;
                    self.inner.index.upsert_all(&songs);
                    add_ranked_songs(&mut ranked, songs, &ctx, SongSource::Fallback, 0);
                }
                Err(err) => last_error = Some(err),
            }
        }

        if ranked.is_empty() && attempted && !succeeded {
            return Err(SearchError::AllProvidersFailed {
                query: query.to_string(),
                detail: last_error
                    .map(|e| e.to_string())
                    .unwrap_or_else(|| "no provider responded".to_string()),
            });
        }

        Ok(finalize(ranked))
    }

    #[cfg(test)]
    fn seed_cache(&self, query: &str, languages: &[String], songs: Vec<Song>, age: Duration) {
        let key = cache_key(&text::normalize(query), languages);
        self.inner.cache.put_with_age(key, Arc::new(songs), age);
    }
}

fn finalize(ranked: HashMap<String, ScoredSong>) -> Vec<Song> {
    into_sorted(ranked)
        .into_iter()
        .map(|s| s.song)
        .take(MAX_SMART_RESULTS)
        .collect()
}
