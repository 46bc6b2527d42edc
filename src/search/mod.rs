mod cache;
mod engine;
mod local_index;
mod scoring;
pub mod text;
mod variants;

pub use cache::{Freshness, TieredCache, FRESH_TTL, STALE_TTL};
pub use engine::{
    SearchError, SearchOptions, SmartSearchEngine, MAX_SMART_RESULTS, SMART_MAX_LATENCY,
    SMART_MIN_RESULTS,
};
pub use local_index::{LocalSongIndex, LOCAL_INDEX_CAP, LOCAL_SEARCH_CAP};
pub use scoring::{MatchTier, QueryContext, ScoredSong, SongSource};
pub use variants::{generate_variants, MAX_VARIANTS};
