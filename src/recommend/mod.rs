mod generator;
mod next_track;

pub use generator::{
    build_seed_queries, RecommendationEngine, MAX_SEED_QUERIES, PRE_RERANK_CAP,
};
pub use next_track::canonical_title;
