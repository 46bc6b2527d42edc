pub mod embedding;
pub mod features;
pub mod neural;
mod reranker;

pub use reranker::{
    RankerError, Reranker, RerankOptions, PROFILE_CACHE_CAP, PROFILE_CACHE_TTL,
};
