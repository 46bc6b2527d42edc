mod client;
mod models;

pub use client::{
    CatalogProvider, HttpCatalogClient, Provider, UpstreamError, FALLBACK_TIMEOUT_MS,
    LOOKUP_TIMEOUT_MS, PRIMARY_TIMEOUT_MS,
};
pub use models::{
    AlbumRef, Artist, ArtistRef, Artists, BroadResults, PrimaryPage, QualityUrl, RankingInfo, Song,
};
