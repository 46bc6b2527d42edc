use axum::extract::FromRef;
use std::sync::Arc;
use std::time::Instant;

use super::auth::TokenVerifier;
use super::language::UserLanguageCache;
use crate::catalog::CatalogProvider;
use crate::profile::ProfileStore;
use crate::ranking::Reranker;
use crate::recommend::RecommendationEngine;
use crate::search::SmartSearchEngine;

#[derive(Clone)]
pub struct AppState {
    pub provider: Arc<dyn CatalogProvider>,
    pub search: SmartSearchEngine,
    pub profiles: Arc<dyn ProfileStore>,
    pub reranker: Arc<Reranker>,
    pub recommendations: Arc<RecommendationEngine>,
    pub verifier: Arc<dyn TokenVerifier>,
    pub languages: Arc<UserLanguageCache>,
    pub start_time: Instant,
}

impl FromRef<AppState> for Arc<dyn CatalogProvider> {
    fn from_ref(input: &AppState) -> Self {
        input.provider.clone()
    }
}

impl FromRef<AppState> for SmartSearchEngine {
    fn from_ref(input: &AppState) -> Self {
        input.search.clone()
    }
}

impl FromRef<AppState> for Arc<dyn ProfileStore> {
    fn from_ref(input: &AppState) -> Self {
        input.profiles.clone()
    }
}

impl FromRef<AppState> for Arc<RecommendationEngine> {
    fn from_ref(input: &AppState) -> Self {
        input.recommendations.clone()
    }
}
