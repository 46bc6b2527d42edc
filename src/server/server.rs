//! Router assembly and server lifecycle.

use std::sync::Arc;
use std::time::Instant;

use anyhow::Result;
use axum::extract::Request;
use axum::http::{header, StatusCode};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use serde_json::json;
use tracing::{debug, info};

use super::auth::TokenVerifier;
use super::catalog_routes::make_catalog_routes;
use super::language::UserLanguageCache;
use super::recommend_routes::make_recommend_routes;
use super::search_routes::make_search_routes;
use super::state::AppState;
use super::user_routes::make_user_routes;
use crate::catalog::CatalogProvider;
use crate::profile::ProfileStore;
use crate::ranking::Reranker;
use crate::recommend::RecommendationEngine;
use crate::search::{LocalSongIndex, SmartSearchEngine};

pub const SERVICE_NAME: &str = "tunehub-server";

async fn healthz() -> impl IntoResponse {
    Json(json!({
        "ok": true,
        "service": SERVICE_NAME,
        "timestamp": chrono::Utc::now().timestamp_millis(),
    }))
}

async fn health_redirect() -> Response {
    (
        StatusCode::FOUND,
        [(header::LOCATION, "/healthz")],
    )
        .into_response()
}

async fn log_requests(request: Request, next: Next) -> Response {
    let method = request.method().clone();
    let path = request.uri().path().to_string();
    let started = Instant::now();

    let response = next.run(request).await;

    debug!(
        "{} {} -> {} in {:?}",
        method,
        path,
        response.status(),
        started.elapsed()
    );
    response
}

/// Assemble the full application state from its seams.
pub fn make_state(
    provider: Arc<dyn CatalogProvider>,
    profiles: Arc<dyn ProfileStore>,
    verifier: Arc<dyn TokenVerifier>,
) -> Result<AppState> {
    let index = Arc::new(LocalSongIndex::new());
    let search = SmartSearchEngine::new(provider.clone(), index);
    let reranker = Arc::new(Reranker::new(profiles.clone())?);
    let recommendations = Arc::new(RecommendationEngine::new(
        search.clone(),
        provider.clone(),
        profiles.clone(),
        reranker.clone(),
    ));

    Ok(AppState {
        provider,
        search,
        profiles,
        reranker,
        recommendations,
        verifier,
        languages: Arc::new(UserLanguageCache::new()),
        start_time: Instant::now(),
    })
}

pub fn make_app(state: AppState) -> Router {
    let api = Router::new()
        .merge(make_search_routes(state.clone()))
        .merge(make_catalog_routes(state.clone()))
        .merge(make_user_routes(state.clone()))
        .merge(make_recommend_routes(state.clone()));

    Router::new()
        .route("/healthz", get(healthz))
        .route("/health", get(health_redirect))
        .nest("/api", api)
        .layer(middleware::from_fn(log_requests))
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install ctrl-c handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("received ctrl-c, shutting down"),
        _ = terminate => info!("received SIGTERM, shutting down"),
    }
}

pub async fn run_server(state: AppState, port: u16) -> Result<()> {
    let app = make_app(state);
    let listener = tokio::net::TcpListener::bind(("0.0.0.0", port)).await?;
    info!("listening on port {port}");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}
