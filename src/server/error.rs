//! API error type and its wire representation.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;
use tracing::error;

use crate::catalog::UpstreamError;
use crate::search::SearchError;
use crate::store::StoreError;

/// Errors surfaced by the HTTP layer as `{error, message}` bodies.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    InvalidInput(String),

    #[error("missing or invalid bearer token")]
    Unauthorized,

    #[error("{0}")]
    NotFound(String),

    #[error(transparent)]
    Upstream(#[from] UpstreamError),

    #[error(transparent)]
    Search(#[from] SearchError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            ApiError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            ApiError::Unauthorized => StatusCode::UNAUTHORIZED,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Upstream(_) | ApiError::Search(_) | ApiError::Store(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    fn slug(&self) -> &'static str {
        match self {
            ApiError::InvalidInput(_) => "invalid_input",
            ApiError::Unauthorized => "unauthorized",
            ApiError::NotFound(_) => "not_found",
            ApiError::Upstream(_) => "upstream_failure",
            ApiError::Search(_) => "search_failure",
            ApiError::Store(_) => "store_failure",
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!("request failed: {self}");
        }
        let body = Json(json!({
            "error": self.slug(),
            "message": self.to_string(),
        }));
        (status, body).into_response()
    }
}
