//! Bearer-token authentication.
//!
//! Token issuance and validation belong to an external identity
//! provider; the server only needs a [`TokenVerifier`] seam and an
//! extractor. Routes take `Session` when auth is required and
//! `Option<Session>` when it is optional.

use async_trait::async_trait;
use axum::extract::{FromRequestParts, OptionalFromRequestParts};
use axum::http::{header, request::Parts};
use std::convert::Infallible;
use tracing::debug;

use super::error::ApiError;
use super::state::AppState;

/// The identity attached to a verified token.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub uid: String,
    pub email: Option<String>,
    pub display_name: Option<String>,
}

/// Validates bearer tokens against the identity provider.
#[async_trait]
pub trait TokenVerifier: Send + Sync {
    /// `None` means the token is missing, expired or forged.
    async fn verify(&self, token: &str) -> Option<AuthUser>;
}

/// Development verifier accepting tokens of the form `local:<uid>`.
/// Stands in for the real identity provider in local runs and tests.
pub struct LocalTokenVerifier;

#[async_trait]
impl TokenVerifier for LocalTokenVerifier {
    async fn verify(&self, token: &str) -> Option<AuthUser> {
        let uid = token.strip_prefix("local:")?.trim();
        if uid.is_empty() {
            return None;
        }
        Some(AuthUser {
            uid: uid.to_string(),
            email: None,
            display_name: None,
        })
    }
}

/// An authenticated request.
#[derive(Debug, Clone)]
pub struct Session {
    pub user: AuthUser,
}

impl Session {
    pub fn uid(&self) -> &str {
        &self.user.uid
    }
}

fn bearer_token(parts: &Parts) -> Option<String> {
    parts
        .headers
        .get(header::AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
}

async fn extract_session(parts: &Parts, state: &AppState) -> Option<Session> {
    let token = match bearer_token(parts) {
        Some(token) => token,
        None => {
            debug!("no bearer token on request");
            return None;
        }
    };
    let user = state.verifier.verify(&token).await?;
    Some(Session { user })
}

impl FromRequestParts<AppState> for Session {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        extract_session(parts, state)
            .await
            .ok_or(ApiError::Unauthorized)
    }
}

impl OptionalFromRequestParts<AppState> for Session {
    type Rejection = Infallible;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Option<Self>, Self::Rejection> {
        // Optional-auth routes treat a bad token like no token.
        Ok(extract_session(parts, state).await)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_local_verifier_accepts_prefixed_tokens() {
        let verifier = LocalTokenVerifier;
        let user = verifier.verify("local:u1").await.unwrap();
        assert_eq!(user.uid, "u1");
        assert!(verifier.verify("u1").await.is_none());
        assert!(verifier.verify("local:").await.is_none());
    }
}
