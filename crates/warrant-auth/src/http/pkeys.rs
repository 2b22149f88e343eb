//! Public key set endpoint.
//!
//! `GET /api/pkeys` returns the key set this node verifies with: its own
//! keys plus, for a federated issuer, every peer's. `?local=true` restricts
//! the answer to this node's own keys; peers use it when merging so that
//! fetches never recurse.

use axum::Router;
use axum::extract::{Query, State};
use axum::http::header;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use serde::Deserialize;

use crate::error::AuthError;
use crate::federation::merge::PKEYS_PATH;
use crate::token::{RequestScope, SharedIssuer};

/// State for the key set endpoint.
#[derive(Clone)]
pub struct PkeysState {
    /// The issuer whose keys are published.
    pub issuer: SharedIssuer,
}

impl PkeysState {
    /// Creates a new key set state.
    pub fn new(issuer: SharedIssuer) -> Self {
        Self { issuer }
    }
}

/// Query parameters for the key set endpoint.
#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct PkeysQuery {
    /// Only this node's own keys.
    #[serde(default)]
    pub local: bool,
}

impl From<PkeysQuery> for RequestScope {
    fn from(query: PkeysQuery) -> Self {
        Self {
            local_only: query.local,
        }
    }
}

/// Handler for `GET /api/pkeys`.
pub async fn pkeys_handler(
    State(state): State<PkeysState>,
    Query(query): Query<PkeysQuery>,
) -> Result<Response, AuthError> {
    let bytes = state.issuer.public_keys(&query.into()).await?;
    Ok(([(header::CONTENT_TYPE, "application/json")], bytes).into_response())
}

/// Router serving the key set endpoint for `issuer`.
pub fn pkeys_router(issuer: SharedIssuer) -> Router {
    Router::new()
        .route(PKEYS_PATH, get(pkeys_handler))
        .with_state(PkeysState::new(issuer))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use axum::body::{Body, to_bytes};
    use axum::http::{Request, StatusCode};
    use tower::ServiceExt;

    use crate::config::TrustConfig;
    use crate::keys::{Jwks, KeyCache, KeyFamily, MemoryKeyStore};
    use crate::token::AsymmetricIssuer;

    async fn issuer() -> (Arc<KeyCache>, SharedIssuer) {
        let mut config = TrustConfig::default();
        config.signing.family = KeyFamily::Ecdsa;
        let cache = Arc::new(KeyCache::new(&config.signing));
        cache.bootstrap(&MemoryKeyStore::new()).await.unwrap();
        let issuer = AsymmetricIssuer::from_config(Arc::clone(&cache), &config);
        (cache, Arc::new(issuer))
    }

    async fn get_jwks(router: Router, uri: &str) -> (StatusCode, Option<String>, Jwks) {
        let response = router
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let content_type = response
            .headers()
            .get(header::CONTENT_TYPE)
            .map(|v| v.to_str().unwrap().to_string());
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, content_type, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn test_pkeys_returns_key_set() {
        let (cache, issuer) = issuer().await;
        let (status, content_type, jwks) = get_jwks(pkeys_router(issuer), "/api/pkeys").await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(content_type.as_deref(), Some("application/json"));
        assert_eq!(jwks, cache.public_keys().await);
        assert_eq!(jwks.keys[0].kty, "EC");
        assert_eq!(jwks.keys[0].crv.as_deref(), Some("P-256"));
    }

    #[tokio::test]
    async fn test_pkeys_local_flag() {
        let (cache, issuer) = issuer().await;
        let (status, _, jwks) =
            get_jwks(pkeys_router(issuer), "/api/pkeys?local=true").await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(jwks, cache.public_keys().await);
    }

    #[tokio::test]
    async fn test_pkeys_rejects_bad_query() {
        let (_, issuer) = issuer().await;
        let response = pkeys_router(issuer)
            .oneshot(
                Request::builder()
                    .uri("/api/pkeys?local=maybe")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn test_query_to_scope() {
        let scope: RequestScope = PkeysQuery { local: true }.into();
        assert!(scope.local_only);
        assert!(!RequestScope::from(PkeysQuery::default()).local_only);
    }
}
