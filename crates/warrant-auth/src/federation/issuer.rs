//! Token issuer that trusts peer issuers' keys.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use time::OffsetDateTime;
use tokio::sync::RwLock;
use tracing::Span;

use crate::AuthResult;
use crate::claims::{ClaimRequirement, Claims};
use crate::config::FederationConfig;
use crate::error::AuthError;
use crate::federation::discovery::{Discoverer, StaticDiscoverer};
use crate::federation::merge::{fetch_peer_jwks, merge_jwks, stale_at};
use crate::keys::{Jwks, VerificationKey};
use crate::token::{
    IssuedToken, ParseOptions, RequestScope, SharedIssuer, TokenIssuer, verify_token,
};

/// A merged key set and when to rebuild it.
struct CachedJwks {
    bytes: Vec<u8>,
    keys: Vec<VerificationKey>,
    stale_at: OffsetDateTime,
}

/// Wraps a [`TokenIssuer`] and merges peer key sets into its own.
///
/// Issuance is delegated unchanged. Publication and verification use the
/// merged set, cached until shortly before its earliest expiry, so a token
/// signed by any peer verifies here.
pub struct FederatedTokenIssuer {
    inner: SharedIssuer,
    discoverer: Arc<dyn Discoverer>,
    client: reqwest::Client,
    refresh_interval: Duration,
    refresh_buffer: Duration,
    cache: RwLock<Option<Arc<CachedJwks>>>,
    span: Span,
}

impl FederatedTokenIssuer {
    /// Creates a federated issuer.
    ///
    /// # Errors
    ///
    /// Returns `Configuration` if the HTTP client cannot be built.
    pub fn new(
        inner: SharedIssuer,
        discoverer: Arc<dyn Discoverer>,
        config: &FederationConfig,
    ) -> AuthResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| AuthError::configuration(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            inner,
            discoverer,
            client,
            refresh_interval: config.refresh_interval,
            refresh_buffer: config.refresh_buffer,
            cache: RwLock::new(None),
            span: tracing::info_span!("federated_issuer"),
        })
    }

    /// Creates a federated issuer over the configured static peer list.
    ///
    /// # Errors
    ///
    /// Returns `Configuration` if the HTTP client cannot be built.
    pub fn from_config(inner: SharedIssuer, config: &FederationConfig) -> AuthResult<Self> {
        let discoverer = Arc::new(StaticDiscoverer::new(config.peers.clone()));
        Self::new(inner, discoverer, config)
    }

    /// Wraps `inner` when federation is enabled, otherwise returns it as is.
    ///
    /// # Errors
    ///
    /// Returns `Configuration` if the HTTP client cannot be built.
    pub fn wrap(inner: SharedIssuer, config: &FederationConfig) -> AuthResult<SharedIssuer> {
        if !config.enabled {
            tracing::debug!("Federation disabled, publishing local keys only");
            return Ok(inner);
        }
        Ok(Arc::new(Self::from_config(inner, config)?))
    }

    /// Uses `client` for peer fetches. Its timeout bounds each fetch.
    #[must_use]
    pub fn with_client(mut self, client: reqwest::Client) -> Self {
        self.client = client;
        self
    }

    /// Replaces the span diagnostics are emitted under.
    #[must_use]
    pub fn with_span(mut self, span: Span) -> Self {
        self.span = span;
        self
    }

    /// Drops the cached merge so the next call rebuilds it.
    pub async fn invalidate(&self) {
        *self.cache.write().await = None;
        tracing::debug!(parent: &self.span, "Invalidated merged key set");
    }

    /// Returns the merged key set, rebuilding it when stale.
    ///
    /// # Errors
    ///
    /// Returns an error only if the local key set is unavailable; peer
    /// failures are logged and skipped.
    pub async fn merged_jwks(&self) -> AuthResult<Jwks> {
        let cached = self.merged().await?;
        serde_json::from_slice(&cached.bytes)
            .map_err(|e| AuthError::internal(format!("cached key set is corrupt: {}", e)))
    }

    async fn merged(&self) -> AuthResult<Arc<CachedJwks>> {
        {
            let cache = self.cache.read().await;
            if let Some(cached) = cache.as_ref()
                && OffsetDateTime::now_utc() < cached.stale_at
            {
                tracing::trace!(parent: &self.span, "Merged key set cache hit");
                return Ok(Arc::clone(cached));
            }
        }

        tracing::debug!(parent: &self.span, "Merged key set missing or stale, rebuilding");
        let fresh = Arc::new(self.rebuild().await?);
        *self.cache.write().await = Some(Arc::clone(&fresh));
        Ok(fresh)
    }

    async fn rebuild(&self) -> AuthResult<CachedJwks> {
        let local_bytes = self.inner.public_keys(&RequestScope::local()).await?;
        let local: Jwks = serde_json::from_slice(&local_bytes)
            .map_err(|e| AuthError::internal(format!("local key set is undecodable: {}", e)))?;

        let peers = match self.discoverer.peers().await {
            Ok(peers) => peers,
            Err(e) => {
                tracing::warn!(parent: &self.span, error = %e, "Peer discovery failed, using local keys only");
                Vec::new()
            }
        };

        let mut fetched = Vec::with_capacity(peers.len());
        for peer in &peers {
            match fetch_peer_jwks(&self.client, peer).await {
                Ok(jwks) => {
                    tracing::debug!(parent: &self.span, "Fetched {} keys from peer {}", jwks.keys.len(), peer);
                    fetched.push(jwks);
                }
                Err(e) => {
                    tracing::warn!(parent: &self.span, "Skipping peer {}: {}", peer, e);
                }
            }
        }

        let responded = fetched.len();
        let merged = merge_jwks(local, fetched);

        let now = OffsetDateTime::now_utc();
        let keys = merged
            .keys
            .iter()
            .filter(|jwk| !jwk.is_expired(now))
            .filter_map(|jwk| match jwk.verification_key() {
                Ok(key) => Some(key),
                Err(e) => {
                    tracing::warn!(parent: &self.span, kid = %jwk.kid, error = %e, "Skipping unusable key");
                    None
                }
            })
            .collect::<Vec<_>>();

        let bytes = serde_json::to_vec(&merged)
            .map_err(|e| AuthError::internal(format!("failed to serialize key set: {}", e)))?;
        let stale_at = stale_at(merged.expires(), now, self.refresh_buffer, self.refresh_interval);

        tracing::debug!(
            parent: &self.span,
            peers = peers.len(),
            responded,
            keys = keys.len(),
            stale_at = %stale_at,
            "Merged key set rebuilt"
        );

        Ok(CachedJwks {
            bytes,
            keys,
            stale_at,
        })
    }
}

impl std::fmt::Debug for FederatedTokenIssuer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FederatedTokenIssuer")
            .field("refresh_interval", &self.refresh_interval)
            .field("refresh_buffer", &self.refresh_buffer)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl TokenIssuer for FederatedTokenIssuer {
    async fn issue_token(&self, claims: Claims) -> AuthResult<IssuedToken> {
        self.inner.issue_token(claims).await
    }

    async fn refresh_token(
        &self,
        claims: Claims,
        refresh_token: &str,
        extend: Duration,
    ) -> AuthResult<IssuedToken> {
        self.inner.refresh_token(claims, refresh_token, extend).await
    }

    async fn public_keys(&self, scope: &RequestScope) -> AuthResult<Vec<u8>> {
        if scope.local_only {
            return self.inner.public_keys(scope).await;
        }
        Ok(self.merged().await?.bytes.clone())
    }

    async fn parse_claims(
        &self,
        token: &str,
        requirement: &ClaimRequirement,
        options: &ParseOptions,
    ) -> AuthResult<Claims> {
        let cached = self.merged().await?;

        // A key this node generated after the merge is not cached yet.
        let kid = jsonwebtoken::decode_header(token).ok().and_then(|h| h.kid);
        if let Some(kid) = kid
            && !cached.keys.iter().any(|k| k.kid == kid)
        {
            tracing::debug!(parent: &self.span, kid = %kid, "Key not in merged set, trying local keys");
            return self.inner.parse_claims(token, requirement, options).await;
        }

        let claims = verify_token(token, &cached.keys, options)?;
        requirement.validate(&claims)?;
        Ok(claims)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TrustConfig;
    use crate::keys::{Jwk, KeyCache, KeyFamily, MemoryKeyStore};
    use crate::token::AsymmetricIssuer;
    use url::Url;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const PEER_X: &str = "11qYAYKxCrfVS_7TyWQHOg7hcvPapiMlrwIaaPcHURo";

    /// Publishes a fixed key set and issues nothing.
    struct FixedKeys(Jwks);

    #[async_trait]
    impl TokenIssuer for FixedKeys {
        async fn issue_token(&self, _claims: Claims) -> AuthResult<IssuedToken> {
            Err(AuthError::internal("read-only issuer"))
        }

        async fn refresh_token(
            &self,
            _claims: Claims,
            _refresh_token: &str,
            _extend: Duration,
        ) -> AuthResult<IssuedToken> {
            Err(AuthError::internal("read-only issuer"))
        }

        async fn public_keys(&self, _scope: &RequestScope) -> AuthResult<Vec<u8>> {
            Ok(serde_json::to_vec(&self.0).unwrap())
        }

        async fn parse_claims(
            &self,
            _token: &str,
            _requirement: &ClaimRequirement,
            _options: &ParseOptions,
        ) -> AuthResult<Claims> {
            Err(AuthError::invalid_token("read-only issuer"))
        }
    }

    async fn peer_serving(jwks: &Jwks, fetches: u64) -> MockServer {
        let peer = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/pkeys"))
            .respond_with(ResponseTemplate::new(200).set_body_json(jwks))
            .expect(fetches)
            .mount(&peer)
            .await;
        peer
    }

    async fn fetches(peer: &MockServer) -> usize {
        peer.received_requests().await.unwrap().len()
    }

    struct FailingDiscoverer;

    #[async_trait]
    impl Discoverer for FailingDiscoverer {
        async fn peers(&self) -> AuthResult<Vec<Url>> {
            Err(AuthError::internal("registry unavailable"))
        }
    }

    async fn local_issuer() -> (Arc<KeyCache>, SharedIssuer) {
        let mut config = TrustConfig::default();
        config.signing.family = KeyFamily::EdDsa;
        let cache = Arc::new(KeyCache::new(&config.signing));
        cache.bootstrap(&MemoryKeyStore::new()).await.unwrap();
        let issuer = AsymmetricIssuer::from_config(Arc::clone(&cache), &config);
        (cache, Arc::new(issuer))
    }

    fn federated(inner: SharedIssuer, discoverer: Arc<dyn Discoverer>) -> FederatedTokenIssuer {
        FederatedTokenIssuer::new(inner, discoverer, &FederationConfig::default()).unwrap()
    }

    #[tokio::test]
    async fn test_without_peers_publishes_local_keys() {
        let (cache, inner) = local_issuer().await;
        let issuer = federated(inner, Arc::new(StaticDiscoverer::default()));

        let merged = issuer.merged_jwks().await.unwrap();
        assert_eq!(merged, cache.public_keys().await);

        let bytes = issuer.public_keys(&RequestScope::default()).await.unwrap();
        let published: Jwks = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(published, merged);
    }

    #[tokio::test]
    async fn test_discovery_failure_is_absorbed() {
        let (_, inner) = local_issuer().await;
        let issuer = federated(Arc::clone(&inner), Arc::new(FailingDiscoverer));

        let issued = inner.issue_token(Claims::new().subject("alice")).await.unwrap();
        let claims = issuer
            .parse_claims(&issued.token, &ClaimRequirement::new(), &ParseOptions::default())
            .await
            .unwrap();
        assert_eq!(claims.sub.as_deref(), Some("alice"));
    }

    #[tokio::test]
    async fn test_unreachable_peer_is_skipped() {
        let (_, inner) = local_issuer().await;
        // Port 9 (discard) on loopback refuses connections.
        let peers = vec![Url::parse("http://127.0.0.1:9").unwrap()];
        let issuer = federated(inner, Arc::new(StaticDiscoverer::new(peers)));

        let merged = issuer.merged_jwks().await.unwrap();
        assert_eq!(merged.keys.len(), 1);
    }

    #[tokio::test]
    async fn test_cached_merge_reused_until_invalidated() {
        let (cache, inner) = local_issuer().await;
        let issuer = federated(inner, Arc::new(StaticDiscoverer::default()));

        let first = issuer.merged_jwks().await.unwrap();
        cache.generate().await.unwrap();

        // Still cached: the rotation is not visible yet.
        assert_eq!(issuer.merged_jwks().await.unwrap(), first);

        issuer.invalidate().await;
        assert_eq!(issuer.merged_jwks().await.unwrap().keys.len(), 2);
    }

    #[tokio::test]
    async fn test_new_local_key_verifies_before_cache_refresh() {
        let (cache, inner) = local_issuer().await;
        let issuer = federated(Arc::clone(&inner), Arc::new(StaticDiscoverer::default()));

        issuer.merged_jwks().await.unwrap();
        cache.generate().await.unwrap();

        let issued = inner.issue_token(Claims::new().subject("bob")).await.unwrap();
        let claims = issuer
            .parse_claims(&issued.token, &ClaimRequirement::new(), &ParseOptions::default())
            .await
            .unwrap();
        assert_eq!(claims.sub.as_deref(), Some("bob"));
    }

    #[tokio::test]
    async fn test_local_only_scope_bypasses_merge() {
        let (cache, inner) = local_issuer().await;
        let issuer = federated(inner, Arc::new(StaticDiscoverer::default()));

        let bytes = issuer.public_keys(&RequestScope::local()).await.unwrap();
        let jwks: Jwks = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(jwks, cache.public_keys().await);
        assert!(issuer.cache.read().await.is_none());
    }

    #[tokio::test]
    async fn test_requirement_applied_to_merged_parse() {
        let (_, inner) = local_issuer().await;
        let issuer = federated(Arc::clone(&inner), Arc::new(StaticDiscoverer::default()));

        let issued = inner
            .issue_token(Claims::new().claim("role", "user"))
            .await
            .unwrap();
        let admin = ClaimRequirement::new().with_claim("role", "admin");
        assert!(matches!(
            issuer
                .parse_claims(&issued.token, &admin, &ParseOptions::default())
                .await,
            Err(AuthError::ClaimsNotConform)
        ));
    }

    #[tokio::test]
    async fn test_merge_rebuilt_once_buffered_expiry_passes() {
        let (_, inner) = local_issuer().await;
        let peer_set = Jwks {
            exp: Some(OffsetDateTime::now_utc() + time::Duration::seconds(2)),
            keys: vec![Jwk::okp("peer-key", PEER_X.to_string())],
        };
        let peer = peer_serving(&peer_set, 2).await;

        let config = FederationConfig {
            refresh_buffer: Duration::from_secs(1),
            ..FederationConfig::default()
        };
        let discoverer = Arc::new(StaticDiscoverer::new(vec![Url::parse(&peer.uri()).unwrap()]));
        let issuer = FederatedTokenIssuer::new(inner, discoverer, &config).unwrap();

        let merged = issuer.merged_jwks().await.unwrap();
        assert_eq!(merged.exp, peer_set.exp);
        issuer.merged_jwks().await.unwrap();
        assert_eq!(fetches(&peer).await, 1);

        // Stale one second before the peer's expiry.
        tokio::time::sleep(Duration::from_millis(1500)).await;
        issuer.merged_jwks().await.unwrap();
        assert_eq!(fetches(&peer).await, 2);
    }

    #[tokio::test]
    async fn test_merge_without_expiry_uses_refresh_interval() {
        let local = Jwks {
            exp: None,
            keys: vec![Jwk::okp("local-key", PEER_X.to_string())],
        };
        let peer_set = Jwks {
            exp: Some(OffsetDateTime::UNIX_EPOCH),
            keys: vec![Jwk::okp("peer-key", PEER_X.to_string())],
        };
        let peer = peer_serving(&peer_set, 2).await;

        let config = FederationConfig {
            refresh_interval: Duration::from_secs(1),
            ..FederationConfig::default()
        };
        let discoverer = Arc::new(StaticDiscoverer::new(vec![Url::parse(&peer.uri()).unwrap()]));
        let issuer =
            FederatedTokenIssuer::new(Arc::new(FixedKeys(local)), discoverer, &config).unwrap();

        let merged = issuer.merged_jwks().await.unwrap();
        assert_eq!(merged.exp, None);
        assert_eq!(merged.keys.len(), 2);
        issuer.merged_jwks().await.unwrap();
        assert_eq!(fetches(&peer).await, 1);

        tokio::time::sleep(Duration::from_millis(1200)).await;
        issuer.merged_jwks().await.unwrap();
        assert_eq!(fetches(&peer).await, 2);
    }

    #[tokio::test]
    async fn test_wrap_honours_enabled_flag() {
        let (_, inner) = local_issuer().await;

        let disabled = FederationConfig::default();
        let wrapped = FederatedTokenIssuer::wrap(Arc::clone(&inner), &disabled).unwrap();
        assert!(Arc::ptr_eq(&wrapped, &inner));

        let enabled = FederationConfig {
            enabled: true,
            ..FederationConfig::default()
        };
        let wrapped = FederatedTokenIssuer::wrap(Arc::clone(&inner), &enabled).unwrap();
        assert!(!Arc::ptr_eq(&wrapped, &inner));
    }
}
