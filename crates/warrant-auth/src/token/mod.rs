//! Token issuance and verification.
//!
//! - [`TokenIssuer`] - Issue, refresh and verify tokens; publish keys
//! - [`AsymmetricIssuer`] - Issuer backed by a local [`KeyCache`](crate::keys::KeyCache)
//! - [`verify_token`] - Signature verification against a key set

pub mod issuer;
pub mod verify;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::http::Extensions;

use crate::AuthResult;
use crate::claims::{ClaimRequirement, Claims};

pub use issuer::AsymmetricIssuer;
pub use verify::verify_token;

/// A signed token plus its companion refresh token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IssuedToken {
    /// Compact JWT.
    pub token: String,
    /// Opaque random refresh token, never embedded in `token`.
    pub refresh_token: String,
    /// ID of the key that signed `token`.
    pub kid: String,
    /// The claims as signed.
    pub claims: Claims,
}

/// Options for token parsing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParseOptions {
    /// Accept tokens whose `exp` has passed. The signature is still checked.
    pub allow_expired: bool,
    /// Clock skew tolerated for `exp` and `nbf`.
    pub leeway: Duration,
}

impl Default for ParseOptions {
    fn default() -> Self {
        Self {
            allow_expired: false,
            leeway: Duration::from_secs(60),
        }
    }
}

impl ParseOptions {
    /// Options for parsing a token that is about to be refreshed.
    #[must_use]
    pub fn allow_expired() -> Self {
        Self {
            allow_expired: true,
            ..Self::default()
        }
    }
}

/// Per-request flags.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RequestScope {
    /// Only this node's own keys; set when answering a peer's fetch.
    pub local_only: bool,
}

impl RequestScope {
    /// Scope for a peer fetch.
    #[must_use]
    pub fn local() -> Self {
        Self { local_only: true }
    }
}

/// Issues and verifies tokens.
#[async_trait]
pub trait TokenIssuer: Send + Sync {
    /// Signs `claims` with the current key and pairs it with a fresh
    /// refresh token. Missing `iat` and `exp` are filled in.
    ///
    /// # Errors
    ///
    /// Returns an error if no signing key is available or signing fails.
    async fn issue_token(&self, claims: Claims) -> AuthResult<IssuedToken>;

    /// Re-issues `claims` expiring `extend` from now and increments the
    /// refresh count claim.
    ///
    /// # Errors
    ///
    /// Returns `InvalidRefreshToken` if `refresh_token` is malformed and
    /// `RefreshLimitExceeded` if the count already reached the limit.
    async fn refresh_token(
        &self,
        claims: Claims,
        refresh_token: &str,
        extend: Duration,
    ) -> AuthResult<IssuedToken>;

    /// Returns the serialized public key set.
    ///
    /// # Errors
    ///
    /// Returns an error if the key set cannot be produced.
    async fn public_keys(&self, scope: &RequestScope) -> AuthResult<Vec<u8>>;

    /// Verifies `token` and checks `requirement` against its claims.
    ///
    /// # Errors
    ///
    /// Returns `InvalidToken` or `ClaimsNotConform`.
    async fn parse_claims(
        &self,
        token: &str,
        requirement: &ClaimRequirement,
        options: &ParseOptions,
    ) -> AuthResult<Claims>;
}

/// Shared issuer handle.
pub type SharedIssuer = Arc<dyn TokenIssuer>;

#[derive(Clone)]
struct IssuerExtension(SharedIssuer);

/// Makes `issuer` available to downstream handlers of a request.
pub fn attach_issuer(extensions: &mut Extensions, issuer: SharedIssuer) {
    extensions.insert(IssuerExtension(issuer));
}

/// Returns the issuer attached with [`attach_issuer`], if any.
#[must_use]
pub fn issuer_from_extensions(extensions: &Extensions) -> Option<SharedIssuer> {
    extensions
        .get::<IssuerExtension>()
        .map(|ext| Arc::clone(&ext.0))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TrustConfig;
    use crate::keys::{KeyCache, KeyFamily, MemoryKeyStore};

    #[tokio::test]
    async fn test_issuer_round_trips_through_extensions() {
        let mut config = TrustConfig::default();
        config.signing.family = KeyFamily::EdDsa;
        let cache = Arc::new(KeyCache::new(&config.signing));
        cache.bootstrap(&MemoryKeyStore::new()).await.unwrap();
        let issuer: SharedIssuer = Arc::new(AsymmetricIssuer::from_config(cache, &config));

        let mut extensions = Extensions::new();
        assert!(issuer_from_extensions(&extensions).is_none());

        attach_issuer(&mut extensions, Arc::clone(&issuer));
        let found = issuer_from_extensions(&extensions).unwrap();

        let issued = found.issue_token(Claims::new().subject("alice")).await.unwrap();
        let claims = issuer
            .parse_claims(&issued.token, &ClaimRequirement::new(), &ParseOptions::default())
            .await
            .unwrap();
        assert_eq!(claims.sub.as_deref(), Some("alice"));
    }

    #[test]
    fn test_scope_and_options() {
        assert!(!RequestScope::default().local_only);
        assert!(RequestScope::local().local_only);
        assert!(ParseOptions::allow_expired().allow_expired);
        assert!(!ParseOptions::default().allow_expired);
    }
}
