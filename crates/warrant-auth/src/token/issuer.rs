//! Token issuer backed by the local key cache.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use jsonwebtoken::{Header, encode};
use rand::RngCore;
use rand::rngs::OsRng;
use tracing::Span;

use crate::AuthResult;
use crate::claims::{ClaimRequirement, Claims, unix_in, unix_now};
use crate::config::{RefreshConfig, TrustConfig};
use crate::error::AuthError;
use crate::keys::KeyCache;
use crate::token::{IssuedToken, ParseOptions, RequestScope, TokenIssuer};

/// Issues tokens signed with the current key of a [`KeyCache`].
///
/// Refresh limits are enforced from the count claim carried in the token
/// itself; no refresh ledger is kept.
#[derive(Debug)]
pub struct AsymmetricIssuer {
    cache: Arc<KeyCache>,
    refresh: RefreshConfig,
    token_lifetime: Duration,
    span: Span,
}

impl AsymmetricIssuer {
    /// Creates an issuer.
    ///
    /// `token_lifetime` is the expiry given to tokens issued without one.
    #[must_use]
    pub fn new(cache: Arc<KeyCache>, refresh: RefreshConfig, token_lifetime: Duration) -> Self {
        Self {
            cache,
            refresh,
            token_lifetime,
            span: tracing::info_span!("token_issuer"),
        }
    }

    /// Creates an issuer from the signing and refresh configuration.
    #[must_use]
    pub fn from_config(cache: Arc<KeyCache>, config: &TrustConfig) -> Self {
        Self::new(cache, config.refresh.clone(), config.signing.token_lifetime)
    }

    /// Replaces the span diagnostics are emitted under.
    #[must_use]
    pub fn with_span(mut self, span: Span) -> Self {
        self.span = span;
        self
    }

    /// Returns the key cache.
    #[must_use]
    pub fn cache(&self) -> &Arc<KeyCache> {
        &self.cache
    }

    /// Refreshes with the configured `extend_time`.
    ///
    /// # Errors
    ///
    /// See [`TokenIssuer::refresh_token`].
    pub async fn refresh(&self, claims: Claims, refresh_token: &str) -> AuthResult<IssuedToken> {
        self.refresh_token(claims, refresh_token, self.refresh.extend_time)
            .await
    }

    async fn sign(&self, mut claims: Claims) -> AuthResult<IssuedToken> {
        let key = self.cache.current_key().await?;

        let iat = *claims.iat.get_or_insert_with(unix_now);
        let exp = *claims.exp.get_or_insert_with(|| unix_in(self.token_lifetime));

        let mut header = Header::new(key.signing_method());
        header.kid = Some(key.kid().to_string());

        let token = encode(&header, &claims, key.encoding_key())
            .map_err(|e| AuthError::internal(format!("failed to sign token: {}", e)))?;

        tracing::debug!(
            parent: &self.span,
            kid = %key.kid(),
            sub = ?claims.sub,
            iat,
            exp,
            "Issued token"
        );

        Ok(IssuedToken {
            token,
            refresh_token: generate_refresh_token(self.cache.refresh_size()),
            kid: key.kid().to_string(),
            claims,
        })
    }

    fn check_refresh_token(&self, refresh_token: &str) -> AuthResult<()> {
        let bytes = URL_SAFE_NO_PAD
            .decode(refresh_token)
            .map_err(|e| AuthError::invalid_refresh_token(e.to_string()))?;

        let expected = self.cache.refresh_size();
        if bytes.len() != expected {
            return Err(AuthError::invalid_refresh_token(format!(
                "expected {} bytes, got {}",
                expected,
                bytes.len()
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl TokenIssuer for AsymmetricIssuer {
    async fn issue_token(&self, claims: Claims) -> AuthResult<IssuedToken> {
        self.sign(claims).await
    }

    async fn refresh_token(
        &self,
        mut claims: Claims,
        refresh_token: &str,
        extend: Duration,
    ) -> AuthResult<IssuedToken> {
        self.check_refresh_token(refresh_token)?;

        let key = self.refresh.count_claim.as_str();
        let count = claims
            .get(key)
            .and_then(|v| v.parse::<u32>().ok())
            .unwrap_or(0);

        if let Some(limit) = self.refresh.limit
            && count >= limit
        {
            tracing::warn!(parent: &self.span, sub = ?claims.sub, count, limit, "Refresh limit exceeded");
            return Err(AuthError::RefreshLimitExceeded { count, limit });
        }

        claims.set(key, count.saturating_add(1).to_string());
        claims.iat = Some(unix_now());
        claims.exp = Some(unix_in(extend));
        self.sign(claims).await
    }

    async fn public_keys(&self, _scope: &RequestScope) -> AuthResult<Vec<u8>> {
        let jwks = self.cache.public_keys().await;
        serde_json::to_vec(&jwks)
            .map_err(|e| AuthError::internal(format!("failed to serialize key set: {}", e)))
    }

    async fn parse_claims(
        &self,
        token: &str,
        requirement: &ClaimRequirement,
        options: &ParseOptions,
    ) -> AuthResult<Claims> {
        self.cache.parse_claims(token, requirement, options).await
    }
}

/// Generates `size` random bytes encoded as base64url.
fn generate_refresh_token(size: usize) -> String {
    let mut bytes = vec![0u8; size];
    OsRng.fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}
