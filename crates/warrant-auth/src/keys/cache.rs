//! The ordered set of live signing keys.
//!
//! Keys are kept oldest first. The last entry is the current key: it signs
//! every new token. Older keys stay until their `expires` passes so tokens
//! they signed keep verifying through the overlap window.

use std::sync::Arc;
use std::time::Duration;

use time::OffsetDateTime;
use tokio::sync::RwLock;
use tracing::Span;

use crate::AuthResult;
use crate::claims::{ClaimRequirement, Claims};
use crate::config::SigningConfig;
use crate::error::AuthError;
use crate::keys::{Jwks, KeyFamily, KeyMaterial, KeyPair, KeyStore, VerificationKey};
use crate::token::ParseOptions;
use crate::token::verify::verify_token;

/// Signing keys for one key family.
///
/// Reads (`current_key`, `public_keys`, `parse_claims`) share a read lock.
/// `bootstrap`, `generate` and `clean` take the write lock.
#[derive(Debug)]
pub struct KeyCache {
    family: KeyFamily,
    key_size: u16,
    key_duration: Duration,
    overlap: Duration,
    keys: RwLock<Vec<Arc<KeyPair>>>,
    span: Span,
}

impl KeyCache {
    /// Creates an empty cache. Call [`bootstrap`](Self::bootstrap) before use.
    #[must_use]
    pub fn new(config: &SigningConfig) -> Self {
        let key_size = config.family.resolve_size(config.key_size);
        Self {
            family: config.family,
            key_size,
            key_duration: config.key_duration,
            overlap: config.overlap(),
            keys: RwLock::new(Vec::new()),
            span: tracing::info_span!("key_cache", family = %config.family, key_size),
        }
    }

    /// Replaces the span diagnostics are emitted under.
    #[must_use]
    pub fn with_span(mut self, span: Span) -> Self {
        self.span = span;
        self
    }

    /// Returns the key family.
    #[must_use]
    pub fn family(&self) -> KeyFamily {
        self.family
    }

    /// Returns the resolved key size.
    #[must_use]
    pub fn key_size(&self) -> u16 {
        self.key_size
    }

    /// Number of random bytes in refresh tokens issued with these keys.
    #[must_use]
    pub fn refresh_size(&self) -> usize {
        self.family.refresh_size(self.key_size)
    }

    /// Loads the latest persisted key, or generates and persists a new one
    /// when the store is empty or its latest key has expired.
    ///
    /// # Errors
    ///
    /// Returns `Storage` if the store fails, `KeyDecode` if the persisted
    /// key is corrupt, and `KeyGeneration` if a new key cannot be created.
    pub async fn bootstrap(&self, store: &dyn KeyStore) -> AuthResult<Arc<KeyPair>> {
        let mut keys = self.keys.write().await;
        let now = OffsetDateTime::now_utc();

        let pair = match store.latest().await? {
            Some(record) if record.expires > now => {
                let pair = KeyPair::from_stored(self.family, self.key_size, &record)?;
                tracing::info!(
                    parent: &self.span,
                    kid = %pair.kid(),
                    expires = %pair.expires,
                    "Loaded persisted signing key"
                );
                pair
            }
            latest => {
                if latest.is_some() {
                    tracing::info!(parent: &self.span, "Persisted signing key expired, replacing");
                }
                let pair = self.new_pair().await?;
                store.create(&pair.to_stored()?).await?;
                tracing::info!(
                    parent: &self.span,
                    kid = %pair.kid(),
                    expires = %pair.expires,
                    "Generated initial signing key"
                );
                pair
            }
        };

        let pair = Arc::new(pair);
        keys.clear();
        keys.push(Arc::clone(&pair));
        Ok(pair)
    }

    /// Generates a new current key. Older keys stay for verification.
    ///
    /// # Errors
    ///
    /// Returns `KeyGeneration` if the crypto primitive fails.
    pub async fn generate(&self) -> AuthResult<Arc<KeyPair>> {
        let pair = Arc::new(self.new_pair().await?);
        self.keys.write().await.push(Arc::clone(&pair));

        tracing::info!(
            parent: &self.span,
            kid = %pair.kid(),
            renews = %pair.renews,
            expires = %pair.expires,
            "Generated signing key"
        );
        Ok(pair)
    }

    /// Generates a new key if the current one has passed its renewal time.
    ///
    /// With a `store`, the new key is persisted before it becomes current; if
    /// the write fails the cache is unchanged and the next call retries.
    /// Returns the new key, or `None` when no rotation was due. If another
    /// caller rotated in the meantime the freshly generated key is dropped.
    ///
    /// # Errors
    ///
    /// Returns an error if the cache is empty, key generation fails, or the
    /// store rejects the new key.
    pub async fn rotate_if_due(
        &self,
        store: Option<&dyn KeyStore>,
    ) -> AuthResult<Option<Arc<KeyPair>>> {
        let current = self.current_key().await?;
        if !current.needs_renewal(OffsetDateTime::now_utc()) {
            return Ok(None);
        }

        let pair = Arc::new(self.new_pair().await?);
        let mut keys = self.keys.write().await;
        if keys.last().is_some_and(|last| last.kid() != current.kid()) {
            tracing::debug!(parent: &self.span, "Key already rotated, discarding");
            return Ok(None);
        }
        if let Some(store) = store {
            store.create(&pair.to_stored()?).await?;
        }
        keys.push(Arc::clone(&pair));
        drop(keys);

        tracing::info!(
            parent: &self.span,
            previous = %current.kid(),
            kid = %pair.kid(),
            "Rotated signing key"
        );
        Ok(Some(pair))
    }

    /// Appends an existing key pair as the current key.
    #[cfg(test)]
    pub(crate) async fn insert(&self, pair: KeyPair) -> Arc<KeyPair> {
        let pair = Arc::new(pair);
        self.keys.write().await.push(Arc::clone(&pair));
        pair
    }

    /// Removes expired keys and returns how many were removed.
    ///
    /// The current key is never removed.
    pub async fn clean(&self) -> usize {
        let mut keys = self.keys.write().await;
        let Some(current) = keys.pop() else {
            return 0;
        };

        let now = OffsetDateTime::now_utc();
        let before = keys.len();
        keys.retain(|k| !k.is_expired(now));
        let removed = before - keys.len();
        keys.push(current);

        if removed > 0 {
            tracing::info!(parent: &self.span, removed, remaining = keys.len(), "Removed expired signing keys");
        }
        removed
    }

    /// Returns the key new tokens are signed with.
    ///
    /// # Errors
    ///
    /// Returns `Internal` if the cache has not been bootstrapped.
    pub async fn current_key(&self) -> AuthResult<Arc<KeyPair>> {
        self.keys
            .read()
            .await
            .last()
            .cloned()
            .ok_or_else(|| AuthError::internal("key cache is empty"))
    }

    /// Returns the public key set of every live key, in insertion order.
    ///
    /// The set expires at the earliest of the current key's renewal time and
    /// every live key's expiry, so fetchers pick up a rotation promptly.
    pub async fn public_keys(&self) -> Jwks {
        let keys = self.keys.read().await;
        let now = OffsetDateTime::now_utc();

        let mut jwks = Jwks::new();
        for pair in keys.iter().filter(|k| !k.is_expired(now)) {
            jwks.keys.push(pair.jwk().clone());
            jwks.exp = Some(jwks.exp.map_or(pair.expires, |exp| exp.min(pair.expires)));
        }
        if let Some(current) = keys.last().filter(|k| !k.is_expired(now)) {
            jwks.exp = Some(jwks.exp.map_or(current.renews, |exp| exp.min(current.renews)));
        }
        jwks
    }

    /// Returns verification keys for every live key.
    pub async fn verification_keys(&self) -> Vec<VerificationKey> {
        let now = OffsetDateTime::now_utc();
        self.keys
            .read()
            .await
            .iter()
            .filter(|k| !k.is_expired(now))
            .map(|k| k.verification_key().clone())
            .collect()
    }

    /// Verifies `token` against every live key and checks `requirement`.
    ///
    /// # Errors
    ///
    /// Returns `InvalidToken` if verification fails and `ClaimsNotConform`
    /// if the claims do not satisfy the requirement.
    pub async fn parse_claims(
        &self,
        token: &str,
        requirement: &ClaimRequirement,
        options: &ParseOptions,
    ) -> AuthResult<Claims> {
        let keys = self.verification_keys().await;
        let claims = verify_token(token, &keys, options)?;
        requirement.validate(&claims)?;
        Ok(claims)
    }

    /// Returns the number of keys held.
    pub async fn len(&self) -> usize {
        self.keys.read().await.len()
    }

    /// Returns `true` before bootstrap.
    pub async fn is_empty(&self) -> bool {
        self.keys.read().await.is_empty()
    }

    async fn new_pair(&self) -> AuthResult<KeyPair> {
        let (family, size) = (self.family, self.key_size);
        let material = tokio::task::spawn_blocking(move || KeyMaterial::generate(family, size))
            .await
            .map_err(|e| AuthError::internal(format!("key generation task failed: {}", e)))??;

        let now = OffsetDateTime::now_utc();
        let expires = offset(now, self.key_duration)?;
        let renews = expires.checked_sub(to_time(self.overlap)?).ok_or_else(|| {
            AuthError::configuration(format!("duration out of range: {:?}", self.overlap))
        })?;
        KeyPair::new(material, expires, renews)
    }
}

fn to_time(duration: Duration) -> AuthResult<time::Duration> {
    time::Duration::try_from(duration)
        .map_err(|_| AuthError::configuration(format!("duration out of range: {:?}", duration)))
}

fn offset(at: OffsetDateTime, duration: Duration) -> AuthResult<OffsetDateTime> {
    at.checked_add(to_time(duration)?)
        .ok_or_else(|| AuthError::configuration(format!("duration out of range: {:?}", duration)))
}
