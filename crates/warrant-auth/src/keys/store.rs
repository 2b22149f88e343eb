//! Private key persistence interface.
//!
//! The relational storage layer lives outside this crate; it only has to
//! implement [`KeyStore`] over a table of `{ text, expires, renews }` rows.
//! [`MemoryKeyStore`] is provided for tests and single-process deployments.

use async_trait::async_trait;
use time::OffsetDateTime;
use tokio::sync::RwLock;

use crate::AuthResult;

/// A persisted signing key record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredKey {
    /// Encoded private key (see [`KeyMaterial::encode`](crate::keys::KeyMaterial::encode)).
    pub text: String,

    /// Hard cutoff for the key.
    pub expires: OffsetDateTime,

    /// When a replacement key should be generated.
    pub renews: OffsetDateTime,
}

/// Storage for signing key records.
///
/// # Example Implementation
///
/// ```ignore
/// #[async_trait::async_trait]
/// impl KeyStore for PgKeyStore {
///     async fn latest(&self) -> AuthResult<Option<StoredKey>> {
///         // SELECT text, expires, renews FROM signing_keys ORDER BY expires DESC LIMIT 1
///     }
///
///     async fn create(&self, key: &StoredKey) -> AuthResult<()> {
///         // INSERT INTO signing_keys (text, expires, renews) VALUES ($1, $2, $3)
///     }
/// }
/// ```
#[async_trait]
pub trait KeyStore: Send + Sync {
    /// Returns the record with the latest `expires`, if any.
    ///
    /// # Errors
    ///
    /// Returns `Storage` if the query fails.
    async fn latest(&self) -> AuthResult<Option<StoredKey>>;

    /// Persists a new key record.
    ///
    /// # Errors
    ///
    /// Returns `Storage` if the insert fails.
    async fn create(&self, key: &StoredKey) -> AuthResult<()>;
}

/// In-memory [`KeyStore`].
#[derive(Debug, Default)]
pub struct MemoryKeyStore {
    keys: RwLock<Vec<StoredKey>>,
}

impl MemoryKeyStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of stored records.
    pub async fn len(&self) -> usize {
        self.keys.read().await.len()
    }

    /// Returns `true` if no records are stored.
    pub async fn is_empty(&self) -> bool {
        self.keys.read().await.is_empty()
    }
}

#[async_trait]
impl KeyStore for MemoryKeyStore {
    async fn latest(&self) -> AuthResult<Option<StoredKey>> {
        let keys = self.keys.read().await;
        Ok(keys.iter().max_by_key(|k| k.expires).cloned())
    }

    async fn create(&self, key: &StoredKey) -> AuthResult<()> {
        self.keys.write().await.push(key.clone());
        Ok(())
    }
}
