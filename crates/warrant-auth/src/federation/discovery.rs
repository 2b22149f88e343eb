//! Peer discovery.

use async_trait::async_trait;
use url::Url;

use crate::AuthResult;

/// Source of peer issuer base URLs.
#[async_trait]
pub trait Discoverer: Send + Sync {
    /// Returns the base URLs of peer issuers.
    ///
    /// # Errors
    ///
    /// Implementations backed by a registry may fail; callers treat a
    /// failure as an empty peer list.
    async fn peers(&self) -> AuthResult<Vec<Url>>;
}

/// A fixed list of peers, typically from configuration.
#[derive(Debug, Clone, Default)]
pub struct StaticDiscoverer {
    peers: Vec<Url>,
}

impl StaticDiscoverer {
    /// Creates a discoverer that always returns `peers`.
    #[must_use]
    pub fn new(peers: Vec<Url>) -> Self {
        Self { peers }
    }
}

#[async_trait]
impl Discoverer for StaticDiscoverer {
    async fn peers(&self) -> AuthResult<Vec<Url>> {
        Ok(self.peers.clone())
    }
}
