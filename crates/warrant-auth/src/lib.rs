//! # warrant-auth
//!
//! Trust core of a self-hosted token issuing authority.
//!
//! This crate provides:
//! - Asymmetric signing keys (RSA, ECDSA, EdDSA) with renewal and expiry
//! - Token issuance and stateless, count-limited refresh
//! - A composable claim requirement DSL
//! - Federation of public key sets between issuer replicas
//!
//! ## Overview
//!
//! A [`KeyCache`] holds the live signing keys, oldest first. The last key
//! signs; every live key verifies, so tokens survive a rotation. An
//! [`AsymmetricIssuer`] signs tokens with the current key. Wrapping it in a
//! [`FederatedTokenIssuer`] merges peer replicas' key sets so a token from
//! any replica verifies on every replica.
//!
//! ```ignore
//! use std::sync::Arc;
//! use warrant_auth::prelude::*;
//!
//! let config = TrustConfig::default();
//! config.validate()?;
//!
//! let store = Arc::new(MemoryKeyStore::new());
//! let cache = Arc::new(KeyCache::new(&config.signing));
//! cache.bootstrap(store.as_ref()).await?;
//!
//! let local: SharedIssuer = Arc::new(AsymmetricIssuer::from_config(cache.clone(), &config));
//! let issuer = FederatedTokenIssuer::wrap(local, &config.federation)?;
//!
//! let issued = issuer.issue_token(Claims::new().subject("alice").claim("role", "admin")).await?;
//! let admin = ClaimRequirement::new().with_claim_list_part("role", "admin");
//! issuer.parse_claims(&issued.token, &admin, &ParseOptions::default()).await?;
//! ```
//!
//! ## Modules
//!
//! - [`config`] - Trust configuration
//! - [`keys`] - Key material, key cache, persistence and rotation
//! - [`token`] - Token issuance and verification
//! - [`claims`] - Claims and claim requirements
//! - [`federation`] - Peer key set merging
//! - [`http`] - Axum handler for the published key set

pub mod claims;
pub mod config;
pub mod error;
pub mod federation;
pub mod http;
pub mod keys;
pub mod token;

pub use claims::{ClaimRequirement, Claims};
pub use config::{ConfigError, TrustConfig};
pub use error::{AuthError, ErrorCategory};
pub use federation::{Discoverer, FederatedTokenIssuer, StaticDiscoverer, merge_jwks};
pub use http::{PkeysState, pkeys_handler, pkeys_router};
pub use keys::{
    Jwk, Jwks, KeyCache, KeyFamily, KeyMaterial, KeyPair, KeyRotator, KeyStore, MemoryKeyStore,
    StoredKey,
};
pub use token::{
    AsymmetricIssuer, IssuedToken, ParseOptions, RequestScope, SharedIssuer, TokenIssuer,
    attach_issuer, issuer_from_extensions,
};

/// Type alias for trust core results.
pub type AuthResult<T> = Result<T, AuthError>;

/// Prelude module for convenient imports.
///
/// ```ignore
/// use warrant_auth::prelude::*;
/// ```
pub mod prelude {
    pub use crate::AuthResult;
    pub use crate::claims::{ClaimRequirement, Claims};
    pub use crate::config::{ConfigError, TrustConfig};
    pub use crate::error::{AuthError, ErrorCategory};
    pub use crate::federation::{Discoverer, FederatedTokenIssuer, StaticDiscoverer};
    pub use crate::http::pkeys_router;
    pub use crate::keys::{KeyCache, KeyFamily, KeyRotator, KeyStore, MemoryKeyStore};
    pub use crate::token::{
        AsymmetricIssuer, IssuedToken, ParseOptions, RequestScope, SharedIssuer, TokenIssuer,
    };
}
