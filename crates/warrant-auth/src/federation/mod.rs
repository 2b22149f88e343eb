//! Key set federation between issuer replicas.
//!
//! Each replica publishes its own keys at `/api/pkeys?local=true` and merges
//! every peer's set into the one it publishes and verifies against, so a
//! token issued by any replica validates on all of them.
//!
//! - [`Discoverer`] - Source of peer base URLs
//! - [`merge_jwks`] - Deduplicating merge with earliest expiry
//! - [`FederatedTokenIssuer`] - Issuer wrapper with the cached merge

pub mod discovery;
pub mod issuer;
pub mod merge;

pub use discovery::{Discoverer, StaticDiscoverer};
pub use issuer::FederatedTokenIssuer;
pub use merge::{fetch_peer_jwks, merge_jwks, peer_jwks_url};
