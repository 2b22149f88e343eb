//! Signing key management.
//!
//! - [`material`] - Algorithm-specific key material (RSA, ECDSA, EdDSA)
//! - [`jwk`] - Published JSON Web Key Set types
//! - [`pair`] - Key material plus expiry metadata
//! - [`cache`] - The ordered set of live keys backing issuance and verification
//! - [`store`] - Persistence interface for private keys
//! - [`rotation`] - Background renewal and cleanup task

pub mod cache;
pub mod jwk;
pub mod material;
pub mod pair;
pub mod rotation;
pub mod store;

use std::fmt;

use jsonwebtoken::Algorithm;
use serde::{Deserialize, Serialize};

pub use cache::KeyCache;
pub use jwk::{Jwk, Jwks, VerificationKey};
pub use material::KeyMaterial;
pub use pair::KeyPair;
pub use rotation::{KeyRotator, RotationReport};
pub use store::{KeyStore, MemoryKeyStore, StoredKey};

/// Key size used when a configured size is not supported.
pub const DEFAULT_KEY_SIZE: u16 = 256;

/// RSA sizes: selector, modulus bits, signing scheme.
const RSA_SIZES: &[(u16, usize, Algorithm)] = &[
    (256, 2048, Algorithm::RS256),
    (384, 3072, Algorithm::RS384),
    (512, 4096, Algorithm::RS512),
];

/// ECDSA sizes: selector, signing scheme.
/// P-521 is absent because the signing library has no ES512.
const ECDSA_SIZES: &[(u16, Algorithm)] = &[(256, Algorithm::ES256), (384, Algorithm::ES384)];

/// Asymmetric key families a [`KeyCache`] can be configured with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KeyFamily {
    /// RSA PKCS#1 v1.5 signatures.
    Rsa,
    /// ECDSA over NIST curves.
    Ecdsa,
    /// EdDSA over Ed25519.
    #[serde(alias = "ed25519")]
    EdDsa,
}

impl KeyFamily {
    /// Returns `true` if `size` has an entry in this family's size table.
    #[must_use]
    pub fn supports_size(self, size: u16) -> bool {
        match self {
            Self::Rsa => RSA_SIZES.iter().any(|(s, _, _)| *s == size),
            Self::Ecdsa => ECDSA_SIZES.iter().any(|(s, _)| *s == size),
            Self::EdDsa => size == DEFAULT_KEY_SIZE,
        }
    }

    /// Maps a requested size to a supported one.
    ///
    /// Unsupported sizes fall back to [`DEFAULT_KEY_SIZE`] with a warning.
    /// EdDSA has a single scheme and ignores the size.
    #[must_use]
    pub fn resolve_size(self, requested: u16) -> u16 {
        if self == Self::EdDsa {
            return DEFAULT_KEY_SIZE;
        }
        if self.supports_size(requested) {
            return requested;
        }

        tracing::warn!(
            family = %self,
            requested,
            fallback = DEFAULT_KEY_SIZE,
            "Unsupported key size, falling back"
        );
        DEFAULT_KEY_SIZE
    }

    /// Returns the signature algorithm for a key size.
    ///
    /// Unknown sizes map to the family's 256-bit scheme.
    #[must_use]
    pub fn signing_method(self, size: u16) -> Algorithm {
        match self {
            Self::Rsa => RSA_SIZES
                .iter()
                .find(|(s, _, _)| *s == size)
                .map_or(Algorithm::RS256, |(_, _, alg)| *alg),
            Self::Ecdsa => ECDSA_SIZES
                .iter()
                .find(|(s, _)| *s == size)
                .map_or(Algorithm::ES256, |(_, alg)| *alg),
            Self::EdDsa => Algorithm::EdDSA,
        }
    }

    /// Returns the RSA modulus size for a key size selector.
    pub(crate) fn rsa_bits(size: u16) -> usize {
        RSA_SIZES
            .iter()
            .find(|(s, _, _)| *s == size)
            .map_or(2048, |(_, bits, _)| *bits)
    }

    /// Returns the size selector for an RSA modulus, if it is in the table.
    pub(crate) fn rsa_size_for_bits(bits: usize) -> Option<u16> {
        RSA_SIZES
            .iter()
            .find(|(_, b, _)| *b == bits)
            .map(|(s, _, _)| *s)
    }

    /// Number of random bytes in a refresh token for this family and size.
    #[must_use]
    pub fn refresh_size(self, size: u16) -> usize {
        match self {
            Self::EdDsa => 32,
            _ => usize::from(self.resolve_size(size)) / 8,
        }
    }

    /// Returns the family name.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Rsa => "rsa",
            Self::Ecdsa => "ecdsa",
            Self::EdDsa => "eddsa",
        }
    }
}

impl fmt::Display for KeyFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
