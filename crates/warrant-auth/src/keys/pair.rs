//! Key material plus its lifetime metadata.

use std::fmt;

use jsonwebtoken::{Algorithm, EncodingKey};
use time::OffsetDateTime;

use crate::AuthResult;
use crate::keys::{Jwk, KeyFamily, KeyMaterial, StoredKey, VerificationKey};

/// A signing key with its expiry and renewal times.
///
/// `renews` is when a replacement key should be generated; `expires` is the
/// hard cutoff after which the key neither signs nor verifies.
pub struct KeyPair {
    material: KeyMaterial,
    kid: String,
    encoding_key: EncodingKey,
    verification_key: VerificationKey,
    jwk: Jwk,

    /// Hard cutoff for signing and verification.
    pub expires: OffsetDateTime,

    /// When a newer key should take over signing.
    pub renews: OffsetDateTime,
}

impl KeyPair {
    /// Wraps key material with its lifetime.
    ///
    /// # Errors
    ///
    /// Returns an error if the public or private key cannot be serialized.
    pub fn new(
        material: KeyMaterial,
        expires: OffsetDateTime,
        renews: OffsetDateTime,
    ) -> AuthResult<Self> {
        let kid = material.key_id()?;
        let encoding_key = material.encoding_key()?;
        let mut jwk = material.to_jwk(&kid)?;
        let verification_key = jwk.verification_key()?;
        jwk.exp = Some(expires);
        jwk.renews = Some(renews);

        Ok(Self {
            material,
            kid,
            encoding_key,
            verification_key,
            jwk,
            expires,
            renews,
        })
    }

    /// Rebuilds a key pair from a persisted record.
    ///
    /// # Errors
    ///
    /// Returns `KeyDecode` if the stored text is corrupt.
    pub fn from_stored(
        family: KeyFamily,
        size: u16,
        stored: &StoredKey,
    ) -> AuthResult<Self> {
        let material = KeyMaterial::decode(family, size, &stored.text)?;
        Self::new(material, stored.expires, stored.renews)
    }

    /// Produces the record persisted for this key.
    ///
    /// # Errors
    ///
    /// Returns an error if the private key cannot be serialized.
    pub fn to_stored(&self) -> AuthResult<StoredKey> {
        Ok(StoredKey {
            text: self.material.encode()?,
            expires: self.expires,
            renews: self.renews,
        })
    }

    /// Returns the key ID.
    #[must_use]
    pub fn kid(&self) -> &str {
        &self.kid
    }

    /// Returns the underlying key material.
    #[must_use]
    pub fn material(&self) -> &KeyMaterial {
        &self.material
    }

    /// Returns the signature algorithm.
    #[must_use]
    pub fn signing_method(&self) -> Algorithm {
        self.material.signing_method()
    }

    /// Returns the signing key.
    #[must_use]
    pub fn encoding_key(&self) -> &EncodingKey {
        &self.encoding_key
    }

    /// Returns the public key for verification.
    #[must_use]
    pub fn verification_key(&self) -> &VerificationKey {
        &self.verification_key
    }

    /// Returns the published JWK, including `exp` and `renews`.
    #[must_use]
    pub fn jwk(&self) -> &Jwk {
        &self.jwk
    }

    /// Returns `true` once the hard cutoff has passed.
    #[must_use]
    pub fn is_expired(&self, now: OffsetDateTime) -> bool {
        self.expires <= now
    }

    /// Returns `true` once a replacement key should be generated.
    #[must_use]
    pub fn needs_renewal(&self, now: OffsetDateTime) -> bool {
        self.renews <= now
    }
}

impl fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyPair")
            .field("kid", &self.kid)
            .field("material", &self.material)
            .field("expires", &self.expires)
            .field("renews", &self.renews)
            .finish()
    }
}
