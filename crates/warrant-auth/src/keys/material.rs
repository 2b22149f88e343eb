//! Asymmetric key material.
//!
//! [`KeyMaterial`] is a closed set of key variants behind one interface:
//! generate, encode for persistence, decode, publish the public half and
//! report the signing scheme.
//!
//! ## Formats
//!
//! - **Encode/Decode**: standard base64 of the PKCS#8 DER private key
//! - **Public string**: standard base64 of the SubjectPublicKeyInfo DER
//! - **Key ID**: base64url of the first 16 bytes of SHA-256 over the SPKI DER

use std::fmt;

use base64::Engine;
use base64::engine::general_purpose::{STANDARD, URL_SAFE_NO_PAD};
use ed25519_dalek::SigningKey as Ed25519SigningKey;
use ed25519_dalek::pkcs8::{
    DecodePrivateKey as _, EncodePrivateKey as _, EncodePublicKey as _,
};
use elliptic_curve::sec1::ToEncodedPoint;
use jsonwebtoken::{Algorithm, EncodingKey};
use rand::rngs::OsRng;
use rsa::pkcs1::EncodeRsaPrivateKey;
use rsa::pkcs8::{DecodePrivateKey as _, EncodePrivateKey as _, EncodePublicKey as _};
use rsa::traits::PublicKeyParts;
use rsa::RsaPrivateKey;
use sha2::{Digest, Sha256};

use crate::AuthResult;
use crate::error::AuthError;
use crate::keys::{DEFAULT_KEY_SIZE, Jwk, KeyFamily};

/// Private key material for one of the supported families.
pub enum KeyMaterial {
    /// RSA key with its size selector.
    Rsa {
        /// The private key.
        key: RsaPrivateKey,
        /// Size selector (256, 384 or 512).
        size: u16,
    },
    /// ECDSA key on P-256.
    P256(p256::SecretKey),
    /// ECDSA key on P-384.
    P384(p384::SecretKey),
    /// EdDSA key on Ed25519.
    Ed25519(Ed25519SigningKey),
}

impl KeyMaterial {
    /// Generates fresh key material.
    ///
    /// Unsupported sizes fall back to the family's smallest size.
    ///
    /// # Errors
    ///
    /// Returns `KeyGeneration` if the crypto primitive fails.
    pub fn generate(family: KeyFamily, size: u16) -> AuthResult<Self> {
        let size = family.resolve_size(size);

        match family {
            KeyFamily::Rsa => {
                let bits = KeyFamily::rsa_bits(size);
                let key = RsaPrivateKey::new(&mut OsRng, bits)
                    .map_err(|e| AuthError::key_generation(e.to_string()))?;
                Ok(Self::Rsa { key, size })
            }
            KeyFamily::Ecdsa if size == 384 => Ok(Self::P384(p384::SecretKey::random(&mut OsRng))),
            KeyFamily::Ecdsa => Ok(Self::P256(p256::SecretKey::random(&mut OsRng))),
            KeyFamily::EdDsa => Ok(Self::Ed25519(Ed25519SigningKey::generate(&mut OsRng))),
        }
    }

    /// Decodes material produced by [`encode`](Self::encode).
    ///
    /// ECDSA curves and RSA sizes are detected from the key itself;
    /// `size` is only used for RSA moduli outside the size table.
    ///
    /// # Errors
    ///
    /// Returns `KeyDecode` on malformed base64 or key structure.
    pub fn decode(family: KeyFamily, size: u16, text: &str) -> AuthResult<Self> {
        let der = STANDARD
            .decode(text.trim())
            .map_err(|e| AuthError::key_decode(format!("invalid base64: {}", e)))?;

        match family {
            KeyFamily::Rsa => {
                let key = RsaPrivateKey::from_pkcs8_der(&der)
                    .map_err(|e| AuthError::key_decode(e.to_string()))?;
                let size = KeyFamily::rsa_size_for_bits(key.size() * 8)
                    .unwrap_or_else(|| family.resolve_size(size));
                Ok(Self::Rsa { key, size })
            }
            KeyFamily::Ecdsa => {
                if let Ok(key) = p256::SecretKey::from_pkcs8_der(&der) {
                    return Ok(Self::P256(key));
                }
                p384::SecretKey::from_pkcs8_der(&der)
                    .map(Self::P384)
                    .map_err(|e| AuthError::key_decode(e.to_string()))
            }
            KeyFamily::EdDsa => Ed25519SigningKey::from_pkcs8_der(&der)
                .map(Self::Ed25519)
                .map_err(|e| AuthError::key_decode(e.to_string())),
        }
    }

    /// Encodes the private key for persistence.
    ///
    /// # Errors
    ///
    /// Returns `KeyGeneration` if the key cannot be serialized.
    pub fn encode(&self) -> AuthResult<String> {
        let der = match self {
            Self::Rsa { key, .. } => key.to_pkcs8_der(),
            Self::P256(key) => key.to_pkcs8_der(),
            Self::P384(key) => key.to_pkcs8_der(),
            Self::Ed25519(key) => key.to_pkcs8_der(),
        }
        .map_err(|e| AuthError::key_generation(e.to_string()))?;

        Ok(STANDARD.encode(der.as_bytes()))
    }

    /// Returns the base64 SubjectPublicKeyInfo of the public key.
    ///
    /// # Errors
    ///
    /// Returns `KeyGeneration` if the public key cannot be serialized.
    pub fn public_string(&self) -> AuthResult<String> {
        Ok(STANDARD.encode(self.public_der()?))
    }

    /// Returns the key identifier derived from the public key.
    ///
    /// # Errors
    ///
    /// Returns `KeyGeneration` if the public key cannot be serialized.
    pub fn key_id(&self) -> AuthResult<String> {
        let digest = Sha256::digest(self.public_der()?);
        Ok(URL_SAFE_NO_PAD.encode(&digest[..16]))
    }

    fn public_der(&self) -> AuthResult<Vec<u8>> {
        let doc = match self {
            Self::Rsa { key, .. } => key.to_public_key().to_public_key_der(),
            Self::P256(key) => key.public_key().to_public_key_der(),
            Self::P384(key) => key.public_key().to_public_key_der(),
            Self::Ed25519(key) => key.verifying_key().to_public_key_der(),
        }
        .map_err(|e| AuthError::key_generation(e.to_string()))?;

        Ok(doc.into_vec())
    }

    /// Returns the key family.
    #[must_use]
    pub fn family(&self) -> KeyFamily {
        match self {
            Self::Rsa { .. } => KeyFamily::Rsa,
            Self::P256(_) | Self::P384(_) => KeyFamily::Ecdsa,
            Self::Ed25519(_) => KeyFamily::EdDsa,
        }
    }

    /// Returns the size selector of this key.
    #[must_use]
    pub fn size(&self) -> u16 {
        match self {
            Self::Rsa { size, .. } => *size,
            Self::P384(_) => 384,
            Self::P256(_) | Self::Ed25519(_) => DEFAULT_KEY_SIZE,
        }
    }

    /// Returns the signature algorithm used with this key.
    #[must_use]
    pub fn signing_method(&self) -> Algorithm {
        self.family().signing_method(self.size())
    }

    /// Builds the `jsonwebtoken` signing key.
    ///
    /// # Errors
    ///
    /// Returns `KeyGeneration` if the key cannot be serialized to DER.
    pub fn encoding_key(&self) -> AuthResult<EncodingKey> {
        let key = match self {
            Self::Rsa { key, .. } => {
                let der = key
                    .to_pkcs1_der()
                    .map_err(|e| AuthError::key_generation(e.to_string()))?;
                EncodingKey::from_rsa_der(der.as_bytes())
            }
            Self::P256(key) => {
                let der = key
                    .to_pkcs8_der()
                    .map_err(|e| AuthError::key_generation(e.to_string()))?;
                EncodingKey::from_ec_der(der.as_bytes())
            }
            Self::P384(key) => {
                let der = key
                    .to_pkcs8_der()
                    .map_err(|e| AuthError::key_generation(e.to_string()))?;
                EncodingKey::from_ec_der(der.as_bytes())
            }
            Self::Ed25519(key) => {
                let der = key
                    .to_pkcs8_der()
                    .map_err(|e| AuthError::key_generation(e.to_string()))?;
                EncodingKey::from_ed_der(der.as_bytes())
            }
        };
        Ok(key)
    }

    /// Exports the public key as a JWK.
    ///
    /// # Errors
    ///
    /// Returns `KeyGeneration` if an elliptic curve point is missing a coordinate.
    pub fn to_jwk(&self, kid: &str) -> AuthResult<Jwk> {
        let alg = self.signing_method();
        let jwk = match self {
            Self::Rsa { key, .. } => {
                let public = key.to_public_key();
                Jwk::rsa(
                    kid,
                    alg,
                    URL_SAFE_NO_PAD.encode(public.n().to_bytes_be()),
                    URL_SAFE_NO_PAD.encode(public.e().to_bytes_be()),
                )
            }
            Self::P256(key) => {
                let point = key.public_key().to_encoded_point(false);
                let (x, y) = point
                    .x()
                    .zip(point.y())
                    .ok_or_else(|| AuthError::key_generation("Missing EC coordinate"))?;
                Jwk::ec(
                    kid,
                    alg,
                    "P-256",
                    URL_SAFE_NO_PAD.encode(x),
                    URL_SAFE_NO_PAD.encode(y),
                )
            }
            Self::P384(key) => {
                let point = key.public_key().to_encoded_point(false);
                let (x, y) = point
                    .x()
                    .zip(point.y())
                    .ok_or_else(|| AuthError::key_generation("Missing EC coordinate"))?;
                Jwk::ec(
                    kid,
                    alg,
                    "P-384",
                    URL_SAFE_NO_PAD.encode(x),
                    URL_SAFE_NO_PAD.encode(y),
                )
            }
            Self::Ed25519(key) => Jwk::okp(
                kid,
                URL_SAFE_NO_PAD.encode(key.verifying_key().to_bytes()),
            ),
        };
        Ok(jwk)
    }
}

impl fmt::Debug for KeyMaterial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyMaterial")
            .field("family", &self.family())
            .field("size", &self.size())
            .finish_non_exhaustive()
    }
}
