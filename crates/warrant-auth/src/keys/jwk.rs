//! JSON Web Key Set types.
//!
//! The published form of the key cache: `{ "exp": ..., "keys": [...] }`.
//! Keys are identified solely by `kid`.

use jsonwebtoken::{Algorithm, DecodingKey};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::AuthResult;
use crate::error::AuthError;

/// JSON Web Key Set with an expiry.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Jwks {
    /// When the set should be fetched again.
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        with = "time::serde::rfc3339::option"
    )]
    pub exp: Option<OffsetDateTime>,

    /// The keys in this set.
    #[serde(default)]
    pub keys: Vec<Jwk>,
}

impl Jwks {
    /// Creates a new empty JWKS.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the expiry, treating zero or pre-epoch timestamps as absent.
    #[must_use]
    pub fn expires(&self) -> Option<OffsetDateTime> {
        self.exp.filter(|exp| *exp > OffsetDateTime::UNIX_EPOCH)
    }

    /// Finds a key by id.
    #[must_use]
    pub fn find(&self, kid: &str) -> Option<&Jwk> {
        self.keys.iter().find(|k| k.kid == kid)
    }
}

/// JSON Web Key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Jwk {
    /// Key type ("RSA", "EC" or "OKP").
    pub kty: String,

    /// Key use ("sig" for signing).
    #[serde(rename = "use", default = "default_use")]
    pub use_: String,

    /// Key ID.
    pub kid: String,

    /// Algorithm.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alg: Option<String>,

    /// Curve name ("P-256", "P-384" or "ed25519").
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub crv: Option<String>,

    /// EC/OKP x coordinate (base64url encoded).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub x: Option<String>,

    /// EC y coordinate (base64url encoded).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub y: Option<String>,

    /// RSA modulus (base64url encoded).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub n: Option<String>,

    /// RSA exponent (base64url encoded).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub e: Option<String>,

    /// Hard cutoff after which the key must not verify.
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        with = "time::serde::rfc3339::option"
    )]
    pub exp: Option<OffsetDateTime>,

    /// When the issuer starts signing with a newer key.
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        with = "time::serde::rfc3339::option"
    )]
    pub renews: Option<OffsetDateTime>,
}

fn default_use() -> String {
    "sig".to_string()
}

impl Jwk {
    fn empty(kty: &str, kid: &str) -> Self {
        Self {
            kty: kty.to_string(),
            use_: default_use(),
            kid: kid.to_string(),
            alg: None,
            crv: None,
            x: None,
            y: None,
            n: None,
            e: None,
            exp: None,
            renews: None,
        }
    }

    /// Builds an RSA JWK from base64url modulus and exponent.
    #[must_use]
    pub fn rsa(kid: &str, alg: Algorithm, n: String, e: String) -> Self {
        Self {
            alg: Some(algorithm_name(alg).to_string()),
            n: Some(n),
            e: Some(e),
            ..Self::empty("RSA", kid)
        }
    }

    /// Builds an EC JWK from base64url coordinates.
    #[must_use]
    pub fn ec(kid: &str, alg: Algorithm, crv: &str, x: String, y: String) -> Self {
        Self {
            alg: Some(algorithm_name(alg).to_string()),
            crv: Some(crv.to_string()),
            x: Some(x),
            y: Some(y),
            ..Self::empty("EC", kid)
        }
    }

    /// Builds an Ed25519 JWK from the base64url public key.
    #[must_use]
    pub fn okp(kid: &str, x: String) -> Self {
        Self {
            alg: Some(algorithm_name(Algorithm::EdDSA).to_string()),
            crv: Some("ed25519".to_string()),
            x: Some(x),
            ..Self::empty("OKP", kid)
        }
    }

    /// Returns `true` if the key carries an expiry that has passed.
    #[must_use]
    pub fn is_expired(&self, now: OffsetDateTime) -> bool {
        self.exp
            .is_some_and(|exp| exp > OffsetDateTime::UNIX_EPOCH && exp <= now)
    }

    /// Converts the JWK into a key usable for signature verification.
    ///
    /// # Errors
    ///
    /// Returns `UnsupportedAlgorithm` for unknown key types, curves or
    /// algorithms, and `KeyDecode` for missing or malformed coordinates.
    pub fn verification_key(&self) -> AuthResult<VerificationKey> {
        if self.use_ != "sig" {
            return Err(AuthError::unsupported_algorithm(format!(
                "key use {}",
                self.use_
            )));
        }

        let (algorithm, key) = match self.kty.as_str() {
            "RSA" => {
                let algorithm = match self.alg.as_deref() {
                    None | Some("RS256") => Algorithm::RS256,
                    Some("RS384") => Algorithm::RS384,
                    Some("RS512") => Algorithm::RS512,
                    Some(other) => return Err(AuthError::unsupported_algorithm(other)),
                };
                let n = required(&self.n, "n")?;
                let e = required(&self.e, "e")?;
                let key = DecodingKey::from_rsa_components(n, e)
                    .map_err(|e| AuthError::key_decode(e.to_string()))?;
                (algorithm, key)
            }
            "EC" => {
                let algorithm = match self.crv.as_deref() {
                    Some("P-256") => Algorithm::ES256,
                    Some("P-384") => Algorithm::ES384,
                    Some(other) => return Err(AuthError::unsupported_algorithm(other)),
                    None => return Err(AuthError::key_decode("EC key without crv")),
                };
                let x = required(&self.x, "x")?;
                let y = required(&self.y, "y")?;
                let key = DecodingKey::from_ec_components(x, y)
                    .map_err(|e| AuthError::key_decode(e.to_string()))?;
                (algorithm, key)
            }
            "OKP" => {
                match self.crv.as_deref() {
                    Some(crv) if crv.eq_ignore_ascii_case("ed25519") => {}
                    Some(other) => return Err(AuthError::unsupported_algorithm(other)),
                    None => return Err(AuthError::key_decode("OKP key without crv")),
                }
                let x = required(&self.x, "x")?;
                let key = DecodingKey::from_ed_components(x)
                    .map_err(|e| AuthError::key_decode(e.to_string()))?;
                (Algorithm::EdDSA, key)
            }
            other => return Err(AuthError::unsupported_algorithm(other)),
        };

        if let Some(alg) = self.alg.as_deref()
            && alg != algorithm_name(algorithm)
        {
            return Err(AuthError::unsupported_algorithm(alg));
        }

        Ok(VerificationKey {
            kid: self.kid.clone(),
            algorithm,
            key,
        })
    }
}

fn required<'a>(value: &'a Option<String>, name: &str) -> AuthResult<&'a str> {
    value
        .as_deref()
        .ok_or_else(|| AuthError::key_decode(format!("missing JWK parameter {}", name)))
}

/// Returns the JOSE name of an algorithm.
#[must_use]
pub fn algorithm_name(alg: Algorithm) -> &'static str {
    match alg {
        Algorithm::HS256 => "HS256",
        Algorithm::HS384 => "HS384",
        Algorithm::HS512 => "HS512",
        Algorithm::ES256 => "ES256",
        Algorithm::ES384 => "ES384",
        Algorithm::RS256 => "RS256",
        Algorithm::RS384 => "RS384",
        Algorithm::RS512 => "RS512",
        Algorithm::PS256 => "PS256",
        Algorithm::PS384 => "PS384",
        Algorithm::PS512 => "PS512",
        Algorithm::EdDSA => "EdDSA",
    }
}

/// A public key ready to verify signatures.
#[derive(Clone)]
pub struct VerificationKey {
    /// Key ID.
    pub kid: String,
    /// Algorithm the key verifies.
    pub algorithm: Algorithm,
    /// The decoding key.
    pub key: DecodingKey,
}

impl std::fmt::Debug for VerificationKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VerificationKey")
            .field("kid", &self.kid)
            .field("algorithm", &self.algorithm)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keys::{KeyFamily, KeyMaterial};

    #[test]
    fn test_jwks_wire_shape() {
        let json = serde_json::json!({
            "exp": "2030-01-01T00:00:00Z",
            "keys": [{
                "kty": "EC",
                "use": "sig",
                "kid": "abc",
                "crv": "P-256",
                "x": "xx",
                "y": "yy"
            }]
        });

        let jwks: Jwks = serde_json::from_value(json).unwrap();
        assert_eq!(jwks.keys.len(), 1);
        assert_eq!(jwks.expires().unwrap().year(), 2030);
        assert!(jwks.find("abc").is_some());
        assert!(jwks.find("missing").is_none());

        let out = serde_json::to_value(&jwks).unwrap();
        assert_eq!(out["keys"][0]["use"], "sig");
        assert!(out["keys"][0].get("n").is_none());
    }

    #[test]
    fn test_zero_expiry_is_absent() {
        let json = serde_json::json!({ "exp": "0001-01-01T00:00:00Z", "keys": [] });
        let jwks: Jwks = serde_json::from_value(json).unwrap();
        assert!(jwks.exp.is_some());
        assert!(jwks.expires().is_none());

        let jwks: Jwks = serde_json::from_str(r#"{"keys":[]}"#).unwrap();
        assert!(jwks.expires().is_none());
    }

    #[test]
    fn test_verification_key_for_each_family() {
        for (family, size, alg) in [
            (KeyFamily::Rsa, 256, Algorithm::RS256),
            (KeyFamily::Ecdsa, 256, Algorithm::ES256),
            (KeyFamily::Ecdsa, 384, Algorithm::ES384),
            (KeyFamily::EdDsa, 256, Algorithm::EdDSA),
        ] {
            let material = KeyMaterial::generate(family, size).unwrap();
            let jwk = material.to_jwk("kid").unwrap();
            let key = jwk.verification_key().unwrap();
            assert_eq!(key.algorithm, alg);
            assert_eq!(key.kid, "kid");
        }
    }

    #[test]
    fn test_okp_curve_is_case_insensitive() {
        let material = KeyMaterial::generate(KeyFamily::EdDsa, 256).unwrap();
        let mut jwk = material.to_jwk("kid").unwrap();
        jwk.crv = Some("Ed25519".to_string());
        assert!(jwk.verification_key().is_ok());
    }

    #[test]
    fn test_unsupported_keys_rejected() {
        let mut jwk = Jwk::empty("oct", "k");
        assert!(matches!(
            jwk.verification_key(),
            Err(AuthError::UnsupportedAlgorithm { .. })
        ));

        jwk = Jwk::ec("k", Algorithm::ES256, "P-521", "x".into(), "y".into());
        assert!(matches!(
            jwk.verification_key(),
            Err(AuthError::UnsupportedAlgorithm { .. })
        ));

        jwk = Jwk::rsa("k", Algorithm::RS256, "AQAB".into(), "AQAB".into());
        jwk.alg = Some("PS256".to_string());
        assert!(matches!(
            jwk.verification_key(),
            Err(AuthError::UnsupportedAlgorithm { .. })
        ));
    }

    #[test]
    fn test_missing_coordinates_rejected() {
        let mut jwk = Jwk::okp("k", "x".into());
        jwk.x = None;
        assert!(matches!(
            jwk.verification_key(),
            Err(AuthError::KeyDecode { .. })
        ));
    }

    #[test]
    fn test_encryption_keys_skipped() {
        let material = KeyMaterial::generate(KeyFamily::EdDsa, 256).unwrap();
        let mut jwk = material.to_jwk("kid").unwrap();
        jwk.use_ = "enc".to_string();
        assert!(jwk.verification_key().is_err());
    }

    #[test]
    fn test_is_expired() {
        let now = OffsetDateTime::now_utc();
        let mut jwk = Jwk::okp("k", "x".into());
        assert!(!jwk.is_expired(now));

        jwk.exp = Some(now - time::Duration::seconds(1));
        assert!(jwk.is_expired(now));

        jwk.exp = Some(now + time::Duration::hours(1));
        assert!(!jwk.is_expired(now));
    }
}
