//! Trust core configuration.
//!
//! Configuration types for key signing, refresh limits, peer federation and
//! background key rotation. Loading the values (files, environment) is the
//! host application's job; this module only describes and validates them.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use url::Url;

use crate::keys::KeyFamily;

/// Root trust configuration.
///
/// # Example (TOML)
///
/// ```toml
/// [trust.signing]
/// family = "ecdsa"
/// key_size = 256
/// key_duration = "30d"
/// token_lifetime = "1h"
///
/// [trust.refresh]
/// limit = 5
///
/// [trust.federation]
/// enabled = true
/// peers = ["http://issuer-b:8080", "http://issuer-c:8080"]
/// ```
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct TrustConfig {
    /// Key material and lifetimes.
    pub signing: SigningConfig,

    /// Token refresh behaviour.
    pub refresh: RefreshConfig,

    /// Peer key set federation.
    pub federation: FederationConfig,

    /// Background key rotation.
    pub rotation: RotationConfig,
}

/// Signing key configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SigningConfig {
    /// Key family used for new keys.
    pub family: KeyFamily,

    /// Key size selector (256, 384 or 512).
    /// Unsupported sizes fall back to 256.
    pub key_size: u16,

    /// How long a key may sign and verify before it is dropped.
    #[serde(with = "humantime_serde")]
    pub key_duration: Duration,

    /// Maximum lifetime of an issued token.
    #[serde(with = "humantime_serde")]
    pub token_lifetime: Duration,

    /// How long before expiry a replacement key is generated.
    /// Defaults to `token_lifetime` when unset, so every token signed
    /// before the renewal point stays verifiable until it expires.
    #[serde(default, with = "humantime_serde::option")]
    pub renewal_overlap: Option<Duration>,
}

impl Default for SigningConfig {
    fn default() -> Self {
        Self {
            family: KeyFamily::Ecdsa,
            key_size: 256,
            key_duration: Duration::from_secs(30 * 24 * 3600), // 30 days
            token_lifetime: Duration::from_secs(3600),         // 1 hour
            renewal_overlap: None,
        }
    }
}

impl SigningConfig {
    /// Returns the effective overlap between a key's renewal and expiry.
    #[must_use]
    pub fn overlap(&self) -> Duration {
        self.renewal_overlap.unwrap_or(self.token_lifetime)
    }
}

/// Token refresh configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RefreshConfig {
    /// Maximum number of refreshes per token. `None` disables the limit.
    pub limit: Option<u32>,

    /// Claim that carries the refresh count.
    pub count_claim: String,

    /// Lifetime granted to a refreshed token.
    #[serde(with = "humantime_serde")]
    pub extend_time: Duration,
}

impl Default for RefreshConfig {
    fn default() -> Self {
        Self {
            limit: None,
            count_claim: "jti".to_string(),
            extend_time: Duration::from_secs(3600),
        }
    }
}

/// Peer federation configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct FederationConfig {
    /// Merge peer key sets into the published set. When off,
    /// [`FederatedTokenIssuer::wrap`](crate::FederatedTokenIssuer::wrap)
    /// leaves the local issuer unwrapped.
    pub enabled: bool,

    /// Base URLs of peer issuers.
    pub peers: Vec<Url>,

    /// Cache lifetime used when the merged set carries no usable expiry.
    #[serde(with = "humantime_serde")]
    pub refresh_interval: Duration,

    /// Safety margin subtracted from the merged expiry.
    #[serde(with = "humantime_serde")]
    pub refresh_buffer: Duration,

    /// Per-peer HTTP request timeout.
    #[serde(with = "humantime_serde")]
    pub request_timeout: Duration,
}

impl Default for FederationConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            peers: Vec::new(),
            refresh_interval: Duration::from_secs(300),
            refresh_buffer: Duration::from_secs(30),
            request_timeout: Duration::from_secs(10),
        }
    }
}

/// Background rotation configuration.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct RotationConfig {
    /// How often the rotation task checks key renewal and expiry.
    /// Rotation is disabled when unset.
    #[serde(default, with = "humantime_serde::option")]
    pub check_interval: Option<Duration>,
}

/// Configuration validation errors.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ConfigError {
    /// An invalid configuration value was provided.
    #[error("Invalid configuration value: {0}")]
    InvalidValue(String),

    /// A required configuration value is missing.
    #[error("Missing required configuration: {0}")]
    Missing(String),
}

impl TrustConfig {
    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidValue` if:
    /// - A duration is zero
    /// - The token lifetime or renewal overlap is not shorter than the key duration
    /// - The refresh count claim is empty or a timestamp claim
    ///
    /// Returns `ConfigError::Missing` if federation is enabled without peers.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let signing = &self.signing;

        if signing.key_duration.is_zero() {
            return Err(ConfigError::InvalidValue(
                "signing.key_duration must be > 0".to_string(),
            ));
        }

        if signing.token_lifetime.is_zero() {
            return Err(ConfigError::InvalidValue(
                "signing.token_lifetime must be > 0".to_string(),
            ));
        }

        if signing.token_lifetime >= signing.key_duration {
            return Err(ConfigError::InvalidValue(format!(
                "signing.token_lifetime ({:?}) must be shorter than signing.key_duration ({:?})",
                signing.token_lifetime, signing.key_duration
            )));
        }

        if signing.overlap() >= signing.key_duration {
            return Err(ConfigError::InvalidValue(
                "signing.renewal_overlap must be shorter than signing.key_duration".to_string(),
            ));
        }

        if self.refresh.count_claim.is_empty() {
            return Err(ConfigError::InvalidValue(
                "refresh.count_claim cannot be empty".to_string(),
            ));
        }

        if crate::claims::NUMERIC_CLAIMS.contains(&self.refresh.count_claim.as_str()) {
            return Err(ConfigError::InvalidValue(format!(
                "refresh.count_claim cannot be the timestamp claim {}",
                self.refresh.count_claim
            )));
        }

        if self.refresh.extend_time.is_zero() {
            return Err(ConfigError::InvalidValue(
                "refresh.extend_time must be > 0".to_string(),
            ));
        }

        if self.federation.enabled {
            if self.federation.peers.is_empty() {
                return Err(ConfigError::Missing("federation.peers".to_string()));
            }

            if self.federation.refresh_interval.is_zero() {
                return Err(ConfigError::InvalidValue(
                    "federation.refresh_interval must be > 0".to_string(),
                ));
            }
        }

        if self.rotation.check_interval.is_some_and(|d| d.is_zero()) {
            return Err(ConfigError::InvalidValue(
                "rotation.check_interval must be > 0".to_string(),
            ));
        }

        Ok(())
    }
}
