//! Token claims and claim requirements.
//!
//! [`Claims`] is the payload of an issued token: the registered JWT fields
//! plus an open map of string application claims. [`ClaimRequirement`] is a
//! predicate tree evaluated against a parsed [`Claims`].

pub mod requirement;

use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

pub use requirement::ClaimRequirement;

/// Token payload.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    /// Issuer.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iss: Option<String>,

    /// Subject.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sub: Option<String>,

    /// Audience.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aud: Option<String>,

    /// Expiration time (Unix timestamp).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exp: Option<i64>,

    /// Not before (Unix timestamp).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nbf: Option<i64>,

    /// Issued at (Unix timestamp).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iat: Option<i64>,

    /// Token ID.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jti: Option<String>,

    /// Application claims.
    #[serde(flatten)]
    pub extra: BTreeMap<String, String>,
}

/// Registered claims holding timestamps rather than strings.
pub(crate) const NUMERIC_CLAIMS: &[&str] = &["exp", "nbf", "iat"];

impl Claims {
    /// Creates an empty claim set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the subject.
    #[must_use]
    pub fn subject(mut self, sub: impl Into<String>) -> Self {
        self.sub = Some(sub.into());
        self
    }

    /// Sets the issuer.
    #[must_use]
    pub fn issuer(mut self, iss: impl Into<String>) -> Self {
        self.iss = Some(iss.into());
        self
    }

    /// Sets the audience.
    #[must_use]
    pub fn audience(mut self, aud: impl Into<String>) -> Self {
        self.aud = Some(aud.into());
        self
    }

    /// Sets the expiry relative to now.
    #[must_use]
    pub fn expires_in(mut self, lifetime: Duration) -> Self {
        self.exp = Some(unix_in(lifetime));
        self
    }

    /// Adds an application claim.
    #[must_use]
    pub fn claim(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.set(key.into(), value.into());
        self
    }

    /// Looks up a claim by name, registered fields included.
    ///
    /// Timestamps are rendered as decimal strings.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<String> {
        match key {
            "iss" => self.iss.clone(),
            "sub" => self.sub.clone(),
            "aud" => self.aud.clone(),
            "jti" => self.jti.clone(),
            "exp" => self.exp.map(|v| v.to_string()),
            "nbf" => self.nbf.map(|v| v.to_string()),
            "iat" => self.iat.map(|v| v.to_string()),
            _ => self.extra.get(key).cloned(),
        }
    }

    /// Sets a claim by name, registered fields included.
    ///
    /// Values for timestamp claims that do not parse as integers are ignored.
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let key = key.into();
        let value = value.into();
        match key.as_str() {
            "iss" => self.iss = Some(value),
            "sub" => self.sub = Some(value),
            "aud" => self.aud = Some(value),
            "jti" => self.jti = Some(value),
            "exp" => self.exp = value.parse().ok().or(self.exp),
            "nbf" => self.nbf = value.parse().ok().or(self.nbf),
            "iat" => self.iat = value.parse().ok().or(self.iat),
            _ => {
                self.extra.insert(key, value);
            }
        }
    }

    /// Returns the expiry as a timestamp.
    #[must_use]
    pub fn expires_at(&self) -> Option<OffsetDateTime> {
        self.exp
            .and_then(|exp| OffsetDateTime::from_unix_timestamp(exp).ok())
    }
}

pub(crate) fn unix_now() -> i64 {
    OffsetDateTime::now_utc().unix_timestamp()
}

/// Unix timestamp `lifetime` from now, saturating.
pub(crate) fn unix_in(lifetime: Duration) -> i64 {
    unix_now().saturating_add(i64::try_from(lifetime.as_secs()).unwrap_or(i64::MAX))
}
