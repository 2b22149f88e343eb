//! Trust core error types.
//!
//! Every fallible operation in this crate returns [`AuthError`]. Errors that
//! describe why a token was rejected are kept distinct internally, but
//! [`AuthError::public_message`] collapses them so external callers cannot
//! use the response as an oracle.

use std::fmt;

/// Errors that can occur while managing keys, issuing tokens or validating them.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    /// The underlying crypto primitive failed to produce key material.
    #[error("Key generation error: {message}")]
    KeyGeneration {
        /// Description of the generation failure.
        message: String,
    },

    /// Persisted or peer-supplied key data could not be decoded.
    #[error("Key decode error: {message}")]
    KeyDecode {
        /// Description of the decode failure.
        message: String,
    },

    /// A JWK used a key type or curve this crate cannot verify with.
    #[error("Unsupported algorithm: {algorithm}")]
    UnsupportedAlgorithm {
        /// The offending key type, curve or algorithm name.
        algorithm: String,
    },

    /// The token is malformed, expired, or its signature does not verify.
    #[error("Invalid token: {message}")]
    InvalidToken {
        /// Internal description of why the token was rejected.
        message: String,
    },

    /// The token verified but its claims do not satisfy the requirement.
    #[error("Claims do not conform to requirement")]
    ClaimsNotConform,

    /// The token has already been refreshed the configured maximum number of times.
    #[error("Refresh limit exceeded: {count} of {limit}")]
    RefreshLimitExceeded {
        /// Refresh count carried by the token.
        count: u32,
        /// Configured limit.
        limit: u32,
    },

    /// The refresh token is not a well-formed random value of the expected size.
    #[error("Invalid refresh token: {message}")]
    InvalidRefreshToken {
        /// Description of why the refresh token was rejected.
        message: String,
    },

    /// A peer's key set could not be fetched or decoded.
    #[error("Peer fetch error: {peer} - {message}")]
    PeerFetch {
        /// Base URL of the peer.
        peer: String,
        /// Description of the failure.
        message: String,
    },

    /// The key store failed to read or write a key record.
    #[error("Storage error: {message}")]
    Storage {
        /// Description of the storage error.
        message: String,
    },

    /// The trust configuration is invalid.
    #[error("Configuration error: {message}")]
    Configuration {
        /// Description of the configuration error.
        message: String,
    },

    /// An unexpected internal error occurred.
    #[error("Internal error: {message}")]
    Internal {
        /// Description of the internal error.
        message: String,
    },
}

impl AuthError {
    /// Creates a new `KeyGeneration` error.
    #[must_use]
    pub fn key_generation(message: impl Into<String>) -> Self {
        Self::KeyGeneration {
            message: message.into(),
        }
    }

    /// Creates a new `KeyDecode` error.
    #[must_use]
    pub fn key_decode(message: impl Into<String>) -> Self {
        Self::KeyDecode {
            message: message.into(),
        }
    }

    /// Creates a new `UnsupportedAlgorithm` error.
    #[must_use]
    pub fn unsupported_algorithm(algorithm: impl Into<String>) -> Self {
        Self::UnsupportedAlgorithm {
            algorithm: algorithm.into(),
        }
    }

    /// Creates a new `InvalidToken` error.
    #[must_use]
    pub fn invalid_token(message: impl Into<String>) -> Self {
        Self::InvalidToken {
            message: message.into(),
        }
    }

    /// Creates a new `InvalidRefreshToken` error.
    #[must_use]
    pub fn invalid_refresh_token(message: impl Into<String>) -> Self {
        Self::InvalidRefreshToken {
            message: message.into(),
        }
    }

    /// Creates a new `PeerFetch` error.
    #[must_use]
    pub fn peer_fetch(peer: impl Into<String>, message: impl Into<String>) -> Self {
        Self::PeerFetch {
            peer: peer.into(),
            message: message.into(),
        }
    }

    /// Creates a new `Storage` error.
    #[must_use]
    pub fn storage(message: impl Into<String>) -> Self {
        Self::Storage {
            message: message.into(),
        }
    }

    /// Creates a new `Configuration` error.
    #[must_use]
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Creates a new `Internal` error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Returns `true` if the error means the presented token must be rejected.
    #[must_use]
    pub fn is_rejection(&self) -> bool {
        matches!(
            self,
            Self::InvalidToken { .. } | Self::ClaimsNotConform | Self::InvalidRefreshToken { .. }
        )
    }

    /// Returns `true` if the error concerns key material.
    #[must_use]
    pub fn is_key_error(&self) -> bool {
        matches!(
            self,
            Self::KeyGeneration { .. } | Self::KeyDecode { .. } | Self::UnsupportedAlgorithm { .. }
        )
    }

    /// Returns the category of this error.
    #[must_use]
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::KeyGeneration { .. } => ErrorCategory::Key,
            Self::KeyDecode { .. } => ErrorCategory::Key,
            Self::UnsupportedAlgorithm { .. } => ErrorCategory::Key,
            Self::InvalidToken { .. } => ErrorCategory::Token,
            Self::ClaimsNotConform => ErrorCategory::Token,
            Self::RefreshLimitExceeded { .. } => ErrorCategory::Refresh,
            Self::InvalidRefreshToken { .. } => ErrorCategory::Refresh,
            Self::PeerFetch { .. } => ErrorCategory::Federation,
            Self::Storage { .. } => ErrorCategory::Infrastructure,
            Self::Configuration { .. } => ErrorCategory::Configuration,
            Self::Internal { .. } => ErrorCategory::Internal,
        }
    }

    /// Returns the message that may be shown to an external caller.
    ///
    /// Signature, expiry and claim failures all read the same.
    #[must_use]
    pub fn public_message(&self) -> String {
        match self {
            Self::InvalidToken { .. } | Self::ClaimsNotConform => "invalid token".to_string(),
            Self::InvalidRefreshToken { .. } => "invalid refresh token".to_string(),
            Self::RefreshLimitExceeded { .. } => self.to_string(),
            _ => "internal error".to_string(),
        }
    }
}

impl From<jsonwebtoken::errors::Error> for AuthError {
    fn from(err: jsonwebtoken::errors::Error) -> Self {
        use jsonwebtoken::errors::ErrorKind;

        match err.kind() {
            ErrorKind::InvalidRsaKey(_) | ErrorKind::InvalidEcdsaKey | ErrorKind::InvalidKeyFormat => {
                Self::key_decode(err.to_string())
            }
            _ => Self::invalid_token(err.to_string()),
        }
    }
}

/// Categories of errors for logging and metrics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// Key generation, decoding or algorithm support.
    Key,
    /// Token validation.
    Token,
    /// Refresh flow.
    Refresh,
    /// Peer key set federation.
    Federation,
    /// Storage failures.
    Infrastructure,
    /// Configuration problems.
    Configuration,
    /// Unexpected internal errors.
    Internal,
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Key => "key",
            Self::Token => "token",
            Self::Refresh => "refresh",
            Self::Federation => "federation",
            Self::Infrastructure => "infrastructure",
            Self::Configuration => "configuration",
            Self::Internal => "internal",
        };
        write!(f, "{}", s)
    }
}
