//! Background key rotation.
//!
//! [`KeyRotator`] periodically generates a replacement key once the current
//! key passes its renewal time, persists it, and drops keys past expiry.
//! The polling interval comes from configuration; there is no built-in
//! default, so rotation only runs when an interval is configured.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::Span;

use crate::AuthResult;
use crate::config::RotationConfig;
use crate::keys::{KeyCache, KeyStore};

/// Outcome of one rotation check.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RotationReport {
    /// Key ID of the key generated in this check, if any.
    pub generated: Option<String>,
    /// Number of expired keys removed.
    pub removed: usize,
}

/// Periodic renewal and cleanup for a [`KeyCache`].
pub struct KeyRotator {
    cache: Arc<KeyCache>,
    store: Option<Arc<dyn KeyStore>>,
    interval: Duration,
    span: Span,
}

impl KeyRotator {
    /// Creates a rotator that checks `cache` every `interval`.
    #[must_use]
    pub fn new(cache: Arc<KeyCache>, interval: Duration) -> Self {
        Self {
            cache,
            store: None,
            interval,
            span: tracing::info_span!("key_rotator"),
        }
    }

    /// Builds a rotator from configuration, or `None` when rotation is disabled.
    #[must_use]
    pub fn from_config(cache: Arc<KeyCache>, config: &RotationConfig) -> Option<Self> {
        config
            .check_interval
            .map(|interval| Self::new(cache, interval))
    }

    /// Persists generated keys to `store`.
    #[must_use]
    pub fn with_store(mut self, store: Arc<dyn KeyStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Replaces the span diagnostics are emitted under.
    #[must_use]
    pub fn with_span(mut self, span: Span) -> Self {
        self.span = span;
        self
    }

    /// Returns the polling interval.
    #[must_use]
    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Runs one rotation check.
    ///
    /// # Errors
    ///
    /// Returns an error if key generation or persistence fails. A key that
    /// could not be persisted is not used; the next tick generates another.
    pub async fn tick(&self) -> AuthResult<RotationReport> {
        let mut report = RotationReport::default();

        if let Some(pair) = self.cache.rotate_if_due(self.store.as_deref()).await? {
            report.generated = Some(pair.kid().to_string());
        }

        report.removed = self.cache.clean().await;
        Ok(report)
    }

    /// Spawns the rotation loop. It stops when `cancel` is triggered.
    ///
    /// Must be called within a Tokio runtime.
    pub fn spawn(self, cancel: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            // First tick completes immediately.
            ticker.tick().await;

            tracing::info!(parent: &self.span, interval = ?self.interval, "Key rotation started");
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => {
                        tracing::info!(parent: &self.span, "Key rotation shutting down");
                        break;
                    }
                    _ = ticker.tick() => {
                        match self.tick().await {
                            Ok(report) => tracing::debug!(
                                parent: &self.span,
                                generated = ?report.generated,
                                removed = report.removed,
                                "Key rotation check complete"
                            ),
                            Err(e) => tracing::warn!(
                                parent: &self.span,
                                error = %e,
                                "Key rotation check failed"
                            ),
                        }
                    }
                }
            }
        })
    }
}

impl std::fmt::Debug for KeyRotator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyRotator")
            .field("interval", &self.interval)
            .field("persists", &self.store.is_some())
            .finish_non_exhaustive()
    }
}
