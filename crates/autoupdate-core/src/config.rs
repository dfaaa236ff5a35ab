//! Configuration types for the auto-update system
//!
//! - [`ProxyConfig`]: the live, reloadable network path (proxy + CA)
//! - [`UpdateIdentity`]: static identity supplied once at startup
//! - [`EngineConfig`]: scheduling and event settings

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// A configuration snapshot describing how to reach the update service
///
/// Snapshots are compared by `proxy_address` only: two snapshots with the
/// same address are treated as the same configuration even when the CA
/// certificate differs.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProxyConfig {
    /// Forward proxy address (e.g., "10.0.0.1:8080"); empty disables updates
    #[serde(default)]
    pub proxy_address: String,

    /// PEM-encoded CA certificate trusted for proxied connections
    #[serde(default)]
    pub ca_certificate: Vec<u8>,
}

impl ProxyConfig {
    /// Create a new snapshot
    pub fn new(proxy_address: impl Into<String>, ca_certificate: impl Into<Vec<u8>>) -> Self {
        Self {
            proxy_address: proxy_address.into(),
            ca_certificate: ca_certificate.into(),
        }
    }

    /// A snapshot with no known proxy
    pub fn disabled() -> Self {
        Self::default()
    }

    /// Whether this snapshot provides a network path at all
    pub fn has_proxy(&self) -> bool {
        !self.proxy_address.is_empty()
    }
}

/// Static identity of the running software
///
/// Immutable for the lifetime of an engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateIdentity {
    /// Version string of the running binary
    pub current_version: String,

    /// URL of the update service
    pub service_url: String,

    /// Public key used by the updater to verify update signatures
    #[serde(default)]
    pub public_key: Vec<u8>,
}

impl UpdateIdentity {
    /// Create a new identity
    pub fn new(
        current_version: impl Into<String>,
        service_url: impl Into<String>,
        public_key: impl Into<Vec<u8>>,
    ) -> Self {
        Self {
            current_version: current_version.into(),
            service_url: service_url.into(),
            public_key: public_key.into(),
        }
    }

    /// Validate the identity
    pub fn validate(&self) -> Result<(), crate::Error> {
        if self.current_version.trim().is_empty() {
            return Err(crate::Error::config("Current version cannot be empty"));
        }

        if self.service_url.is_empty() {
            return Err(crate::Error::config("Update service URL cannot be empty"));
        }

        if !self.service_url.starts_with("https://") && !self.service_url.starts_with("http://") {
            return Err(crate::Error::config(format!(
                "Update service URL must use HTTP or HTTPS scheme. Got: {}",
                self.service_url
            )));
        }

        Ok(())
    }
}

/// Engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Fixed delay between the end of one update attempt and the start of the next (in seconds)
    ///
    /// The delay is the same whether the last attempt succeeded, found nothing
    /// to update, or failed.
    ///
    /// Default: 7200 (2 hours)
    #[serde(default = "default_attempt_interval_secs")]
    pub attempt_interval_secs: u64,

    /// Capacity of the engine event channel
    ///
    /// When full, new events are dropped (with a warning log).
    ///
    /// Default: 1000 events
    #[serde(default = "default_event_channel_capacity")]
    pub event_channel_capacity: usize,
}

impl EngineConfig {
    /// Fixed delay between attempts
    pub fn attempt_interval(&self) -> Duration {
        Duration::from_secs(self.attempt_interval_secs)
    }

    /// Override the delay between attempts
    pub fn with_attempt_interval_secs(mut self, secs: u64) -> Self {
        self.attempt_interval_secs = secs;
        self
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), crate::Error> {
        if self.attempt_interval_secs == 0 {
            return Err(crate::Error::config("Attempt interval must be > 0"));
        }

        if self.event_channel_capacity == 0 {
            return Err(crate::Error::config("Event channel capacity must be > 0"));
        }

        Ok(())
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            attempt_interval_secs: default_attempt_interval_secs(),
            event_channel_capacity: default_event_channel_capacity(),
        }
    }
}

fn default_attempt_interval_secs() -> u64 {
    2 * 60 * 60
}

fn default_event_channel_capacity() -> usize {
    1000
}
