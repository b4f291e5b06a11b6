//! Bridge configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// App name sent in the identification handshake.
pub const DEFAULT_APP_NAME: &str = "meshlink";

/// Companion protocol version this bridge speaks.
pub const DEFAULT_PROTOCOL_VERSION: u8 = 3;

/// Default identification handshake timeout.
pub const DEFAULT_IDENTIFY_TIMEOUT_MS: u64 = 8000;

/// Default per-command timeout.
pub const DEFAULT_COMMAND_TIMEOUT_MS: u64 = 5000;

/// Default overall contact-collection timeout.
pub const DEFAULT_CONTACTS_TIMEOUT_MS: u64 = 15000;

/// Default grace period for the legacy engine's late-joining identification.
pub const DEFAULT_LEGACY_GRACE_MS: u64 = 2000;

/// Configuration for the connection coordinator and adapters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BridgeConfig {
    /// App name sent in the app-start handshake.
    pub app_name: String,
    /// Companion protocol version the app understands.
    pub protocol_version: u8,
    /// Timeout for the identification handshake.
    pub identify_timeout: Duration,
    /// Timeout for single request/response commands.
    pub command_timeout: Duration,
    /// Overall timeout for bulk contact collection.
    pub contacts_timeout: Duration,
    /// Grace period before re-checking the legacy engine's identity.
    pub legacy_grace: Duration,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            app_name: DEFAULT_APP_NAME.to_string(),
            protocol_version: DEFAULT_PROTOCOL_VERSION,
            identify_timeout: Duration::from_millis(DEFAULT_IDENTIFY_TIMEOUT_MS),
            command_timeout: Duration::from_millis(DEFAULT_COMMAND_TIMEOUT_MS),
            contacts_timeout: Duration::from_millis(DEFAULT_CONTACTS_TIMEOUT_MS),
            legacy_grace: Duration::from_millis(DEFAULT_LEGACY_GRACE_MS),
        }
    }
}

impl BridgeConfig {
    /// Start building a configuration.
    pub fn builder() -> BridgeConfigBuilder {
        BridgeConfigBuilder::new()
    }
}

/// Builder for [`BridgeConfig`].
#[derive(Debug, Default)]
pub struct BridgeConfigBuilder {
    config: BridgeConfig,
}

impl BridgeConfigBuilder {
    /// Create a builder seeded with defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the app name sent during identification.
    pub fn app_name(mut self, name: impl Into<String>) -> Self {
        self.config.app_name = name.into();
        self
    }

    /// Set the protocol version.
    pub fn protocol_version(mut self, version: u8) -> Self {
        self.config.protocol_version = version;
        self
    }

    /// Set the identification timeout.
    pub fn identify_timeout(mut self, timeout: Duration) -> Self {
        self.config.identify_timeout = timeout;
        self
    }

    /// Set the per-command timeout.
    pub fn command_timeout(mut self, timeout: Duration) -> Self {
        self.config.command_timeout = timeout;
        self
    }

    /// Set the contact-collection timeout.
    pub fn contacts_timeout(mut self, timeout: Duration) -> Self {
        self.config.contacts_timeout = timeout;
        self
    }

    /// Set the legacy identification grace period.
    pub fn legacy_grace(mut self, grace: Duration) -> Self {
        self.config.legacy_grace = grace;
        self
    }

    /// Finish building.
    pub fn build(self) -> BridgeConfig {
        self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = BridgeConfig::default();
        assert_eq!(config.app_name, DEFAULT_APP_NAME);
        assert_eq!(config.protocol_version, DEFAULT_PROTOCOL_VERSION);
        assert_eq!(config.identify_timeout, Duration::from_secs(8));
    }

    #[test]
    fn test_builder_overrides() {
        let config = BridgeConfig::builder()
            .app_name("trail-app")
            .protocol_version(8)
            .identify_timeout(Duration::from_secs(3))
            .legacy_grace(Duration::from_millis(500))
            .build();

        assert_eq!(config.app_name, "trail-app");
        assert_eq!(config.protocol_version, 8);
        assert_eq!(config.identify_timeout, Duration::from_secs(3));
        assert_eq!(config.legacy_grace, Duration::from_millis(500));
        assert_eq!(
            config.command_timeout,
            Duration::from_millis(DEFAULT_COMMAND_TIMEOUT_MS)
        );
    }

    #[test]
    fn test_serde_round_trip() {
        let config = BridgeConfig::builder().app_name("round-trip").build();
        let json = serde_json::to_string(&config).unwrap();
        let parsed: BridgeConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, config);
    }
}
