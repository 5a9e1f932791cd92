//! Client configuration.

use serde::{Deserialize, Serialize};

/// Registry client configuration.
///
/// TTLs and timeouts are plain fields with named defaults so tests can
/// shrink them; nothing here is a compiled-in constant.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Default request timeout in seconds. Per-operation overrides bound
    /// the HTTP leg only.
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,

    /// TTL for cached availability probe results, in seconds.
    #[serde(default = "default_availability_ttl")]
    pub availability_ttl_secs: u64,

    /// TTL for cached package-version metadata, in seconds.
    #[serde(default = "default_metadata_ttl")]
    pub metadata_ttl_secs: u64,
}

fn default_timeout() -> u64 {
    60
}

fn default_availability_ttl() -> u64 {
    5 * 60
}

fn default_metadata_ttl() -> u64 {
    60 * 60
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout(),
            availability_ttl_secs: default_availability_ttl(),
            metadata_ttl_secs: default_metadata_ttl(),
        }
    }
}

impl ClientConfig {
    /// Create config from environment variables.
    ///
    /// | Variable | Description |
    /// |----------|-------------|
    /// | `PORTER_REGISTRY_TIMEOUT` | Request timeout in seconds (default: 60) |
    /// | `PORTER_REGISTRY_AVAILABILITY_TTL` | Availability cache TTL in seconds (default: 300) |
    /// | `PORTER_REGISTRY_METADATA_TTL` | Metadata cache TTL in seconds (default: 3600) |
    pub fn from_env() -> Self {
        Self {
            timeout_secs: env_u64("PORTER_REGISTRY_TIMEOUT").unwrap_or_else(default_timeout),
            availability_ttl_secs: env_u64("PORTER_REGISTRY_AVAILABILITY_TTL")
                .unwrap_or_else(default_availability_ttl),
            metadata_ttl_secs: env_u64("PORTER_REGISTRY_METADATA_TTL")
                .unwrap_or_else(default_metadata_ttl),
        }
    }

    /// Set the default request timeout.
    pub fn with_timeout_secs(mut self, secs: u64) -> Self {
        self.timeout_secs = secs;
        self
    }

    /// Set the availability cache TTL.
    pub fn with_availability_ttl_secs(mut self, secs: u64) -> Self {
        self.availability_ttl_secs = secs;
        self
    }

    /// Set the metadata cache TTL.
    pub fn with_metadata_ttl_secs(mut self, secs: u64) -> Self {
        self.metadata_ttl_secs = secs;
        self
    }
}

fn env_u64(name: &str) -> Option<u64> {
    std::env::var(name).ok().and_then(|v| v.parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ClientConfig::default();
        assert_eq!(config.timeout_secs, 60);
        assert_eq!(config.availability_ttl_secs, 300);
        assert_eq!(config.metadata_ttl_secs, 3600);
    }

    #[test]
    fn test_builders() {
        let config = ClientConfig::default()
            .with_timeout_secs(5)
            .with_availability_ttl_secs(1)
            .with_metadata_ttl_secs(2);
        assert_eq!(config.timeout_secs, 5);
        assert_eq!(config.availability_ttl_secs, 1);
        assert_eq!(config.metadata_ttl_secs, 2);
    }

    #[test]
    fn test_serde_defaults() {
        let config: ClientConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config.timeout_secs, 60);
    }
}
