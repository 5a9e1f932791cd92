//! Registry endpoints and per-scope registry configuration.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::{RegistryError, RegistryResult};
use crate::identity::Scope;

/// A package registry endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Registry {
    /// Base URL of the registry.
    pub url: Url,

    /// Whether the registry implements the availability probe endpoint.
    #[serde(default)]
    pub supports_availability: bool,
}

impl Registry {
    /// Create a registry from a base URL string.
    ///
    /// Only `https` (and `http`, for local testing) endpoints are accepted.
    pub fn new(url: impl AsRef<str>) -> RegistryResult<Self> {
        let url = url.as_ref();
        let parsed = Url::parse(url).map_err(|e| RegistryError::InvalidUrl {
            url: url.to_string(),
            reason: e.to_string(),
        })?;

        if parsed.scheme() != "https" && parsed.scheme() != "http" {
            return Err(RegistryError::InvalidUrl {
                url: url.to_string(),
                reason: format!("unsupported scheme {}", parsed.scheme()),
            });
        }
        if parsed.host_str().is_none() {
            return Err(RegistryError::InvalidUrl {
                url: url.to_string(),
                reason: "missing host".to_string(),
            });
        }

        Ok(Self {
            url: parsed,
            supports_availability: false,
        })
    }

    /// Mark the registry as supporting the availability probe.
    pub fn with_availability(mut self) -> Self {
        self.supports_availability = true;
        self
    }

    /// Base URL without a trailing slash, for joining endpoint paths.
    pub(crate) fn base(&self) -> &str {
        self.url.as_str().trim_end_matches('/')
    }
}

impl std::fmt::Display for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.url)
    }
}

/// Mapping from package scopes to registries.
///
/// Every registry operation targeting a registry identity resolves the
/// registry for its scope here before doing anything else; an unresolvable
/// scope fails with [`RegistryError::RegistryNotConfigured`] without any
/// network traffic.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RegistryConfiguration {
    /// Registry used for scopes with no dedicated entry.
    #[serde(default)]
    pub default_registry: Option<Registry>,

    /// Per-scope registry overrides.
    #[serde(default)]
    pub scoped_registries: HashMap<Scope, Registry>,
}

impl RegistryConfiguration {
    /// Create an empty configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the default registry.
    pub fn with_default(mut self, registry: Registry) -> Self {
        self.default_registry = Some(registry);
        self
    }

    /// Add a per-scope registry.
    pub fn with_scope(mut self, scope: Scope, registry: Registry) -> Self {
        self.scoped_registries.insert(scope, registry);
        self
    }

    /// Resolve the registry for a scope.
    pub fn registry_for(&self, scope: &Scope) -> RegistryResult<&Registry> {
        self.scoped_registries
            .get(scope)
            .or(self.default_registry.as_ref())
            .ok_or_else(|| RegistryError::RegistryNotConfigured {
                scope: Some(scope.to_string()),
            })
    }

    /// The default registry, for operations not tied to a scope.
    pub fn default_registry(&self) -> RegistryResult<&Registry> {
        self.default_registry
            .as_ref()
            .ok_or(RegistryError::RegistryNotConfigured { scope: None })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registry_rejects_bad_urls() {
        assert!(matches!(
            Registry::new("not a url"),
            Err(RegistryError::InvalidUrl { .. })
        ));
        assert!(matches!(
            Registry::new("ftp://registry.example.com"),
            Err(RegistryError::InvalidUrl { .. })
        ));
    }

    #[test]
    fn test_registry_base_strips_trailing_slash() {
        let registry = Registry::new("https://registry.example.com/").unwrap();
        assert_eq!(registry.base(), "https://registry.example.com");
    }

    #[test]
    fn test_scope_resolution_prefers_scoped_entry() {
        let default = Registry::new("https://global.example.com").unwrap();
        let scoped = Registry::new("https://mona.example.com").unwrap();
        let config = RegistryConfiguration::new()
            .with_default(default.clone())
            .with_scope(Scope::parse("mona").unwrap(), scoped.clone());

        let mona = Scope::parse("mona").unwrap();
        let other = Scope::parse("other").unwrap();
        assert_eq!(config.registry_for(&mona).unwrap(), &scoped);
        assert_eq!(config.registry_for(&other).unwrap(), &default);
    }

    #[test]
    fn test_unconfigured_scope_fails() {
        let config = RegistryConfiguration::new();
        let scope = Scope::parse("mona").unwrap();
        assert!(matches!(
            config.registry_for(&scope),
            Err(RegistryError::RegistryNotConfigured { scope: Some(s) }) if s == "mona"
        ));
        assert!(matches!(
            config.default_registry(),
            Err(RegistryError::RegistryNotConfigured { scope: None })
        ));
    }
}
