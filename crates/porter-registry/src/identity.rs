//! Package identity types.
//!
//! An identity comes in two shapes: an opaque free-form string, and a
//! registry identity of the form `scope.name`. Only registry identities can
//! be used with registry operations; everything else is rejected up front,
//! before any network traffic.

use serde::{Deserialize, Serialize};

use crate::error::{RegistryError, RegistryResult};

/// Maximum length of a scope or package name component.
const MAX_COMPONENT_LENGTH: usize = 40;

/// An opaque package identity.
///
/// Identities are case-insensitive and normalized to lowercase on
/// construction, so `Mona.LinkedList` and `mona.linkedlist` compare equal.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PackageIdentity(String);

impl PackageIdentity {
    /// Create an identity from a free-form string.
    pub fn new(description: impl AsRef<str>) -> Self {
        Self(description.as_ref().to_lowercase())
    }

    /// Get the identity as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Interpret this identity as a registry identity.
    ///
    /// Fails with [`RegistryError::InvalidPackageIdentity`] if the identity
    /// is not of the `scope.name` form.
    pub fn registry_identity(&self) -> RegistryResult<RegistryIdentity> {
        RegistryIdentity::parse(&self.0)
    }

    /// Whether this identity has the `scope.name` registry form.
    pub fn is_registry_identity(&self) -> bool {
        RegistryIdentity::parse(&self.0).is_ok()
    }
}

impl std::fmt::Display for PackageIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for PackageIdentity {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<RegistryIdentity> for PackageIdentity {
    fn from(identity: RegistryIdentity) -> Self {
        Self(identity.to_string())
    }
}

/// The scope component of a registry identity.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Scope(String);

impl Scope {
    /// Parse and validate a scope.
    pub fn parse(value: &str) -> RegistryResult<Self> {
        validate_component(value, "scope")?;
        Ok(Self(value.to_lowercase()))
    }

    /// Get the scope as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Scope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for Scope {
    type Err = RegistryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// The name component of a registry identity.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PackageName(String);

impl PackageName {
    /// Parse and validate a package name.
    pub fn parse(value: &str) -> RegistryResult<Self> {
        validate_component(value, "package name")?;
        Ok(Self(value.to_lowercase()))
    }

    /// Get the name as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for PackageName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for PackageName {
    type Err = RegistryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// A registry identity: `scope.name`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RegistryIdentity {
    /// Package scope.
    pub scope: Scope,

    /// Package name within the scope.
    pub name: PackageName,
}

impl RegistryIdentity {
    /// Create a registry identity from validated components.
    pub fn new(scope: Scope, name: PackageName) -> Self {
        Self { scope, name }
    }

    /// Parse a `scope.name` string into a registry identity.
    pub fn parse(value: &str) -> RegistryResult<Self> {
        let (scope, name) = value
            .split_once('.')
            .ok_or_else(|| RegistryError::InvalidPackageIdentity {
                identity: value.to_string(),
                reason: "expected the form scope.name".to_string(),
            })?;

        let scope = Scope::parse(scope).map_err(|_| RegistryError::InvalidPackageIdentity {
            identity: value.to_string(),
            reason: "invalid scope component".to_string(),
        })?;
        let name = PackageName::parse(name).map_err(|_| RegistryError::InvalidPackageIdentity {
            identity: value.to_string(),
            reason: "invalid name component".to_string(),
        })?;

        Ok(Self { scope, name })
    }
}

impl std::fmt::Display for RegistryIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}", self.scope, self.name)
    }
}

impl std::str::FromStr for RegistryIdentity {
    type Err = RegistryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// Validate a scope or name component.
///
/// Components are 1 to 40 characters of ASCII alphanumerics, hyphens, and
/// underscores; the first and last characters must be alphanumeric.
fn validate_component(value: &str, what: &str) -> RegistryResult<()> {
    let invalid = |reason: &str| RegistryError::InvalidPackageIdentity {
        identity: value.to_string(),
        reason: format!("{} {}", what, reason),
    };

    if value.is_empty() {
        return Err(invalid("cannot be empty"));
    }
    if value.len() > MAX_COMPONENT_LENGTH {
        return Err(invalid("exceeds 40 characters"));
    }
    if !value
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    {
        return Err(invalid(
            "may only contain alphanumerics, hyphens, and underscores",
        ));
    }

    let first = value.chars().next().unwrap_or_default();
    let last = value.chars().last().unwrap_or_default();
    if !first.is_ascii_alphanumeric() || !last.is_ascii_alphanumeric() {
        return Err(invalid("must start and end with an alphanumeric character"));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_registry_identity() {
        let identity = RegistryIdentity::parse("mona.LinkedList").unwrap();
        assert_eq!(identity.scope.as_str(), "mona");
        assert_eq!(identity.name.as_str(), "linkedlist");
        assert_eq!(identity.to_string(), "mona.linkedlist");
    }

    #[test]
    fn test_identity_case_insensitive() {
        let a = PackageIdentity::new("Mona.LinkedList");
        let b = PackageIdentity::new("mona.linkedlist");
        assert_eq!(a, b);
    }

    #[test]
    fn test_opaque_identity_is_not_registry_identity() {
        let identity = PackageIdentity::new("github.com/mona/LinkedList");
        assert!(!identity.is_registry_identity());
        assert!(matches!(
            identity.registry_identity(),
            Err(RegistryError::InvalidPackageIdentity { .. })
        ));
    }

    #[test]
    fn test_missing_separator_rejected() {
        assert!(matches!(
            RegistryIdentity::parse("linkedlist"),
            Err(RegistryError::InvalidPackageIdentity { .. })
        ));
    }

    #[test]
    fn test_extra_separator_rejected() {
        // The name component may not contain a dot.
        assert!(RegistryIdentity::parse("mona.linked.list").is_err());
    }

    #[test]
    fn test_component_interior_punctuation() {
        assert!(Scope::parse("mo-na").is_ok());
        assert!(Scope::parse("mo_na").is_ok());
        assert!(Scope::parse("-mona").is_err());
        assert!(Scope::parse("mona-").is_err());
        assert!(Scope::parse("mo!na").is_err());
    }

    #[test]
    fn test_component_length_limits() {
        let max = "a".repeat(40);
        assert!(PackageName::parse(&max).is_ok());
        let too_long = "a".repeat(41);
        assert!(PackageName::parse(&too_long).is_err());
        assert!(PackageName::parse("a").is_ok());
        assert!(PackageName::parse("").is_err());
    }

    #[test]
    fn test_roundtrip_through_opaque() {
        let identity = RegistryIdentity::parse("mona.linkedlist").unwrap();
        let opaque: PackageIdentity = identity.clone().into();
        assert_eq!(opaque.registry_identity().unwrap(), identity);
    }
}
