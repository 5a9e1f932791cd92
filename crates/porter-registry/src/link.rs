//! `Link` header parsing.
//!
//! Registries use RFC-8288-style `Link` headers in two ways: to advertise
//! alternative locations for a package (`rel="canonical"` / `rel="alternate"`)
//! and to advertise alternate manifests for a release (entries carrying
//! `filename` and `swift-tools-version` parameters). Both parsers accept the
//! slightly loose superset that registries emit in practice.

use url::Url;

use crate::error::{RegistryError, RegistryResult};

/// Kind of an alternative package location.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlternativeLocationKind {
    /// The registry considers itself the canonical location.
    Canonical,

    /// A mirror or origin known to host the same package.
    Alternate,
}

/// An alternative location entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AlternativeLocation {
    /// Location URL.
    pub url: Url,

    /// Relation of the location to the queried registry.
    pub kind: AlternativeLocationKind,
}

/// An alternate-manifest entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AlternateManifest {
    /// Where the manifest can be fetched.
    pub url: Url,

    /// Manifest filename (e.g. `Package@swift-5.5.swift`).
    pub filename: String,

    /// Tools version the manifest requires.
    pub tools_version: ToolsVersion,
}

/// Parse alternative-location entries from a `Link` header value.
///
/// Each entry has a `<URL>` field and a `rel` field. Entries with unknown
/// relations or a malformed shape are skipped; they are advisory only.
pub fn parse_alternative_locations(header: &str) -> Vec<AlternativeLocation> {
    split_entries(header)
        .filter_map(|entry| {
            let mut url = None;
            let mut kind = None;
            for field in entry.split(';') {
                let field = field.trim();
                if let Some(target) = parse_url_field(field) {
                    url = Url::parse(target).ok();
                } else if let Some(value) = parse_parameter(field, "rel") {
                    kind = match value.as_str() {
                        "canonical" => Some(AlternativeLocationKind::Canonical),
                        "alternate" => Some(AlternativeLocationKind::Alternate),
                        _ => None,
                    };
                }
            }
            Some(AlternativeLocation {
                url: url?,
                kind: kind?,
            })
        })
        .collect()
}

/// Parse alternate-manifest entries from a `Link` header value.
///
/// Entries carry four fields in any order: `<URL>`, `rel="alternate"`,
/// `filename="..."`, and `swift-tools-version="..."`. Entries with other
/// relations or a missing field are dropped; a syntactically invalid tools
/// version fails the whole parse.
pub fn parse_alternate_manifests(header: &str) -> RegistryResult<Vec<AlternateManifest>> {
    let mut manifests = Vec::new();

    for entry in split_entries(header) {
        let mut url = None;
        let mut rel = None;
        let mut filename = None;
        let mut tools_version = None;

        for field in entry.split(';') {
            let field = field.trim();
            if let Some(target) = parse_url_field(field) {
                url = Url::parse(target).ok();
            } else if let Some(value) = parse_parameter(field, "rel") {
                rel = Some(value);
            } else if let Some(value) = parse_parameter(field, "filename") {
                filename = Some(value);
            } else if let Some(value) = parse_parameter(field, "swift-tools-version") {
                tools_version = Some(value.parse::<ToolsVersion>().map_err(|_| {
                    RegistryError::InvalidResponse {
                        message: format!("invalid tools version in Link header: {}", value),
                    }
                })?);
            }
        }

        if rel.as_deref() != Some("alternate") {
            continue;
        }
        let (Some(url), Some(filename), Some(tools_version)) = (url, filename, tools_version)
        else {
            continue;
        };

        manifests.push(AlternateManifest {
            url,
            filename,
            tools_version,
        });
    }

    Ok(manifests)
}

/// Split a possibly comma-joined `Link` header into entries.
fn split_entries(header: &str) -> impl Iterator<Item = &str> {
    header
        .split(',')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
}

/// Extract the target of a `<URL>` field.
fn parse_url_field(field: &str) -> Option<&str> {
    field.strip_prefix('<')?.strip_suffix('>')
}

/// Extract a `name="value"` (or bare `name=value`) parameter.
fn parse_parameter(field: &str, name: &str) -> Option<String> {
    let (key, value) = field.split_once('=')?;
    if !key.trim().eq_ignore_ascii_case(name) {
        return None;
    }
    Some(value.trim().trim_matches('"').to_string())
}

/// A tools version: `major.minor` with an optional patch component.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct ToolsVersion {
    pub major: u64,
    pub minor: u64,
    pub patch: Option<u64>,
}

impl std::fmt::Display for ToolsVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.patch {
            Some(patch) => write!(f, "{}.{}.{}", self.major, self.minor, patch),
            None => write!(f, "{}.{}", self.major, self.minor),
        }
    }
}

impl std::str::FromStr for ToolsVersion {
    type Err = RegistryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || RegistryError::InvalidResponse {
            message: format!("invalid tools version: {}", s),
        };

        let mut parts = s.trim().split('.');
        let major = parts
            .next()
            .and_then(|p| p.parse().ok())
            .ok_or_else(invalid)?;
        let minor = parts
            .next()
            .and_then(|p| p.parse().ok())
            .ok_or_else(invalid)?;
        let patch = match parts.next() {
            Some(p) => Some(p.parse().map_err(|_| invalid())?),
            None => None,
        };
        if parts.next().is_some() {
            return Err(invalid());
        }

        Ok(Self {
            major,
            minor,
            patch,
        })
    }
}

/// Parse the tools version declared at the top of a manifest body.
///
/// Manifests start with a `// swift-tools-version:X.Y` comment line.
pub fn tools_version_from_manifest(content: &str) -> Option<ToolsVersion> {
    let first_line = content.lines().next()?;
    let rest = first_line.trim().strip_prefix("//")?;
    let (label, version) = rest.split_once(':')?;
    if !label.trim().eq_ignore_ascii_case("swift-tools-version") {
        return None;
    }
    version.trim().parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_alternative_locations_both_kinds() {
        let header = r#"<https://a>; rel="canonical", <ssh://b>; rel="alternate""#;
        let locations = parse_alternative_locations(header);
        assert_eq!(locations.len(), 2);
        assert_eq!(locations[0].url.as_str(), "https://a/");
        assert_eq!(locations[0].kind, AlternativeLocationKind::Canonical);
        assert_eq!(locations[1].url.as_str(), "ssh://b");
        assert_eq!(locations[1].kind, AlternativeLocationKind::Alternate);
    }

    #[test]
    fn test_alternative_locations_skip_unknown_rel() {
        let header = r#"<https://a>; rel="canonical", <https://b>; rel="payment""#;
        let locations = parse_alternative_locations(header);
        assert_eq!(locations.len(), 1);
        assert_eq!(locations[0].kind, AlternativeLocationKind::Canonical);
    }

    #[test]
    fn test_alternative_locations_skip_malformed() {
        let header = r#"https://no-brackets; rel="canonical", <https://b>"#;
        assert!(parse_alternative_locations(header).is_empty());
    }

    #[test]
    fn test_alternate_manifests_fields_in_any_order() {
        let header = concat!(
            r#"filename="Package@swift-5.5.swift"; <https://r.example.com/mona/linkedlist/1.0.0/Package.swift?swift-version=5.5>; "#,
            r#"swift-tools-version="5.5"; rel="alternate""#
        );
        let manifests = parse_alternate_manifests(header).unwrap();
        assert_eq!(manifests.len(), 1);
        assert_eq!(manifests[0].filename, "Package@swift-5.5.swift");
        assert_eq!(
            manifests[0].tools_version,
            ToolsVersion {
                major: 5,
                minor: 5,
                patch: None
            }
        );
    }

    #[test]
    fn test_alternate_manifests_drop_other_rels() {
        let header = concat!(
            r#"<https://a>; rel="canonical"; filename="Package.swift"; swift-tools-version="5.5", "#,
            r#"<https://b>; rel="alternate"; filename="Package@swift-5.6.swift"; swift-tools-version="5.6""#
        );
        let manifests = parse_alternate_manifests(header).unwrap();
        assert_eq!(manifests.len(), 1);
        assert_eq!(manifests[0].filename, "Package@swift-5.6.swift");
    }

    #[test]
    fn test_alternate_manifests_drop_incomplete_entries() {
        // Missing swift-tools-version.
        let header = r#"<https://a>; rel="alternate"; filename="Package.swift""#;
        assert!(parse_alternate_manifests(header).unwrap().is_empty());
    }

    #[test]
    fn test_alternate_manifests_invalid_tools_version_is_fatal() {
        let header =
            r#"<https://a>; rel="alternate"; filename="Package.swift"; swift-tools-version="five""#;
        assert!(matches!(
            parse_alternate_manifests(header),
            Err(RegistryError::InvalidResponse { .. })
        ));
    }

    #[test]
    fn test_tools_version_parsing() {
        assert_eq!(
            "5.5".parse::<ToolsVersion>().unwrap(),
            ToolsVersion {
                major: 5,
                minor: 5,
                patch: None
            }
        );
        assert_eq!(
            "5.5.2".parse::<ToolsVersion>().unwrap().to_string(),
            "5.5.2"
        );
        assert!("5".parse::<ToolsVersion>().is_err());
        assert!("5.5.2.1".parse::<ToolsVersion>().is_err());
        assert!("five.five".parse::<ToolsVersion>().is_err());
    }

    #[test]
    fn test_tools_version_from_manifest() {
        let manifest = "// swift-tools-version:5.5\nimport PackageDescription\n";
        assert_eq!(
            tools_version_from_manifest(manifest),
            Some(ToolsVersion {
                major: 5,
                minor: 5,
                patch: None
            })
        );

        let spaced = "// swift-tools-version: 5.7\n";
        assert_eq!(
            tools_version_from_manifest(spaced).map(|v| v.to_string()),
            Some("5.7".to_string())
        );

        assert_eq!(tools_version_from_manifest("import PackageDescription"), None);
    }
}
