//! API response types and the externally visible metadata model.

use semver::Version;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::signing::SigningEntity;

/// Name of the canonical source-archive resource.
pub const SOURCE_ARCHIVE_RESOURCE: &str = "source-archive";

/// Filename of the metadata sidecar written into an extracted package.
pub const SIDECAR_FILENAME: &str = ".registry-metadata";

/// Availability of a registry, as reported by its probe endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AvailabilityStatus {
    /// Registry answered the probe with 200.
    Available,

    /// Registry answered with 404 or 501 (probe unsupported or disabled).
    Unavailable,

    /// Registry answered with a server-side error description.
    Error(String),
}

/// Package metadata: the list of releases known to a registry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageMetadata {
    /// Registry the metadata came from.
    pub registry: Url,

    /// Known versions, sorted descending by semver precedence.
    pub versions: Vec<Version>,

    /// Alternative locations advertised via the `Link` header.
    pub alternate_locations: Vec<Url>,
}

/// Metadata for a single package version.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageVersionMetadata {
    /// Registry the metadata came from.
    pub registry: Url,

    /// License URL, if published.
    #[serde(default)]
    pub license_url: Option<Url>,

    /// Readme URL, if published.
    #[serde(default)]
    pub readme_url: Option<Url>,

    /// Source-control repository URLs, if published.
    #[serde(default)]
    pub repository_urls: Option<Vec<Url>>,

    /// Release resources; the canonical one is named `source-archive`.
    pub resources: Vec<Resource>,

    /// Package author, if published.
    #[serde(default)]
    pub author: Option<Author>,

    /// Package description, if published.
    #[serde(default)]
    pub description: Option<String>,
}

impl PackageVersionMetadata {
    /// The canonical source-archive resource, if present.
    pub fn source_archive(&self) -> Option<&Resource> {
        self.resources
            .iter()
            .find(|r| r.name == SOURCE_ARCHIVE_RESOURCE)
    }
}

/// A downloadable resource attached to a release.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resource {
    /// Resource name (e.g. `source-archive`).
    pub name: String,

    /// Resource content type (e.g. `application/zip`).
    pub content_type: String,

    /// Checksum of the resource, lowercase hex.
    #[serde(default)]
    pub checksum: Option<String>,

    /// Detached signature over the resource.
    #[serde(default)]
    pub signing: Option<SigningInfo>,
}

/// Detached signature carried in release metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SigningInfo {
    /// Base64-encoded signature bytes.
    pub signature_base64: String,

    /// Signature format identifier (e.g. `cms-1.0.0`).
    pub signature_format: String,
}

/// Package author.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Author {
    /// Author name.
    pub name: String,

    /// Contact email.
    #[serde(default)]
    pub email: Option<String>,

    /// Home page.
    #[serde(default)]
    pub url: Option<Url>,
}

/// Sidecar record persisted next to an extracted package.
///
/// Captures where the package came from, the metadata it was downloaded
/// with, and the signature outcome. Must round-trip through JSON.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistryReleaseMetadata {
    /// Provenance of the release.
    pub source: RegistryReleaseSource,

    /// Version metadata the release was validated against.
    pub metadata: PackageVersionMetadata,

    /// Signature outcome, when the release was signed.
    #[serde(default)]
    pub signature: Option<RegistryReleaseSignature>,
}

/// Provenance of a downloaded release.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistryReleaseSource {
    /// Registry base URL.
    pub registry: Url,
}

/// Signature outcome recorded in the sidecar.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistryReleaseSignature {
    /// Signature format identifier.
    pub format: String,

    /// Verified signing entity; absent when the user chose to proceed
    /// without one.
    #[serde(default)]
    pub signed_by: Option<SigningEntity>,
}

// ---------------------------------------------------------------------------
// Wire payloads
// ---------------------------------------------------------------------------

/// Body of `GET /{scope}/{name}`.
#[derive(Debug, Deserialize)]
pub(crate) struct ReleasesPayload {
    pub releases: std::collections::HashMap<String, ReleaseSummary>,
}

/// One entry of the releases map.
#[derive(Debug, Deserialize)]
pub(crate) struct ReleaseSummary {
    #[serde(default)]
    #[allow(dead_code)]
    pub url: Option<String>,

    /// Present when the release is unavailable (e.g. yanked).
    #[serde(default)]
    pub problem: Option<ProblemDetails>,
}

/// `application/problem+json` body.
#[derive(Debug, Deserialize)]
pub(crate) struct ProblemDetails {
    #[serde(default)]
    pub status: Option<u16>,

    #[serde(default)]
    pub title: Option<String>,

    #[serde(default)]
    pub detail: Option<String>,
}

impl ProblemDetails {
    /// Best human-readable description of the problem.
    pub fn describe(&self) -> Option<String> {
        self.detail.clone().or_else(|| self.title.clone())
    }
}

/// Body of `GET /{scope}/{name}/{version}`.
#[derive(Debug, Deserialize)]
pub(crate) struct VersionMetadataPayload {
    pub resources: Vec<ResourcePayload>,

    #[serde(default)]
    pub metadata: Option<AdditionalMetadataPayload>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ResourcePayload {
    pub name: String,

    #[serde(rename = "type")]
    pub content_type: String,

    #[serde(default)]
    pub checksum: Option<String>,

    #[serde(default)]
    pub signing: Option<SigningPayload>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct SigningPayload {
    #[serde(rename = "signatureBase64Encoded")]
    pub signature_base64: String,

    #[serde(rename = "signatureFormat")]
    pub signature_format: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct AdditionalMetadataPayload {
    #[serde(default)]
    pub author: Option<AuthorPayload>,

    #[serde(default)]
    pub description: Option<String>,

    #[serde(default, rename = "licenseURL")]
    pub license_url: Option<String>,

    #[serde(default, rename = "readmeURL")]
    pub readme_url: Option<String>,

    #[serde(default, rename = "repositoryURLs")]
    pub repository_urls: Option<Vec<String>>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct AuthorPayload {
    pub name: String,

    #[serde(default)]
    pub email: Option<String>,

    #[serde(default)]
    pub url: Option<String>,
}

/// Body of `GET /identifiers?url=...`.
#[derive(Debug, Deserialize)]
pub(crate) struct IdentifiersPayload {
    pub identifiers: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_releases_payload_decodes_problem_entries() {
        let body = r#"{"releases":{"1.0.0":{"url":"https://r.example.com/mona/linkedlist/1.0.0"},"2.0.0-beta":{"problem":{"status":410,"detail":"removed"}}}}"#;
        let payload: ReleasesPayload = serde_json::from_str(body).unwrap();
        assert_eq!(payload.releases.len(), 2);
        assert!(payload.releases["1.0.0"].problem.is_none());
        let problem = payload.releases["2.0.0-beta"].problem.as_ref().unwrap();
        assert_eq!(problem.status, Some(410));
        assert_eq!(problem.describe(), Some("removed".to_string()));
    }

    #[test]
    fn test_version_metadata_payload_decodes_signing_block() {
        let body = r#"{
            "id": "mona.linkedlist",
            "version": "1.1.1",
            "resources": [{
                "name": "source-archive",
                "type": "application/zip",
                "checksum": "a2ac54cf25fbc1ad0028f03f0aa4b96833b83bb05a14e510892bb27dea4dc812",
                "signing": {
                    "signatureBase64Encoded": "l0cwLerL0sSP",
                    "signatureFormat": "cms-1.0.0"
                }
            }],
            "metadata": {
                "author": {"name": "Mona"},
                "description": "A linked list",
                "licenseURL": "https://example.com/LICENSE",
                "repositoryURLs": ["https://example.com/mona/LinkedList.git"]
            }
        }"#;
        let payload: VersionMetadataPayload = serde_json::from_str(body).unwrap();
        assert_eq!(payload.resources.len(), 1);
        let signing = payload.resources[0].signing.as_ref().unwrap();
        assert_eq!(signing.signature_format, "cms-1.0.0");
        let metadata = payload.metadata.unwrap();
        assert_eq!(metadata.author.unwrap().name, "Mona");
        assert_eq!(
            metadata.license_url.as_deref(),
            Some("https://example.com/LICENSE")
        );
    }

    #[test]
    fn test_sidecar_round_trip() {
        let metadata = PackageVersionMetadata {
            registry: Url::parse("https://registry.example.com").unwrap(),
            license_url: None,
            readme_url: None,
            repository_urls: None,
            resources: vec![Resource {
                name: SOURCE_ARCHIVE_RESOURCE.to_string(),
                content_type: "application/zip".to_string(),
                checksum: Some("abc123".to_string()),
                signing: None,
            }],
            author: None,
            description: Some("A linked list".to_string()),
        };
        let sidecar = RegistryReleaseMetadata {
            source: RegistryReleaseSource {
                registry: Url::parse("https://registry.example.com").unwrap(),
            },
            metadata,
            signature: None,
        };

        let json = serde_json::to_string(&sidecar).unwrap();
        let restored: RegistryReleaseMetadata = serde_json::from_str(&json).unwrap();
        assert_eq!(restored, sidecar);

        // Identical inputs serialize to identical bytes.
        assert_eq!(json, serde_json::to_string(&sidecar).unwrap());
    }

    #[test]
    fn test_source_archive_lookup() {
        let metadata = PackageVersionMetadata {
            registry: Url::parse("https://registry.example.com").unwrap(),
            license_url: None,
            readme_url: None,
            repository_urls: None,
            resources: vec![Resource {
                name: "documentation".to_string(),
                content_type: "application/zip".to_string(),
                checksum: None,
                signing: None,
            }],
            author: None,
            description: None,
        };
        assert!(metadata.source_archive().is_none());
    }
}
