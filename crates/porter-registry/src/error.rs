//! Error types for the registry client.

use std::path::PathBuf;
use std::time::Duration;

use crate::signing::SigningEntity;

/// Registry errors.
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    // ---- input errors (recovered only by the caller) ----
    /// Identity is not a valid registry identity.
    #[error("invalid package identity: {identity} - {reason}")]
    InvalidPackageIdentity { identity: String, reason: String },

    /// URL could not be parsed or has an unsupported scheme.
    #[error("invalid URL: {url} - {reason}")]
    InvalidUrl { url: String, reason: String },

    /// No registry is configured for the scope (or no default registry).
    #[error("no registry configured{}", .scope.as_deref().map(|s| format!(" for scope {}", s)).unwrap_or_default())]
    RegistryNotConfigured { scope: Option<String> },

    /// Download destination already exists.
    #[error("path already exists: {}", .path.display())]
    PathAlreadyExists { path: PathBuf },

    // ---- transport errors, wrapped per operation ----
    /// Failure while listing package releases.
    #[error("failed retrieving releases for {package} from {registry}: {cause}")]
    FailedRetrievingReleases {
        registry: String,
        package: String,
        cause: Box<RegistryError>,
    },

    /// Failure while fetching version metadata.
    #[error("failed retrieving release info for {package} {version} from {registry}: {cause}")]
    FailedRetrievingReleaseInfo {
        registry: String,
        package: String,
        version: String,
        cause: Box<RegistryError>,
    },

    /// Failure anywhere in the source-archive download pipeline.
    #[error("failed downloading source archive for {package} {version} from {registry}: {cause}")]
    FailedDownloadingSourceArchive {
        registry: String,
        package: String,
        version: String,
        cause: Box<RegistryError>,
    },

    /// Failure while looking up identities for a source-control URL.
    #[error("failed looking up identities for {url} in {registry}: {cause}")]
    FailedIdentityLookup {
        registry: String,
        url: String,
        cause: Box<RegistryError>,
    },

    /// Failure while publishing a release.
    #[error("failed publishing {package} {version} to {registry}: {cause}")]
    FailedPublishing {
        registry: String,
        package: String,
        version: String,
        cause: Box<RegistryError>,
    },

    /// Raw transport failure.
    #[error("transport error: {message}")]
    Transport { message: String },

    /// Local I/O failure (filesystem or archive collaborators).
    #[error("I/O error: {message}")]
    Io { message: String },

    // ---- protocol errors ----
    /// Response body or headers were not what the protocol requires.
    #[error("invalid response: {message}")]
    InvalidResponse { message: String },

    /// Response status was outside the expected set.
    #[error("invalid response status: expected {expected:?}, got {actual}")]
    InvalidResponseStatus { expected: Vec<u16>, actual: u16 },

    /// `Content-Version` header missing or not the supported API version.
    #[error("invalid content version: expected {expected}, got {}", .actual.as_deref().unwrap_or("none"))]
    InvalidContentVersion {
        expected: String,
        actual: Option<String>,
    },

    /// `Content-Type` header missing or not the expected media type.
    #[error("invalid content type: expected {expected}, got {}", .actual.as_deref().unwrap_or("none"))]
    InvalidContentType {
        expected: String,
        actual: Option<String>,
    },

    // ---- availability errors ----
    /// Registry availability probe reported the registry unavailable.
    #[error("registry not available: {registry}")]
    RegistryNotAvailable { registry: String },

    /// Registry availability probe returned an error description.
    #[error("{message}")]
    AvailabilityCheckFailed { message: String },

    /// Authentication failed or token invalid.
    #[error("unauthorized: {message}")]
    Unauthorized { message: String },

    /// Authenticated but not allowed.
    #[error("forbidden: {message}")]
    Forbidden { message: String },

    /// Registry does not support the attempted authentication method.
    #[error("authentication method not supported")]
    AuthenticationMethodNotSupported,

    /// Server-side failure, possibly with problem details.
    #[error("server error {status}: {details}")]
    ServerError { status: u16, details: String },

    // ---- trust errors (authoritative, never retried) ----
    /// Version metadata has no source-archive resource.
    #[error("source archive not found in release metadata for {package} {version}")]
    MissingSourceArchive { package: String, version: String },

    /// Source-archive resource carries no checksum.
    #[error("source archive for {package} {version} has no checksum in release metadata")]
    SourceArchiveMissingChecksum { package: String, version: String },

    /// Source archive is not signed.
    #[error("source archive for {package} {version} is not signed")]
    SourceArchiveNotSigned { package: String, version: String },

    /// Signature present but its format is not declared.
    #[error("missing signature format")]
    MissingSignatureFormat,

    /// Declared signature format is not recognized.
    #[error("unknown signature format: {format}")]
    UnknownSignatureFormat { format: String },

    /// Signature failed verification.
    #[error("invalid signature: {reason}")]
    InvalidSignature { reason: String },

    /// Signing certificate failed validation.
    #[error("invalid signing certificate: {reason}")]
    InvalidSigningCertificate { reason: String },

    /// Signer is not trusted.
    #[error("signer not trusted for {package} {version}")]
    SignerNotTrusted { package: String, version: String },

    /// Signature could not be decoded.
    #[error("failed loading signature: {reason}")]
    FailedLoadingSignature { reason: String },

    /// Verification primitive itself failed.
    #[error("failed validating signature: {reason}")]
    FailedToValidateSignature { reason: String },

    /// Checksum differs from the previously recorded fingerprint.
    #[error("checksum changed: {latest} does not match previously recorded {previous}")]
    ChecksumChanged { latest: String, previous: String },

    /// Checksum differs from the one declared in release metadata.
    #[error("invalid checksum: expected {expected}, got {actual}")]
    InvalidChecksum { expected: String, actual: String },

    /// Signing entity differs from the one recorded for the package.
    #[error("signing entity for package {package} changed: {} was previously {previous}", display_entity(.latest))]
    SigningEntityForPackageChanged {
        package: String,
        latest: Option<SigningEntity>,
        previous: SigningEntity,
    },

    /// Signing entity differs from the one recorded for the release.
    #[error("signing entity for {package} {version} changed: {} was previously {previous}", display_entity(.latest))]
    SigningEntityForReleaseChanged {
        package: String,
        version: String,
        latest: Option<SigningEntity>,
        previous: SigningEntity,
    },

    /// A required policy knob is not configured.
    #[error("missing configuration: {details}")]
    MissingConfiguration { details: String },

    /// Asynchronous publish response carried no status location.
    #[error("asynchronous publishing response is missing its status location")]
    MissingPublishingLocation,

    // ---- not-found ----
    /// Package does not exist in the registry.
    #[error("package not found: {package}")]
    PackageNotFound { package: String },

    /// Package exists but the version does not.
    #[error("package version not found: {package} {version}")]
    PackageVersionNotFound { package: String, version: String },
}

fn display_entity(entity: &Option<SigningEntity>) -> String {
    match entity {
        Some(entity) => entity.to_string(),
        None => "none".to_string(),
    }
}

impl RegistryError {
    /// Wrap a cause in [`RegistryError::FailedDownloadingSourceArchive`].
    pub(crate) fn wrap_download(
        registry: &url::Url,
        package: &crate::identity::RegistryIdentity,
        version: &semver::Version,
        cause: RegistryError,
    ) -> Self {
        Self::FailedDownloadingSourceArchive {
            registry: registry.to_string(),
            package: package.to_string(),
            version: version.to_string(),
            cause: Box::new(cause),
        }
    }

    /// Whether the error is transient enough that a caller may retry.
    ///
    /// Trust errors are authoritative and never retryable.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Transport { .. } | Self::ServerError { status: 500 | 502 | 503, .. }
        )
    }
}

impl From<reqwest::Error> for RegistryError {
    fn from(err: reqwest::Error) -> Self {
        Self::Transport {
            message: err.to_string(),
        }
    }
}

impl From<std::io::Error> for RegistryError {
    fn from(err: std::io::Error) -> Self {
        Self::Io {
            message: err.to_string(),
        }
    }
}

/// Result type for registry operations.
pub type RegistryResult<T> = Result<T, RegistryError>;

/// Outcome of a publish request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PublishResult {
    /// Release was published synchronously (201).
    Published { location: Option<String> },

    /// Release is being processed asynchronously (202).
    Processing {
        status_url: String,
        retry_after: Option<Duration>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_not_configured() {
        let err = RegistryError::RegistryNotConfigured {
            scope: Some("mona".to_string()),
        };
        assert_eq!(err.to_string(), "no registry configured for scope mona");

        let err = RegistryError::RegistryNotConfigured { scope: None };
        assert_eq!(err.to_string(), "no registry configured");
    }

    #[test]
    fn test_error_display_checksum_changed() {
        let err = RegistryError::ChecksumChanged {
            latest: "abc".to_string(),
            previous: "def".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "checksum changed: abc does not match previously recorded def"
        );
    }

    #[test]
    fn test_error_display_content_version() {
        let err = RegistryError::InvalidContentVersion {
            expected: "1".to_string(),
            actual: Some("2".to_string()),
        };
        assert_eq!(err.to_string(), "invalid content version: expected 1, got 2");

        let err = RegistryError::InvalidContentVersion {
            expected: "1".to_string(),
            actual: None,
        };
        assert_eq!(
            err.to_string(),
            "invalid content version: expected 1, got none"
        );
    }

    #[test]
    fn test_wrapped_error_carries_cause() {
        let err = RegistryError::FailedRetrievingReleases {
            registry: "https://registry.example.com/".to_string(),
            package: "mona.linkedlist".to_string(),
            cause: Box::new(RegistryError::Transport {
                message: "connection refused".to_string(),
            }),
        };
        assert!(err.to_string().contains("connection refused"));
    }

    #[test]
    fn test_retryable_classification() {
        assert!(RegistryError::Transport {
            message: "timeout".into()
        }
        .is_retryable());
        assert!(RegistryError::ServerError {
            status: 503,
            details: "overloaded".into()
        }
        .is_retryable());
        assert!(!RegistryError::ChecksumChanged {
            latest: "a".into(),
            previous: "b".into()
        }
        .is_retryable());
        assert!(!RegistryError::PackageNotFound {
            package: "mona.linkedlist".into()
        }
        .is_retryable());
    }
}
