//! Signature validation over detached release signatures.
//!
//! Release metadata carries the signature (base64) and its format; the
//! cryptographic check itself is delegated to a [`SignatureVerifier`]
//! implementation. What lives here is the policy layer: what to do when an
//! archive is unsigned or signed by an untrusted certificate.

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use semver::Version;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::warn;

use crate::error::{RegistryError, RegistryResult};
use crate::identity::RegistryIdentity;
use crate::types::PackageVersionMetadata;

/// The principal that produced a signature.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SigningEntity {
    /// Whether the verifier recognized the entity's certificate chain.
    pub kind: SigningEntityKind,

    /// Subject name.
    pub name: String,

    /// Organization, when present in the certificate.
    #[serde(default)]
    pub organization: Option<String>,

    /// Organizational unit, when present in the certificate.
    #[serde(default)]
    pub organizational_unit: Option<String>,
}

/// Recognition status of a signing entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SigningEntityKind {
    /// Certificate chain is anchored in a recognized root.
    Recognized,

    /// Entity could be extracted but its chain is not recognized.
    Unrecognized,
}

impl std::fmt::Display for SigningEntity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.organization {
            Some(org) => write!(f, "{} ({})", self.name, org),
            None => write!(f, "{}", self.name),
        }
    }
}

/// Known signature formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignatureFormat {
    /// CMS detached signature, format id `cms-1.0.0`.
    Cms1_0_0,
}

impl SignatureFormat {
    /// Parse a format identifier from release metadata.
    pub fn parse(value: &str) -> RegistryResult<Self> {
        match value {
            "cms-1.0.0" => Ok(Self::Cms1_0_0),
            other => Err(RegistryError::UnknownSignatureFormat {
                format: other.to_string(),
            }),
        }
    }
}

impl std::fmt::Display for SignatureFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Cms1_0_0 => write!(f, "cms-1.0.0"),
        }
    }
}

/// Outcome of the external signature-verification primitive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SignatureStatus {
    /// Signature is valid and was produced by the given entity.
    Valid(SigningEntity),

    /// Signature bytes do not verify over the content.
    Invalid(String),

    /// Signing certificate failed validation.
    CertificateInvalid(String),

    /// Certificate chain is not anchored in a trusted root.
    CertificateNotTrusted,
}

/// The external signature-verification primitive.
#[async_trait]
pub trait SignatureVerifier: Send + Sync {
    /// Check a detached signature over content.
    async fn status(
        &self,
        signature: &[u8],
        content: &[u8],
        format: SignatureFormat,
    ) -> RegistryResult<SignatureStatus>;
}

/// What to do when a trust decision is needed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PolicyAction {
    /// Ask the delegate; a `false` answer fails the operation.
    Prompt,

    /// Fail the operation.
    Error,

    /// Emit a warning and continue.
    Warn,

    /// Continue silently.
    SilentAllow,
}

/// Policy for unsigned archives and untrusted certificates.
///
/// An unset action that turns out to be needed fails with
/// [`RegistryError::MissingConfiguration`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SigningPolicy {
    /// Applied when the archive carries no signature.
    #[serde(default)]
    pub on_unsigned: Option<PolicyAction>,

    /// Applied when the signer's certificate is not trusted.
    #[serde(default)]
    pub on_untrusted_certificate: Option<PolicyAction>,
}

impl SigningPolicy {
    /// Set the unsigned-archive action.
    pub fn with_on_unsigned(mut self, action: PolicyAction) -> Self {
        self.on_unsigned = Some(action);
        self
    }

    /// Set the untrusted-certificate action.
    pub fn with_on_untrusted_certificate(mut self, action: PolicyAction) -> Self {
        self.on_untrusted_certificate = Some(action);
        self
    }
}

/// Delegate consulted by `Prompt` policies.
///
/// When no delegate is installed, prompts behave as "do not continue".
#[async_trait]
pub trait TrustDelegate: Send + Sync {
    /// Whether to proceed with an unsigned archive.
    async fn allow_unsigned(&self, package: &RegistryIdentity, version: &Version) -> bool;

    /// Whether to proceed despite an untrusted signing certificate.
    async fn allow_untrusted(&self, package: &RegistryIdentity, version: &Version) -> bool;
}

/// Policy-driven signature validation for downloaded archives.
pub struct SignatureValidation {
    policy: SigningPolicy,
    verifier: Arc<dyn SignatureVerifier>,
    delegate: Option<Arc<dyn TrustDelegate>>,
}

impl SignatureValidation {
    /// Create a validator.
    pub fn new(policy: SigningPolicy, verifier: Arc<dyn SignatureVerifier>) -> Self {
        Self {
            policy,
            verifier,
            delegate: None,
        }
    }

    /// Install a delegate for `Prompt` policies.
    pub fn with_delegate(mut self, delegate: Arc<dyn TrustDelegate>) -> Self {
        self.delegate = Some(delegate);
        self
    }

    /// Validate the signature of a downloaded source archive.
    ///
    /// Returns the verified signing entity, or `None` when policy allowed
    /// the operation to continue without one.
    pub async fn validate(
        &self,
        package: &RegistryIdentity,
        version: &Version,
        content: &[u8],
        metadata: &PackageVersionMetadata,
    ) -> RegistryResult<Option<SigningEntity>> {
        let archive =
            metadata
                .source_archive()
                .ok_or_else(|| RegistryError::MissingSourceArchive {
                    package: package.to_string(),
                    version: version.to_string(),
                })?;

        let Some(signing) = &archive.signing else {
            return self
                .apply_unsigned_policy(package, version)
                .await
                .map(|()| None);
        };

        if signing.signature_base64.is_empty() {
            return Err(RegistryError::MissingSignatureFormat);
        }
        let signature = BASE64.decode(&signing.signature_base64).map_err(|e| {
            RegistryError::FailedLoadingSignature {
                reason: format!("invalid base64 signature: {}", e),
            }
        })?;
        let format = SignatureFormat::parse(&signing.signature_format)?;

        match self.verifier.status(&signature, content, format).await? {
            SignatureStatus::Valid(entity) => Ok(Some(entity)),
            SignatureStatus::Invalid(reason) => Err(RegistryError::InvalidSignature { reason }),
            SignatureStatus::CertificateInvalid(reason) => {
                Err(RegistryError::InvalidSigningCertificate { reason })
            }
            SignatureStatus::CertificateNotTrusted => self
                .apply_untrusted_policy(package, version)
                .await
                .map(|()| None),
        }
    }

    async fn apply_unsigned_policy(
        &self,
        package: &RegistryIdentity,
        version: &Version,
    ) -> RegistryResult<()> {
        let action =
            self.policy
                .on_unsigned
                .ok_or_else(|| RegistryError::MissingConfiguration {
                    details: "no policy for unsigned source archives".to_string(),
                })?;
        let error = || RegistryError::SourceArchiveNotSigned {
            package: package.to_string(),
            version: version.to_string(),
        };

        match action {
            PolicyAction::Error => Err(error()),
            PolicyAction::Warn => {
                warn!(package = %package, version = %version, "source archive is not signed");
                Ok(())
            }
            PolicyAction::SilentAllow => Ok(()),
            PolicyAction::Prompt => match &self.delegate {
                Some(delegate) if delegate.allow_unsigned(package, version).await => Ok(()),
                _ => Err(error()),
            },
        }
    }

    async fn apply_untrusted_policy(
        &self,
        package: &RegistryIdentity,
        version: &Version,
    ) -> RegistryResult<()> {
        let action = self.policy.on_untrusted_certificate.ok_or_else(|| {
            RegistryError::MissingConfiguration {
                details: "no policy for untrusted signing certificates".to_string(),
            }
        })?;
        let error = || RegistryError::SignerNotTrusted {
            package: package.to_string(),
            version: version.to_string(),
        };

        match action {
            PolicyAction::Error => Err(error()),
            PolicyAction::Warn => {
                warn!(package = %package, version = %version, "signing certificate is not trusted");
                Ok(())
            }
            PolicyAction::SilentAllow => Ok(()),
            PolicyAction::Prompt => match &self.delegate {
                Some(delegate) if delegate.allow_untrusted(package, version).await => Ok(()),
                _ => Err(error()),
            },
        }
    }
}
