//! Trust-on-first-use validation for checksums and signing entities.
//!
//! The first observation of a value is recorded in persistent storage;
//! later observations must match it. A mismatch is authoritative and never
//! retried.

use std::sync::Arc;

use semver::Version;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{RegistryError, RegistryResult};
use crate::identity::RegistryIdentity;
use crate::signing::SigningEntity;
use crate::stores::{Fingerprint, FingerprintKind, FingerprintStorage, SigningEntityStorage};

/// How strictly mismatches are handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CheckingMode {
    /// Mismatches fail the operation.
    Strict,

    /// Mismatches only emit a warning.
    Warn,
}

/// Whether a validator runs at all.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValidationState {
    Enabled,
    Disabled,
}

/// Checksum TOFU for source archives.
pub struct ChecksumTofu {
    storage: Arc<dyn FingerprintStorage>,
    mode: CheckingMode,
    state: ValidationState,
}

impl ChecksumTofu {
    /// Create a validator.
    pub fn new(
        storage: Arc<dyn FingerprintStorage>,
        mode: CheckingMode,
        state: ValidationState,
    ) -> Self {
        Self {
            storage,
            mode,
            state,
        }
    }

    /// Validate the checksum of a downloaded source archive.
    ///
    /// The computed checksum is compared against the checksum declared in
    /// release metadata (when present) and against the fingerprint recorded
    /// on first use. First use records the computed value.
    pub fn validate(
        &self,
        package: &RegistryIdentity,
        version: &Version,
        checksum: &str,
        declared: Option<&str>,
    ) -> RegistryResult<()> {
        if self.state == ValidationState::Disabled {
            return Ok(());
        }

        match declared {
            Some(expected) if expected != checksum => {
                let error = RegistryError::InvalidChecksum {
                    expected: expected.to_string(),
                    actual: checksum.to_string(),
                };
                match self.mode {
                    CheckingMode::Strict => return Err(error),
                    CheckingMode::Warn => {
                        warn!(package = %package, version = %version, %error, "continuing despite checksum mismatch")
                    }
                }
            }
            Some(_) => {}
            None => {
                let error = RegistryError::SourceArchiveMissingChecksum {
                    package: package.to_string(),
                    version: version.to_string(),
                };
                match self.mode {
                    CheckingMode::Strict => return Err(error),
                    CheckingMode::Warn => {
                        warn!(package = %package, version = %version, %error, "continuing without declared checksum")
                    }
                }
            }
        }

        match self
            .storage
            .get(package, version, FingerprintKind::SourceArchive)?
        {
            None => self.storage.put(&Fingerprint {
                package: package.clone(),
                version: version.clone(),
                kind: FingerprintKind::SourceArchive,
                value: checksum.to_string(),
            }),
            Some(previous) if previous == checksum => Ok(()),
            Some(previous) => {
                let error = RegistryError::ChecksumChanged {
                    latest: checksum.to_string(),
                    previous,
                };
                match self.mode {
                    CheckingMode::Strict => Err(error),
                    CheckingMode::Warn => {
                        warn!(package = %package, version = %version, %error, "continuing despite changed checksum");
                        Ok(())
                    }
                }
            }
        }
    }
}

/// Signing-entity TOFU.
///
/// Records the first observed signing entity per package and per release.
/// A `None` entity is the absence of an observation: it never records and
/// never conflicts with a previously recorded value.
pub struct SigningEntityTofu {
    storage: Arc<dyn SigningEntityStorage>,
    mode: CheckingMode,
}

impl SigningEntityTofu {
    /// Create a validator.
    pub fn new(storage: Arc<dyn SigningEntityStorage>, mode: CheckingMode) -> Self {
        Self { storage, mode }
    }

    /// Validate the signing entity observed for a release.
    pub fn validate(
        &self,
        package: &RegistryIdentity,
        version: &Version,
        entity: Option<&SigningEntity>,
    ) -> RegistryResult<()> {
        let Some(entity) = entity else {
            return Ok(());
        };

        match self.storage.release_signer(package, version)? {
            None => self.storage.record_release_signer(package, version, entity)?,
            Some(previous) if previous == *entity => {}
            Some(previous) => {
                let error = RegistryError::SigningEntityForReleaseChanged {
                    package: package.to_string(),
                    version: version.to_string(),
                    latest: Some(entity.clone()),
                    previous,
                };
                match self.mode {
                    CheckingMode::Strict => return Err(error),
                    CheckingMode::Warn => {
                        warn!(package = %package, version = %version, %error, "continuing despite changed release signer")
                    }
                }
            }
        }

        match self.storage.package_signer(package)? {
            None => self.storage.record_package_signer(package, entity)?,
            Some(previous) if previous == *entity => {}
            Some(previous) => {
                let error = RegistryError::SigningEntityForPackageChanged {
                    package: package.to_string(),
                    latest: Some(entity.clone()),
                    previous,
                };
                match self.mode {
                    CheckingMode::Strict => return Err(error),
                    CheckingMode::Warn => {
                        warn!(package = %package, %error, "continuing despite changed package signer")
                    }
                }
            }
        }

        Ok(())
    }
}
