//! Persistent trust stores: fingerprints and signing entities.
//!
//! Both stores are external collaborators from the client's point of view:
//! thread-safe key/value CRUD with no cross-key transactions. The in-memory
//! implementations back tests; the file-backed implementations persist a
//! JSON document with atomic temp-file-and-rename writes.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use semver::Version;
use serde::{Deserialize, Serialize};

use crate::error::{RegistryError, RegistryResult};
use crate::identity::RegistryIdentity;
use crate::signing::SigningEntity;

/// What a fingerprint was computed over.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FingerprintKind {
    /// Checksum of the source archive.
    SourceArchive,

    /// Checksum of the manifest.
    Manifest,
}

/// A recorded fingerprint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fingerprint {
    /// Package the fingerprint belongs to.
    pub package: RegistryIdentity,

    /// Release version.
    pub version: Version,

    /// What the value was computed over.
    pub kind: FingerprintKind,

    /// Fingerprint value, lowercase hex.
    pub value: String,
}

/// Storage for fingerprints, used by checksum TOFU.
pub trait FingerprintStorage: Send + Sync {
    /// Get the recorded fingerprint value for a release, if any.
    fn get(
        &self,
        package: &RegistryIdentity,
        version: &Version,
        kind: FingerprintKind,
    ) -> RegistryResult<Option<String>>;

    /// Record a fingerprint.
    fn put(&self, fingerprint: &Fingerprint) -> RegistryResult<()>;
}

/// Storage for observed signing entities, used by signing-entity TOFU.
pub trait SigningEntityStorage: Send + Sync {
    /// First signing entity observed for the package, if any.
    fn package_signer(&self, package: &RegistryIdentity) -> RegistryResult<Option<SigningEntity>>;

    /// Record the signing entity for a package.
    fn record_package_signer(
        &self,
        package: &RegistryIdentity,
        entity: &SigningEntity,
    ) -> RegistryResult<()>;

    /// Signing entity observed for a specific release, if any.
    fn release_signer(
        &self,
        package: &RegistryIdentity,
        version: &Version,
    ) -> RegistryResult<Option<SigningEntity>>;

    /// Record the signing entity for a release.
    fn record_release_signer(
        &self,
        package: &RegistryIdentity,
        version: &Version,
        entity: &SigningEntity,
    ) -> RegistryResult<()>;
}

// ---------------------------------------------------------------------------
// In-memory implementations
// ---------------------------------------------------------------------------

/// In-memory fingerprint store.
#[derive(Debug, Default)]
pub struct MemoryFingerprintStorage {
    entries: Mutex<HashMap<(String, String, FingerprintKind), String>>,
}

impl MemoryFingerprintStorage {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

impl FingerprintStorage for MemoryFingerprintStorage {
    fn get(
        &self,
        package: &RegistryIdentity,
        version: &Version,
        kind: FingerprintKind,
    ) -> RegistryResult<Option<String>> {
        let entries = self.entries.lock().unwrap();
        Ok(entries
            .get(&(package.to_string(), version.to_string(), kind))
            .cloned())
    }

    fn put(&self, fingerprint: &Fingerprint) -> RegistryResult<()> {
        let mut entries = self.entries.lock().unwrap();
        entries.insert(
            (
                fingerprint.package.to_string(),
                fingerprint.version.to_string(),
                fingerprint.kind,
            ),
            fingerprint.value.clone(),
        );
        Ok(())
    }
}

/// In-memory signing-entity store.
#[derive(Debug, Default)]
pub struct MemorySigningEntityStorage {
    packages: Mutex<HashMap<String, SigningEntity>>,
    releases: Mutex<HashMap<(String, String), SigningEntity>>,
}

impl MemorySigningEntityStorage {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

impl SigningEntityStorage for MemorySigningEntityStorage {
    fn package_signer(&self, package: &RegistryIdentity) -> RegistryResult<Option<SigningEntity>> {
        Ok(self.packages.lock().unwrap().get(&package.to_string()).cloned())
    }

    fn record_package_signer(
        &self,
        package: &RegistryIdentity,
        entity: &SigningEntity,
    ) -> RegistryResult<()> {
        self.packages
            .lock()
            .unwrap()
            .insert(package.to_string(), entity.clone());
        Ok(())
    }

    fn release_signer(
        &self,
        package: &RegistryIdentity,
        version: &Version,
    ) -> RegistryResult<Option<SigningEntity>> {
        Ok(self
            .releases
            .lock()
            .unwrap()
            .get(&(package.to_string(), version.to_string()))
            .cloned())
    }

    fn record_release_signer(
        &self,
        package: &RegistryIdentity,
        version: &Version,
        entity: &SigningEntity,
    ) -> RegistryResult<()> {
        self.releases
            .lock()
            .unwrap()
            .insert((package.to_string(), version.to_string()), entity.clone());
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// File-backed implementations
// ---------------------------------------------------------------------------

#[derive(Debug, Default, Serialize, Deserialize)]
struct FingerprintDocument {
    #[serde(default)]
    fingerprints: Vec<Fingerprint>,
}

/// Fingerprint store persisted as a JSON document.
#[derive(Debug)]
pub struct FileFingerprintStorage {
    path: PathBuf,
    lock: Mutex<()>,
}

impl FileFingerprintStorage {
    /// Create a store backed by the given file.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    fn load(&self) -> RegistryResult<FingerprintDocument> {
        load_document(&self.path)
    }
}

impl FingerprintStorage for FileFingerprintStorage {
    fn get(
        &self,
        package: &RegistryIdentity,
        version: &Version,
        kind: FingerprintKind,
    ) -> RegistryResult<Option<String>> {
        let _guard = self.lock.lock().unwrap();
        let document = self.load()?;
        Ok(document
            .fingerprints
            .into_iter()
            .find(|f| f.package == *package && f.version == *version && f.kind == kind)
            .map(|f| f.value))
    }

    fn put(&self, fingerprint: &Fingerprint) -> RegistryResult<()> {
        let _guard = self.lock.lock().unwrap();
        let mut document = self.load()?;
        document.fingerprints.retain(|f| {
            !(f.package == fingerprint.package
                && f.version == fingerprint.version
                && f.kind == fingerprint.kind)
        });
        document.fingerprints.push(fingerprint.clone());
        write_document(&self.path, &document)
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct SigningEntityDocument {
    #[serde(default)]
    packages: HashMap<String, SigningEntity>,

    #[serde(default)]
    releases: HashMap<String, SigningEntity>,
}

/// Signing-entity store persisted as a JSON document.
#[derive(Debug)]
pub struct FileSigningEntityStorage {
    path: PathBuf,
    lock: Mutex<()>,
}

impl FileSigningEntityStorage {
    /// Create a store backed by the given file.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    fn load(&self) -> RegistryResult<SigningEntityDocument> {
        load_document(&self.path)
    }

    fn release_key(package: &RegistryIdentity, version: &Version) -> String {
        format!("{}@{}", package, version)
    }
}

impl SigningEntityStorage for FileSigningEntityStorage {
    fn package_signer(&self, package: &RegistryIdentity) -> RegistryResult<Option<SigningEntity>> {
        let _guard = self.lock.lock().unwrap();
        Ok(self.load()?.packages.get(&package.to_string()).cloned())
    }

    fn record_package_signer(
        &self,
        package: &RegistryIdentity,
        entity: &SigningEntity,
    ) -> RegistryResult<()> {
        let _guard = self.lock.lock().unwrap();
        let mut document = self.load()?;
        document
            .packages
            .insert(package.to_string(), entity.clone());
        write_document(&self.path, &document)
    }

    fn release_signer(
        &self,
        package: &RegistryIdentity,
        version: &Version,
    ) -> RegistryResult<Option<SigningEntity>> {
        let _guard = self.lock.lock().unwrap();
        Ok(self
            .load()?
            .releases
            .get(&Self::release_key(package, version))
            .cloned())
    }

    fn record_release_signer(
        &self,
        package: &RegistryIdentity,
        version: &Version,
        entity: &SigningEntity,
    ) -> RegistryResult<()> {
        let _guard = self.lock.lock().unwrap();
        let mut document = self.load()?;
        document
            .releases
            .insert(Self::release_key(package, version), entity.clone());
        write_document(&self.path, &document)
    }
}

fn load_document<T: Default + for<'de> Deserialize<'de>>(path: &Path) -> RegistryResult<T> {
    match std::fs::read(path) {
        Ok(bytes) => serde_json::from_slice(&bytes).map_err(|e| RegistryError::Io {
            message: format!("failed to parse store {}: {}", path.display(), e),
        }),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(T::default()),
        Err(e) => Err(e.into()),
    }
}

/// Write a JSON document atomically (temp file, then rename).
fn write_document<T: Serialize>(path: &Path, document: &T) -> RegistryResult<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let json = serde_json::to_vec_pretty(document).map_err(|e| RegistryError::Io {
        message: format!("failed to serialize store: {}", e),
    })?;
    let temp = path.with_extension("tmp");
    std::fs::write(&temp, json)?;
    std::fs::rename(&temp, path)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signing::SigningEntityKind;
    use tempfile::tempdir;

    fn package() -> RegistryIdentity {
        RegistryIdentity::parse("mona.linkedlist").unwrap()
    }

    fn version() -> Version {
        Version::parse("1.0.0").unwrap()
    }

    fn entity(name: &str) -> SigningEntity {
        SigningEntity {
            kind: SigningEntityKind::Recognized,
            name: name.to_string(),
            organization: Some("Mona Inc.".to_string()),
            organizational_unit: None,
        }
    }

    #[test]
    fn test_memory_fingerprint_roundtrip() {
        let store = MemoryFingerprintStorage::new();
        assert!(store
            .get(&package(), &version(), FingerprintKind::SourceArchive)
            .unwrap()
            .is_none());

        store
            .put(&Fingerprint {
                package: package(),
                version: version(),
                kind: FingerprintKind::SourceArchive,
                value: "abc123".to_string(),
            })
            .unwrap();

        assert_eq!(
            store
                .get(&package(), &version(), FingerprintKind::SourceArchive)
                .unwrap()
                .as_deref(),
            Some("abc123")
        );
        // Different kind is a different record.
        assert!(store
            .get(&package(), &version(), FingerprintKind::Manifest)
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_file_fingerprint_persists() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("fingerprints.json");

        {
            let store = FileFingerprintStorage::new(&path);
            store
                .put(&Fingerprint {
                    package: package(),
                    version: version(),
                    kind: FingerprintKind::SourceArchive,
                    value: "abc123".to_string(),
                })
                .unwrap();
        }

        let reopened = FileFingerprintStorage::new(&path);
        assert_eq!(
            reopened
                .get(&package(), &version(), FingerprintKind::SourceArchive)
                .unwrap()
                .as_deref(),
            Some("abc123")
        );
    }

    #[test]
    fn test_memory_signing_entity_package_and_release() {
        let store = MemorySigningEntityStorage::new();
        assert!(store.package_signer(&package()).unwrap().is_none());

        store
            .record_package_signer(&package(), &entity("Mona"))
            .unwrap();
        store
            .record_release_signer(&package(), &version(), &entity("Mona"))
            .unwrap();

        assert_eq!(store.package_signer(&package()).unwrap(), Some(entity("Mona")));
        assert_eq!(
            store.release_signer(&package(), &version()).unwrap(),
            Some(entity("Mona"))
        );
        let other = Version::parse("2.0.0").unwrap();
        assert!(store.release_signer(&package(), &other).unwrap().is_none());
    }

    #[test]
    fn test_file_signing_entity_persists() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("signers.json");

        {
            let store = FileSigningEntityStorage::new(&path);
            store
                .record_package_signer(&package(), &entity("Mona"))
                .unwrap();
        }

        let reopened = FileSigningEntityStorage::new(&path);
        assert_eq!(
            reopened.package_signer(&package()).unwrap(),
            Some(entity("Mona"))
        );
    }
}
