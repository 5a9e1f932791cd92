//! Package registry client.
//!
//! This crate implements the client side of the versioned JSON/zip registry
//! API, providing:
//!
//! - Resource-oriented HTTP operations with content negotiation
//! - A per-registry availability gate with a TTL-bounded cache
//! - TTL-bounded caching of decoded version metadata
//! - A multi-step download pipeline: archive download, signature
//!   validation, checksum trust-on-first-use, extraction, and a persisted
//!   metadata sidecar
//! - Client-side encoding for the publish endpoint
//!
//! # Quick Start
//!
//! ```no_run
//! use porter_registry::{
//!     ClientConfig, PackageIdentity, Registry, RegistryClient, RegistryConfiguration,
//! };
//!
//! # async fn example() -> Result<(), porter_registry::RegistryError> {
//! let registry = Registry::new("https://registry.example.com")?.with_availability();
//! let registries = RegistryConfiguration::new().with_default(registry);
//! let client = RegistryClient::new(registries, ClientConfig::default())?;
//!
//! let package = PackageIdentity::new("mona.LinkedList");
//! let metadata = client.get_package_metadata(&package, None).await?;
//! println!("latest: {:?}", metadata.versions.first());
//! # Ok(())
//! # }
//! ```
//!
//! # Configuration
//!
//! | Environment Variable | Description |
//! |---------------------|-------------|
//! | `PORTER_REGISTRY_TIMEOUT` | Request timeout in seconds (default: 60) |
//! | `PORTER_REGISTRY_AVAILABILITY_TTL` | Availability cache TTL in seconds (default: 300) |
//! | `PORTER_REGISTRY_METADATA_TTL` | Metadata cache TTL in seconds (default: 3600) |

pub mod availability;
pub mod client;
pub mod config;
pub mod download;
pub mod error;
pub mod fs;
pub mod identity;
pub mod link;
pub mod media;
pub mod metadata_cache;
pub mod publish;
pub mod registry;
pub mod signing;
pub mod stores;
pub mod tofu;
pub mod types;

// Re-export main types
pub use client::{AvailableManifest, RegistryClient, CANONICAL_MANIFEST};
pub use config::ClientConfig;
pub use download::{ChecksumAlgorithm, DownloadOptions, ProgressHandler};
pub use error::{PublishResult, RegistryError, RegistryResult};
pub use fs::{ArchiveExtractor, FileSystem, LocalFileSystem, ZipExtractor};
pub use identity::{PackageIdentity, PackageName, RegistryIdentity, Scope};
pub use link::{
    AlternateManifest, AlternativeLocation, AlternativeLocationKind, ToolsVersion,
};
pub use registry::{Registry, RegistryConfiguration};
pub use signing::{
    PolicyAction, SignatureFormat, SignatureStatus, SignatureValidation, SignatureVerifier,
    SigningEntity, SigningEntityKind, SigningPolicy, TrustDelegate,
};
pub use stores::{
    FileFingerprintStorage, FileSigningEntityStorage, Fingerprint, FingerprintKind,
    FingerprintStorage, MemoryFingerprintStorage, MemorySigningEntityStorage,
    SigningEntityStorage,
};
pub use tofu::{CheckingMode, ChecksumTofu, SigningEntityTofu, ValidationState};
pub use types::{
    AvailabilityStatus, Author, PackageMetadata, PackageVersionMetadata,
    RegistryReleaseMetadata, RegistryReleaseSignature, RegistryReleaseSource, Resource,
    SigningInfo, SIDECAR_FILENAME, SOURCE_ARCHIVE_RESOURCE,
};
