//! Source-archive download pipeline.
//!
//! The pipeline is a strict sequence: fetch version metadata, prepare the
//! filesystem, stream the archive, verify its signature, run checksum TOFU,
//! extract, and persist the metadata sidecar. Failure at any step leaves
//! the destination absent; the temporary zip is removed in every case.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use reqwest::Method;
use semver::Version;
use sha2::{Digest, Sha256, Sha512};
use tokio::io::AsyncWriteExt;
use tracing::debug;

use crate::client::RegistryClient;
use crate::error::{RegistryError, RegistryResult};
use crate::fs::{ArchiveExtractor, FileSystem};
use crate::identity::{PackageIdentity, RegistryIdentity};
use crate::media::{self, MediaType};
use crate::registry::Registry;
use crate::signing::SignatureValidation;
use crate::tofu::{ChecksumTofu, SigningEntityTofu};
use crate::types::{
    RegistryReleaseMetadata, RegistryReleaseSignature, RegistryReleaseSource, SIDECAR_FILENAME,
};

/// Checksum algorithms for downloaded archives.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ChecksumAlgorithm {
    /// SHA-256, the registry default.
    #[default]
    Sha256,

    /// SHA-512.
    Sha512,
}

impl ChecksumAlgorithm {
    /// Digest bytes to a lowercase hex string.
    pub fn digest(&self, bytes: &[u8]) -> String {
        match self {
            Self::Sha256 => hex::encode(Sha256::digest(bytes)),
            Self::Sha512 => hex::encode(Sha512::digest(bytes)),
        }
    }
}

/// Progress callback: `(bytes_downloaded, total_bytes)`.
pub type ProgressHandler = Arc<dyn Fn(u64, Option<u64>) + Send + Sync>;

/// Collaborators and policy for a source-archive download.
pub struct DownloadOptions {
    /// Checksum algorithm applied to the downloaded archive.
    pub checksum_algorithm: ChecksumAlgorithm,

    /// Filesystem the pipeline works through.
    pub filesystem: Arc<dyn FileSystem>,

    /// Archive extractor.
    pub extractor: Arc<dyn ArchiveExtractor>,

    /// Signature validation policy and verifier.
    pub signing: SignatureValidation,

    /// Checksum trust-on-first-use validator.
    pub checksum_tofu: ChecksumTofu,

    /// Signing-entity trust-on-first-use validator.
    pub signing_entity_tofu: SigningEntityTofu,

    /// Optional download progress callback.
    pub progress: Option<ProgressHandler>,
}

impl RegistryClient {
    /// Download, validate, and extract a release's source archive.
    ///
    /// `destination` must not exist. On success it holds the extracted
    /// package (first archive level stripped) plus a `.registry-metadata`
    /// sidecar recording provenance and the signature outcome.
    pub async fn download_source_archive(
        &self,
        package: &PackageIdentity,
        version: &Version,
        destination: &Path,
        options: &DownloadOptions,
        timeout: Option<Duration>,
    ) -> RegistryResult<()> {
        let (identity, registry) = self.resolve(package)?;
        self.ensure_available(&registry, timeout).await?;

        let archive_path = zip_path(destination);
        let result = self
            .run_pipeline(
                &identity,
                &registry,
                version,
                destination,
                &archive_path,
                options,
                timeout,
            )
            .await;

        // The temporary zip is removed regardless of outcome.
        let _ = options.filesystem.remove_file_tree(&archive_path).await;

        // Any failure leaves the destination absent. A pre-existing
        // destination was not ours to create, so it is left alone.
        if let Err(error) = &result {
            if !matches!(error, RegistryError::PathAlreadyExists { .. }) {
                let _ = options.filesystem.remove_file_tree(destination).await;
            }
        }

        result.map_err(|e| RegistryError::wrap_download(&registry.url, &identity, version, e))
    }

    #[allow(clippy::too_many_arguments)]
    async fn run_pipeline(
        &self,
        identity: &RegistryIdentity,
        registry: &Registry,
        version: &Version,
        destination: &Path,
        archive_path: &Path,
        options: &DownloadOptions,
        timeout: Option<Duration>,
    ) -> RegistryResult<()> {
        let fs = &options.filesystem;

        // 1. Version metadata, through the shared cache.
        let metadata = self
            .cached_version_metadata(registry, identity, version, timeout)
            .await?;

        // 2. Filesystem preparation.
        if let Some(parent) = destination.parent() {
            if !fs.exists(parent).await {
                fs.create_directory(parent, true).await?;
            }
        }
        fs.remove_file_tree(archive_path).await?;
        if fs.exists(destination).await {
            return Err(RegistryError::PathAlreadyExists {
                path: destination.to_path_buf(),
            });
        }

        // 3 + 4. Stream the archive to disk and validate the response.
        self.stream_archive(identity, registry, version, archive_path, options, timeout)
            .await?;

        // 5. Checksum of the downloaded file.
        let archive = fs.read_file_contents(archive_path).await?;
        let checksum = options.checksum_algorithm.digest(&archive);

        // 6. Signature validation comes before checksum TOFU.
        let signing_entity = options
            .signing
            .validate(identity, version, &archive, &metadata)
            .await?;

        // 7. Checksum TOFU, then signing-entity TOFU.
        let declared = metadata
            .source_archive()
            .and_then(|resource| resource.checksum.as_deref());
        options
            .checksum_tofu
            .validate(identity, version, &checksum, declared)?;
        options
            .signing_entity_tofu
            .validate(identity, version, signing_entity.as_ref())?;

        // 8. The pipeline is asynchronous; the destination may have
        // appeared in the meantime.
        if fs.exists(destination).await {
            return Err(RegistryError::PathAlreadyExists {
                path: destination.to_path_buf(),
            });
        }
        fs.create_directory(destination, true).await?;
        options.extractor.extract(archive_path, destination).await?;

        // 9. Archives wrap their content in a single top-level directory.
        fs.strip_first_level(destination).await?;

        // 10. Persist the metadata sidecar.
        let signature = metadata
            .source_archive()
            .and_then(|resource| resource.signing.as_ref())
            .map(|signing| RegistryReleaseSignature {
                format: signing.signature_format.clone(),
                signed_by: signing_entity,
            });
        let sidecar = RegistryReleaseMetadata {
            source: RegistryReleaseSource {
                registry: registry.url.clone(),
            },
            metadata,
            signature,
        };
        let json =
            serde_json::to_vec_pretty(&sidecar).map_err(|e| RegistryError::InvalidResponse {
                message: format!("failed to serialize sidecar metadata: {}", e),
            })?;
        fs.write_file_contents(&destination.join(SIDECAR_FILENAME), &json)
            .await?;

        Ok(())
    }

    /// Stream `GET /{scope}/{name}/{version}.zip` to the archive path.
    async fn stream_archive(
        &self,
        identity: &RegistryIdentity,
        registry: &Registry,
        version: &Version,
        archive_path: &Path,
        options: &DownloadOptions,
        timeout: Option<Duration>,
    ) -> RegistryResult<()> {
        let url = format!(
            "{}/{}/{}/{}.zip",
            registry.base(),
            identity.scope,
            identity.name,
            version
        );
        debug!(url = %url, "downloading source archive");

        let response = self
            .request(Method::GET, &url, Some(MediaType::Zip), timeout)?
            .send()
            .await?;

        match response.status().as_u16() {
            200 => {}
            404 => {
                return Err(RegistryError::PackageVersionNotFound {
                    package: identity.to_string(),
                    version: version.to_string(),
                })
            }
            _ => return Err(self.unexpected_status(&[200], response).await),
        }

        // The archive endpoint predates the Content-Version header, so its
        // absence is tolerated.
        media::validate_api_version(response.headers(), true)?;
        media::validate_content_type(response.headers(), MediaType::Zip.content_type())?;

        let total = response.content_length();
        let mut file = tokio::fs::File::create(archive_path).await?;
        let mut stream = response.bytes_stream();
        let mut downloaded: u64 = 0;

        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            file.write_all(&chunk).await?;
            downloaded += chunk.len() as u64;
            if let Some(progress) = &options.progress {
                progress(downloaded, total);
            }
        }
        file.flush().await?;

        Ok(())
    }
}

/// `<destination>.zip`, preserving any existing extension.
fn zip_path(destination: &Path) -> PathBuf {
    let mut path = destination.as_os_str().to_os_string();
    path.push(".zip");
    PathBuf::from(path)
}
