//! HTTP client for package registries.
//!
//! Every operation normalizes its package identity, resolves the registry
//! for the scope, and passes the availability gate before touching the
//! network. Responses are validated against the negotiated API version and
//! media type before decoding.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, CONTENT_TYPE, LOCATION, RETRY_AFTER, USER_AGENT};
use reqwest::{Method, Response};
use semver::Version;
use tracing::{debug, warn};
use url::Url;

use crate::availability::AvailabilityGate;
use crate::config::ClientConfig;
use crate::error::{PublishResult, RegistryError, RegistryResult};
use crate::identity::{PackageIdentity, RegistryIdentity};
use crate::link::{self, ToolsVersion};
use crate::media::{self, MediaType};
use crate::metadata_cache::MetadataCache;
use crate::publish::build_publish_body;
use crate::registry::{Registry, RegistryConfiguration};
use crate::signing::SignatureFormat;
use crate::types::{
    AvailabilityStatus, IdentifiersPayload, PackageMetadata, PackageVersionMetadata,
    ProblemDetails, ReleasesPayload, Resource, SigningInfo, VersionMetadataPayload,
};

/// User agent for registry requests.
const USER_AGENT_VALUE: &str = concat!("porter-registry/", env!("CARGO_PKG_VERSION"));

/// Request header carrying the signature format on publish.
const SIGNATURE_FORMAT_HEADER: &str = "X-Swift-Package-Signature-Format";

/// A manifest available for a release.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AvailableManifest {
    /// Tools version the manifest requires.
    pub tools_version: ToolsVersion,

    /// Manifest source; `None` for alternate manifests advertised via the
    /// `Link` header only.
    pub content: Option<String>,
}

/// Filename of the canonical manifest.
pub const CANONICAL_MANIFEST: &str = "Package.swift";

/// Registry client.
#[derive(Clone)]
pub struct RegistryClient {
    /// HTTP client.
    http: reqwest::Client,

    /// Scope-to-registry mapping.
    registries: RegistryConfiguration,

    /// Configuration.
    config: ClientConfig,

    /// Availability probe cache.
    availability: Arc<AvailabilityGate>,

    /// Version metadata cache.
    metadata_cache: Arc<MetadataCache>,

    /// Set by [`RegistryClient::cancel`]; refuses new requests.
    cancelled: Arc<AtomicBool>,
}

impl RegistryClient {
    /// Create a new registry client.
    pub fn new(registries: RegistryConfiguration, config: ClientConfig) -> RegistryResult<Self> {
        let mut default_headers = HeaderMap::new();
        default_headers.insert(USER_AGENT, HeaderValue::from_static(USER_AGENT_VALUE));

        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .default_headers(default_headers)
            .build()
            .map_err(|e| RegistryError::Transport {
                message: format!("failed to create HTTP client: {}", e),
            })?;

        let availability = Arc::new(AvailabilityGate::new(config.availability_ttl_secs));
        let metadata_cache = Arc::new(MetadataCache::new(config.metadata_ttl_secs));

        Ok(Self {
            http,
            registries,
            config,
            availability,
            metadata_cache,
            cancelled: Arc::new(AtomicBool::new(false)),
        })
    }

    /// The scope-to-registry mapping this client was built with.
    pub fn registries(&self) -> &RegistryConfiguration {
        &self.registries
    }

    /// The configuration this client was built with.
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Cooperatively cancel the client.
    ///
    /// New requests are refused; in-flight requests run into their timeout
    /// and surface as transport errors.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    // -------------------------------------------------------------------------
    // Operations
    // -------------------------------------------------------------------------

    /// List the releases of a package.
    pub async fn get_package_metadata(
        &self,
        package: &PackageIdentity,
        timeout: Option<Duration>,
    ) -> RegistryResult<PackageMetadata> {
        let (identity, registry) = self.resolve(package)?;
        self.ensure_available(&registry, timeout).await?;

        self.fetch_package_metadata(&registry, &identity, timeout)
            .await
            .map_err(|e| match e {
                e @ RegistryError::PackageNotFound { .. } => e,
                cause => RegistryError::FailedRetrievingReleases {
                    registry: registry.url.to_string(),
                    package: identity.to_string(),
                    cause: Box::new(cause),
                },
            })
    }

    /// Fetch metadata for one release, consulting the metadata cache.
    pub async fn get_package_version_metadata(
        &self,
        package: &PackageIdentity,
        version: &Version,
        timeout: Option<Duration>,
    ) -> RegistryResult<PackageVersionMetadata> {
        let (identity, registry) = self.resolve(package)?;
        self.ensure_available(&registry, timeout).await?;

        self.cached_version_metadata(&registry, &identity, version, timeout)
            .await
            .map_err(|e| match e {
                e @ RegistryError::PackageVersionNotFound { .. } => e,
                cause => RegistryError::FailedRetrievingReleaseInfo {
                    registry: registry.url.to_string(),
                    package: identity.to_string(),
                    version: version.to_string(),
                    cause: Box::new(cause),
                },
            })
    }

    /// List the manifests available for a release.
    ///
    /// The canonical manifest is returned with its content; alternate
    /// manifests advertised via the `Link` header are returned with
    /// `content = None`.
    pub async fn get_available_manifests(
        &self,
        package: &PackageIdentity,
        version: &Version,
        timeout: Option<Duration>,
    ) -> RegistryResult<BTreeMap<String, AvailableManifest>> {
        let (identity, registry) = self.resolve(package)?;
        self.ensure_available(&registry, timeout).await?;

        let url = format!(
            "{}/{}/{}/{}/{}",
            registry.base(),
            identity.scope,
            identity.name,
            version,
            CANONICAL_MANIFEST
        );
        debug!(url = %url, "fetching available manifests");

        let response = self
            .request(Method::GET, &url, Some(MediaType::Swift), timeout)?
            .send()
            .await?;

        match response.status().as_u16() {
            200 => {
                media::validate_api_version(response.headers(), false)?;
                media::validate_content_type(response.headers(), MediaType::Swift.content_type())?;

                let link_header = joined_link_header(response.headers());
                let body = response.text().await.map_err(|e| {
                    RegistryError::InvalidResponse {
                        message: format!("failed to read manifest body: {}", e),
                    }
                })?;
                if body.is_empty() {
                    return Err(RegistryError::InvalidResponse {
                        message: "manifest response body is empty".to_string(),
                    });
                }
                let tools_version = link::tools_version_from_manifest(&body).ok_or_else(|| {
                    RegistryError::InvalidResponse {
                        message: "manifest does not declare a tools version".to_string(),
                    }
                })?;

                let mut manifests = BTreeMap::new();
                manifests.insert(
                    CANONICAL_MANIFEST.to_string(),
                    AvailableManifest {
                        tools_version,
                        content: Some(body),
                    },
                );
                if let Some(header) = link_header {
                    for alternate in link::parse_alternate_manifests(&header)? {
                        manifests.insert(
                            alternate.filename,
                            AvailableManifest {
                                tools_version: alternate.tools_version,
                                content: None,
                            },
                        );
                    }
                }
                Ok(manifests)
            }
            404 => Err(RegistryError::PackageVersionNotFound {
                package: identity.to_string(),
                version: version.to_string(),
            }),
            _ => Err(self.unexpected_status(&[200], response).await),
        }
    }

    /// Fetch the content of a release manifest.
    ///
    /// With a tools version, the registry serves the version-specific
    /// manifest via the `swift-version` query parameter.
    pub async fn get_manifest_content(
        &self,
        package: &PackageIdentity,
        version: &Version,
        tools_version: Option<ToolsVersion>,
        timeout: Option<Duration>,
    ) -> RegistryResult<String> {
        let (identity, registry) = self.resolve(package)?;
        self.ensure_available(&registry, timeout).await?;

        let url = format!(
            "{}/{}/{}/{}/{}",
            registry.base(),
            identity.scope,
            identity.name,
            version,
            CANONICAL_MANIFEST
        );
        debug!(url = %url, tools_version = ?tools_version, "fetching manifest content");

        let mut request = self.request(Method::GET, &url, Some(MediaType::Swift), timeout)?;
        if let Some(tools_version) = tools_version {
            request = request.query(&[("swift-version", tools_version.to_string())]);
        }
        let response = request.send().await?;

        match response.status().as_u16() {
            200 => {
                media::validate_api_version(response.headers(), false)?;
                media::validate_content_type(response.headers(), MediaType::Swift.content_type())?;
                response
                    .text()
                    .await
                    .map_err(|e| RegistryError::InvalidResponse {
                        message: format!("failed to read manifest body: {}", e),
                    })
            }
            404 => Err(RegistryError::PackageVersionNotFound {
                package: identity.to_string(),
                version: version.to_string(),
            }),
            _ => Err(self.unexpected_status(&[200], response).await),
        }
    }

    /// Look up the registry identities known for a source-control URL.
    ///
    /// A 404 is the registry's way of saying "no identities": it yields an
    /// empty set, not an error.
    pub async fn lookup_identities(
        &self,
        scm_url: &str,
        timeout: Option<Duration>,
    ) -> RegistryResult<BTreeSet<PackageIdentity>> {
        let registry = self.registries.default_registry()?.clone();
        self.ensure_available(&registry, timeout).await?;

        let url = format!("{}/identifiers", registry.base());
        debug!(url = %url, scm_url = %scm_url, "looking up identities");

        let response = self
            .request(Method::GET, &url, Some(MediaType::Json), timeout)?
            .query(&[("url", scm_url)])
            .send()
            .await
            .map_err(|e| self.wrap_lookup(&registry, scm_url, e.into()))?;

        match response.status().as_u16() {
            200 => {
                let payload: IdentifiersPayload =
                    response
                        .json()
                        .await
                        .map_err(|e| {
                            self.wrap_lookup(
                                &registry,
                                scm_url,
                                RegistryError::InvalidResponse {
                                    message: format!("failed to parse identifiers: {}", e),
                                },
                            )
                        })?;
                Ok(payload
                    .identifiers
                    .into_iter()
                    .map(PackageIdentity::new)
                    .collect())
            }
            404 => Ok(BTreeSet::new()),
            _ => {
                let cause = self.unexpected_status(&[200], response).await;
                Err(self.wrap_lookup(&registry, scm_url, cause))
            }
        }
    }

    /// Authenticate against a registry's login endpoint.
    pub async fn login(&self, registry: &Registry, timeout: Option<Duration>) -> RegistryResult<()> {
        let url = format!("{}/login", registry.base());
        debug!(url = %url, "logging in");

        let response = self.request(Method::POST, &url, None, timeout)?.send().await?;
        match response.status().as_u16() {
            200 => Ok(()),
            _ => Err(self.unexpected_status(&[200], response).await),
        }
    }

    /// Publish a release.
    ///
    /// The archive, optional signature, and optional metadata are encoded
    /// as a multipart body. Registries may answer synchronously (201) or
    /// accept the release for asynchronous processing (202).
    #[allow(clippy::too_many_arguments)]
    pub async fn publish(
        &self,
        package: &PackageIdentity,
        version: &Version,
        archive: Vec<u8>,
        metadata: Option<serde_json::Value>,
        signature: Option<Vec<u8>>,
        signature_format: Option<SignatureFormat>,
        timeout: Option<Duration>,
    ) -> RegistryResult<PublishResult> {
        let (identity, registry) = self.resolve(package)?;

        // Encoding failures (e.g. a signature without a declared format)
        // must surface before any network I/O, including the probe.
        let body = build_publish_body(
            &archive,
            signature.as_deref(),
            signature_format,
            metadata.as_ref(),
        )?;

        self.ensure_available(&registry, timeout).await?;

        let url = format!(
            "{}/{}/{}/{}",
            registry.base(),
            identity.scope,
            identity.name,
            version
        );
        debug!(url = %url, signed = body.signature_format.is_some(), "publishing release");

        let mut request = self
            .request(Method::PUT, &url, Some(MediaType::Json), timeout)?
            .header(CONTENT_TYPE, body.content_type())
            .header("Expect", "100-continue")
            .header("Prefer", "respond-async");
        if let Some(format) = body.signature_format {
            request = request.header(SIGNATURE_FORMAT_HEADER, format.to_string());
        }

        let response = request
            .body(body.bytes)
            .send()
            .await
            .map_err(|e| self.wrap_publish(&registry, &identity, version, e.into()))?;

        match response.status().as_u16() {
            201 => Ok(PublishResult::Published {
                location: header_string(response.headers(), LOCATION.as_str()),
            }),
            202 => {
                let status_url = header_string(response.headers(), LOCATION.as_str())
                    .ok_or(RegistryError::MissingPublishingLocation)?;
                let retry_after = header_string(response.headers(), RETRY_AFTER.as_str())
                    .and_then(|v| v.parse::<u64>().ok())
                    .map(Duration::from_secs);
                Ok(PublishResult::Processing {
                    status_url,
                    retry_after,
                })
            }
            _ => {
                let cause = self.unexpected_status(&[201, 202], response).await;
                Err(self.wrap_publish(&registry, &identity, version, cause))
            }
        }
    }

    /// Check the availability of a registry, consulting the probe cache.
    ///
    /// Registries that do not support the probe are reported available.
    pub async fn check_availability(
        &self,
        registry: &Registry,
        timeout: Option<Duration>,
    ) -> RegistryResult<AvailabilityStatus> {
        if !registry.supports_availability {
            return Ok(AvailabilityStatus::Available);
        }

        if let Some(status) = self.availability.get(&registry.url) {
            return Ok(status);
        }

        let status = self.probe_availability(registry, timeout).await?;
        self.availability.put(&registry.url, status.clone());
        Ok(status)
    }

    // -------------------------------------------------------------------------
    // Internals
    // -------------------------------------------------------------------------

    /// Normalize the identity and resolve the registry for its scope.
    pub(crate) fn resolve(
        &self,
        package: &PackageIdentity,
    ) -> RegistryResult<(RegistryIdentity, Registry)> {
        let identity = package.registry_identity()?;
        let registry = self.registries.registry_for(&identity.scope)?.clone();
        Ok((identity, registry))
    }

    /// Fail the operation unless the registry is available.
    pub(crate) async fn ensure_available(
        &self,
        registry: &Registry,
        timeout: Option<Duration>,
    ) -> RegistryResult<()> {
        match self.check_availability(registry, timeout).await? {
            AvailabilityStatus::Available => Ok(()),
            AvailabilityStatus::Unavailable => Err(RegistryError::RegistryNotAvailable {
                registry: registry.url.to_string(),
            }),
            AvailabilityStatus::Error(message) => {
                Err(RegistryError::AvailabilityCheckFailed { message })
            }
        }
    }

    async fn probe_availability(
        &self,
        registry: &Registry,
        timeout: Option<Duration>,
    ) -> RegistryResult<AvailabilityStatus> {
        let url = format!("{}/availability", registry.base());
        debug!(url = %url, "probing registry availability");

        let response = self.request(Method::GET, &url, None, timeout)?.send().await?;
        let status = response.status().as_u16();
        match status {
            200 => Ok(AvailabilityStatus::Available),
            404 | 501 => Ok(AvailabilityStatus::Unavailable),
            _ => {
                let detail = problem_details(response).await.and_then(|p| p.describe());
                Ok(AvailabilityStatus::Error(detail.unwrap_or_else(|| {
                    format!("unknown server error ({})", status)
                })))
            }
        }
    }

    async fn fetch_package_metadata(
        &self,
        registry: &Registry,
        identity: &RegistryIdentity,
        timeout: Option<Duration>,
    ) -> RegistryResult<PackageMetadata> {
        let url = format!("{}/{}/{}", registry.base(), identity.scope, identity.name);
        debug!(url = %url, "fetching package metadata");

        let response = self
            .request(Method::GET, &url, Some(MediaType::Json), timeout)?
            .send()
            .await?;

        match response.status().as_u16() {
            200 => {
                media::validate_api_version(response.headers(), false)?;
                media::validate_content_type(response.headers(), MediaType::Json.content_type())?;

                let link_header = joined_link_header(response.headers());
                let payload: ReleasesPayload =
                    response
                        .json()
                        .await
                        .map_err(|e| RegistryError::InvalidResponse {
                            message: format!("failed to parse releases: {}", e),
                        })?;

                // Releases flagged with a problem (e.g. yanked) are dropped;
                // so are version strings that do not parse.
                let mut versions: Vec<Version> = payload
                    .releases
                    .into_iter()
                    .filter(|(_, release)| release.problem.is_none())
                    .filter_map(|(version, _)| match Version::parse(&version) {
                        Ok(parsed) => Some(parsed),
                        Err(_) => {
                            warn!(version = %version, "skipping unparseable release version");
                            None
                        }
                    })
                    .collect();
                versions.sort_by(|a, b| b.cmp(a));

                let alternate_locations = link_header
                    .map(|header| link::parse_alternative_locations(&header))
                    .unwrap_or_default()
                    .into_iter()
                    .map(|location| location.url)
                    .collect();

                Ok(PackageMetadata {
                    registry: registry.url.clone(),
                    versions,
                    alternate_locations,
                })
            }
            404 => Err(RegistryError::PackageNotFound {
                package: identity.to_string(),
            }),
            _ => Err(self.unexpected_status(&[200], response).await),
        }
    }

    /// Version metadata with cache consultation; shared by the public
    /// operation and the download pipeline.
    pub(crate) async fn cached_version_metadata(
        &self,
        registry: &Registry,
        identity: &RegistryIdentity,
        version: &Version,
        timeout: Option<Duration>,
    ) -> RegistryResult<PackageVersionMetadata> {
        if let Some(metadata) = self.metadata_cache.get(&registry.url, identity, version) {
            return Ok(metadata);
        }

        let metadata = self
            .fetch_version_metadata(registry, identity, version, timeout)
            .await?;
        self.metadata_cache
            .put(&registry.url, identity, version, metadata.clone());
        Ok(metadata)
    }

    async fn fetch_version_metadata(
        &self,
        registry: &Registry,
        identity: &RegistryIdentity,
        version: &Version,
        timeout: Option<Duration>,
    ) -> RegistryResult<PackageVersionMetadata> {
        let url = format!(
            "{}/{}/{}/{}",
            registry.base(),
            identity.scope,
            identity.name,
            version
        );
        debug!(url = %url, "fetching version metadata");

        let response = self
            .request(Method::GET, &url, Some(MediaType::Json), timeout)?
            .send()
            .await?;

        match response.status().as_u16() {
            200 => {
                media::validate_api_version(response.headers(), false)?;
                media::validate_content_type(response.headers(), MediaType::Json.content_type())?;

                let payload: VersionMetadataPayload =
                    response
                        .json()
                        .await
                        .map_err(|e| RegistryError::InvalidResponse {
                            message: format!("failed to parse version metadata: {}", e),
                        })?;
                Ok(project_version_metadata(registry, payload))
            }
            404 => Err(RegistryError::PackageVersionNotFound {
                package: identity.to_string(),
                version: version.to_string(),
            }),
            _ => Err(self.unexpected_status(&[200], response).await),
        }
    }

    /// Build a request, honoring cancellation and the per-operation timeout.
    pub(crate) fn request(
        &self,
        method: Method,
        url: &str,
        accept: Option<MediaType>,
        timeout: Option<Duration>,
    ) -> RegistryResult<reqwest::RequestBuilder> {
        if self.cancelled.load(Ordering::SeqCst) {
            return Err(RegistryError::Transport {
                message: "client cancelled".to_string(),
            });
        }

        let mut builder = self.http.request(method, url);
        if let Some(media) = accept {
            builder = builder.header(ACCEPT, media.accept_header());
        }
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        Ok(builder)
    }

    /// Map an unexpected response status to an error.
    ///
    /// A parseable `application/problem+json` body wins; otherwise
    /// well-known statuses get dedicated errors.
    pub(crate) async fn unexpected_status(
        &self,
        expected: &[u16],
        response: Response,
    ) -> RegistryError {
        let status = response.status().as_u16();

        if let Some(problem) = problem_details(response).await {
            if let Some(details) = problem.describe() {
                return RegistryError::ServerError { status, details };
            }
        }

        match status {
            401 => RegistryError::Unauthorized {
                message: "invalid or missing credentials".to_string(),
            },
            403 => RegistryError::Forbidden {
                message: "access denied".to_string(),
            },
            501 => RegistryError::AuthenticationMethodNotSupported,
            500 | 502 | 503 => RegistryError::ServerError {
                status,
                details: "unknown server error".to_string(),
            },
            _ => RegistryError::InvalidResponseStatus {
                expected: expected.to_vec(),
                actual: status,
            },
        }
    }

    fn wrap_lookup(&self, registry: &Registry, scm_url: &str, cause: RegistryError) -> RegistryError {
        RegistryError::FailedIdentityLookup {
            registry: registry.url.to_string(),
            url: scm_url.to_string(),
            cause: Box::new(cause),
        }
    }

    fn wrap_publish(
        &self,
        registry: &Registry,
        identity: &RegistryIdentity,
        version: &Version,
        cause: RegistryError,
    ) -> RegistryError {
        RegistryError::FailedPublishing {
            registry: registry.url.to_string(),
            package: identity.to_string(),
            version: version.to_string(),
            cause: Box::new(cause),
        }
    }
}

/// Decode an `application/problem+json` body, if the response declares one.
async fn problem_details(response: Response) -> Option<ProblemDetails> {
    if !media::is_problem_response(response.headers()) {
        return None;
    }
    let body = response.bytes().await.ok()?;
    serde_json::from_slice(&body).ok()
}

/// Join repeated `Link` headers into one comma-separated value.
fn joined_link_header(headers: &HeaderMap) -> Option<String> {
    let values: Vec<&str> = headers
        .get_all(reqwest::header::LINK)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .collect();
    if values.is_empty() {
        None
    } else {
        Some(values.join(", "))
    }
}

fn header_string(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(String::from)
}

/// Project the wire payload onto the external metadata model.
fn project_version_metadata(
    registry: &Registry,
    payload: VersionMetadataPayload,
) -> PackageVersionMetadata {
    let resources = payload
        .resources
        .into_iter()
        .map(|resource| Resource {
            name: resource.name,
            content_type: resource.content_type,
            checksum: resource.checksum,
            signing: resource.signing.map(|signing| SigningInfo {
                signature_base64: signing.signature_base64,
                signature_format: signing.signature_format,
            }),
        })
        .collect();

    let metadata = payload.metadata;
    let parse_url = |value: Option<String>| value.and_then(|v| Url::parse(&v).ok());

    PackageVersionMetadata {
        registry: registry.url.clone(),
        license_url: parse_url(metadata.as_ref().and_then(|m| m.license_url.clone())),
        readme_url: parse_url(metadata.as_ref().and_then(|m| m.readme_url.clone())),
        repository_urls: metadata.as_ref().and_then(|m| {
            m.repository_urls.as_ref().map(|urls| {
                urls.iter()
                    .filter_map(|u| Url::parse(u).ok())
                    .collect::<Vec<_>>()
            })
        }),
        resources,
        author: metadata.as_ref().and_then(|m| {
            m.author.as_ref().map(|author| crate::types::Author {
                name: author.name.clone(),
                email: author.email.clone(),
                url: author.url.as_deref().and_then(|u| Url::parse(u).ok()),
            })
        }),
        description: metadata.and_then(|m| m.description),
    }
}

#[cfg(test)]
mod integration_tests {
    use super::*;
    use wiremock::matchers::{header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn client_for(mock_server: &MockServer) -> RegistryClient {
        let registry = Registry::new(mock_server.uri()).unwrap();
        let registries = RegistryConfiguration::new().with_default(registry);
        RegistryClient::new(registries, ClientConfig::default()).expect("failed to create client")
    }

    async fn client_with_availability(mock_server: &MockServer) -> RegistryClient {
        let registry = Registry::new(mock_server.uri()).unwrap().with_availability();
        let registries = RegistryConfiguration::new().with_default(registry);
        RegistryClient::new(registries, ClientConfig::default()).expect("failed to create client")
    }

    fn releases_response() -> ResponseTemplate {
        ResponseTemplate::new(200)
            .insert_header("content-version", "1")
            .set_body_raw(
                r#"{"releases":{"1.0.0":{"url":"https://r.example.com/mona/linkedlist/1.0.0"},"1.1.0":{},"2.0.0-beta":{"problem":{"status":410,"detail":"yanked"}}}}"#,
                "application/json",
            )
    }

    #[tokio::test]
    async fn test_get_package_metadata_filters_and_sorts() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/mona/linkedlist"))
            .and(header("accept", "application/vnd.swift.registry.v1+json"))
            .respond_with(releases_response())
            .mount(&mock_server)
            .await;

        let client = client_for(&mock_server).await;
        let metadata = client
            .get_package_metadata(&PackageIdentity::new("mona.LinkedList"), None)
            .await
            .expect("metadata fetch failed");

        // The problem-flagged beta is dropped, the rest sorted descending.
        let versions: Vec<String> = metadata.versions.iter().map(|v| v.to_string()).collect();
        assert_eq!(versions, vec!["1.1.0", "1.0.0"]);
    }

    #[tokio::test]
    async fn test_get_package_metadata_parses_alternate_locations() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/mona/linkedlist"))
            .respond_with(
                releases_response().insert_header(
                    "link",
                    r#"<https://other.example.com/mona/linkedlist>; rel="alternate""#,
                ),
            )
            .mount(&mock_server)
            .await;

        let client = client_for(&mock_server).await;
        let metadata = client
            .get_package_metadata(&PackageIdentity::new("mona.linkedlist"), None)
            .await
            .unwrap();
        assert_eq!(metadata.alternate_locations.len(), 1);
        assert_eq!(
            metadata.alternate_locations[0].as_str(),
            "https://other.example.com/mona/linkedlist"
        );
    }

    #[tokio::test]
    async fn test_invalid_identity_issues_no_requests() {
        let mock_server = MockServer::start().await;
        // Any request at all would panic the mock with expect(0).
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&mock_server)
            .await;

        let client = client_for(&mock_server).await;
        let result = client
            .get_package_metadata(&PackageIdentity::new("not-a-registry-identity"), None)
            .await;
        assert!(matches!(
            result,
            Err(RegistryError::InvalidPackageIdentity { .. })
        ));
    }

    #[tokio::test]
    async fn test_unconfigured_scope_issues_no_requests() {
        let client = RegistryClient::new(RegistryConfiguration::new(), ClientConfig::default())
            .unwrap();
        let result = client
            .get_package_metadata(&PackageIdentity::new("mona.linkedlist"), None)
            .await;
        assert!(matches!(
            result,
            Err(RegistryError::RegistryNotConfigured { .. })
        ));
    }

    #[tokio::test]
    async fn test_availability_probe_cached_across_operations() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/availability"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&mock_server)
            .await;
        Mock::given(method("GET"))
            .and(path("/mona/linkedlist"))
            .respond_with(releases_response())
            .expect(2)
            .mount(&mock_server)
            .await;

        let client = client_with_availability(&mock_server).await;
        let package = PackageIdentity::new("mona.linkedlist");
        client.get_package_metadata(&package, None).await.unwrap();
        client.get_package_metadata(&package, None).await.unwrap();
    }

    #[tokio::test]
    async fn test_unavailable_registry_short_circuits() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/availability"))
            .respond_with(ResponseTemplate::new(404))
            .expect(1)
            .mount(&mock_server)
            .await;
        // The operation endpoint must never be hit.
        Mock::given(method("GET"))
            .and(path("/mona/linkedlist"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&mock_server)
            .await;

        let client = client_with_availability(&mock_server).await;
        let package = PackageIdentity::new("mona.linkedlist");

        for _ in 0..2 {
            let result = client.get_package_metadata(&package, None).await;
            assert!(matches!(
                result,
                Err(RegistryError::RegistryNotAvailable { .. })
            ));
        }
    }

    #[tokio::test]
    async fn test_availability_error_carries_problem_detail() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/availability"))
            .respond_with(
                ResponseTemplate::new(500)
                    .set_body_raw(r#"{"detail":"registry is on fire"}"#, "application/problem+json"),
            )
            .mount(&mock_server)
            .await;

        let client = client_with_availability(&mock_server).await;
        let result = client
            .get_package_metadata(&PackageIdentity::new("mona.linkedlist"), None)
            .await;
        assert!(matches!(
            result,
            Err(RegistryError::AvailabilityCheckFailed { message }) if message == "registry is on fire"
        ));
    }

    #[tokio::test]
    async fn test_version_metadata_cached() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/mona/linkedlist/1.0.0"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-version", "1")
                    .set_body_raw(
                        r#"{"resources":[{"name":"source-archive","type":"application/zip","checksum":"abc"}]}"#,
                        "application/json",
                    ),
            )
            .expect(1)
            .mount(&mock_server)
            .await;

        let client = client_for(&mock_server).await;
        let package = PackageIdentity::new("mona.linkedlist");
        let version = Version::parse("1.0.0").unwrap();

        let first = client
            .get_package_version_metadata(&package, &version, None)
            .await
            .unwrap();
        let second = client
            .get_package_version_metadata(&package, &version, None)
            .await
            .unwrap();
        assert_eq!(first, second);
        assert_eq!(first.source_archive().unwrap().checksum.as_deref(), Some("abc"));
    }

    #[tokio::test]
    async fn test_content_version_mismatch_rejected() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/mona/linkedlist"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-version", "2")
                    .set_body_raw(r#"{"releases":{}}"#, "application/json"),
            )
            .mount(&mock_server)
            .await;

        let client = client_for(&mock_server).await;
        let result = client
            .get_package_metadata(&PackageIdentity::new("mona.linkedlist"), None)
            .await;
        match result {
            Err(RegistryError::FailedRetrievingReleases { cause, .. }) => {
                assert!(matches!(
                    *cause,
                    RegistryError::InvalidContentVersion { .. }
                ));
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_package_not_found() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/mona/missing"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&mock_server)
            .await;

        let client = client_for(&mock_server).await;
        let result = client
            .get_package_metadata(&PackageIdentity::new("mona.missing"), None)
            .await;
        assert!(matches!(result, Err(RegistryError::PackageNotFound { .. })));
    }

    #[tokio::test]
    async fn test_problem_body_surfaces_server_error() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/mona/linkedlist"))
            .respond_with(
                ResponseTemplate::new(418)
                    .set_body_raw(r#"{"detail":"short and stout"}"#, "application/problem+json"),
            )
            .mount(&mock_server)
            .await;

        let client = client_for(&mock_server).await;
        let result = client
            .get_package_metadata(&PackageIdentity::new("mona.linkedlist"), None)
            .await;
        match result {
            Err(RegistryError::FailedRetrievingReleases { cause, .. }) => match *cause {
                RegistryError::ServerError { status, details } => {
                    assert_eq!(status, 418);
                    assert_eq!(details, "short and stout");
                }
                other => panic!("unexpected cause: {other:?}"),
            },
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_available_manifests_include_link_alternates() {
        let mock_server = MockServer::start().await;
        let manifest = "// swift-tools-version:5.5\nimport PackageDescription";
        Mock::given(method("GET"))
            .and(path("/mona/linkedlist/1.0.0/Package.swift"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-version", "1")
                    .insert_header(
                        "link",
                        r#"<https://r.example.com/mona/linkedlist/1.0.0/Package.swift?swift-version=5.6>; rel="alternate"; filename="Package@swift-5.6.swift"; swift-tools-version="5.6""#,
                    )
                    .set_body_raw(manifest, "text/x-swift"),
            )
            .mount(&mock_server)
            .await;

        let client = client_for(&mock_server).await;
        let manifests = client
            .get_available_manifests(
                &PackageIdentity::new("mona.linkedlist"),
                &Version::parse("1.0.0").unwrap(),
                None,
            )
            .await
            .unwrap();

        assert_eq!(manifests.len(), 2);
        let canonical = &manifests[CANONICAL_MANIFEST];
        assert_eq!(canonical.tools_version.to_string(), "5.5");
        assert_eq!(canonical.content.as_deref(), Some(manifest));
        let alternate = &manifests["Package@swift-5.6.swift"];
        assert_eq!(alternate.tools_version.to_string(), "5.6");
        assert!(alternate.content.is_none());
    }

    #[tokio::test]
    async fn test_manifest_content_with_tools_version_query() {
        let mock_server = MockServer::start().await;
        let manifest = "// swift-tools-version:5.6\nimport PackageDescription";
        Mock::given(method("GET"))
            .and(path("/mona/linkedlist/1.0.0/Package.swift"))
            .and(query_param("swift-version", "5.6"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-version", "1")
                    .set_body_raw(manifest, "text/x-swift"),
            )
            .mount(&mock_server)
            .await;

        let client = client_for(&mock_server).await;
        let content = client
            .get_manifest_content(
                &PackageIdentity::new("mona.linkedlist"),
                &Version::parse("1.0.0").unwrap(),
                Some("5.6".parse().unwrap()),
                None,
            )
            .await
            .unwrap();
        assert_eq!(content, manifest);
    }

    #[tokio::test]
    async fn test_lookup_identities_found() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/identifiers"))
            .and(query_param("url", "https://github.com/mona/LinkedList"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_raw(r#"{"identifiers":["mona.LinkedList"]}"#, "application/json"),
            )
            .mount(&mock_server)
            .await;

        let client = client_for(&mock_server).await;
        let identities = client
            .lookup_identities("https://github.com/mona/LinkedList", None)
            .await
            .unwrap();
        assert_eq!(identities.len(), 1);
        assert!(identities.contains(&PackageIdentity::new("mona.linkedlist")));
    }

    #[tokio::test]
    async fn test_lookup_identities_404_is_empty() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/identifiers"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&mock_server)
            .await;

        let client = client_for(&mock_server).await;
        let identities = client
            .lookup_identities("https://github.com/mona/Unknown", None)
            .await
            .unwrap();
        assert!(identities.is_empty());
    }

    #[tokio::test]
    async fn test_lookup_identities_other_errors_wrapped() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/identifiers"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&mock_server)
            .await;

        let client = client_for(&mock_server).await;
        let result = client
            .lookup_identities("https://github.com/mona/LinkedList", None)
            .await;
        assert!(matches!(
            result,
            Err(RegistryError::FailedIdentityLookup { .. })
        ));
    }

    #[tokio::test]
    async fn test_login() {
        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/login"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&mock_server)
            .await;

        let client = client_for(&mock_server).await;
        let registry = Registry::new(mock_server.uri()).unwrap();
        client.login(&registry, None).await.unwrap();
    }

    #[tokio::test]
    async fn test_login_unsupported() {
        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/login"))
            .respond_with(ResponseTemplate::new(501))
            .mount(&mock_server)
            .await;

        let client = client_for(&mock_server).await;
        let registry = Registry::new(mock_server.uri()).unwrap();
        let result = client.login(&registry, None).await;
        assert!(matches!(
            result,
            Err(RegistryError::AuthenticationMethodNotSupported)
        ));
    }

    #[tokio::test]
    async fn test_cancelled_client_refuses_requests() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&mock_server)
            .await;

        let client = client_for(&mock_server).await;
        client.cancel();
        let result = client
            .get_package_metadata(&PackageIdentity::new("mona.linkedlist"), None)
            .await;
        match result {
            Err(RegistryError::FailedRetrievingReleases { cause, .. }) => {
                assert!(matches!(*cause, RegistryError::Transport { .. }));
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }
}
