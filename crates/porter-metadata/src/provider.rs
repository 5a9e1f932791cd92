//! Metadata enrichment provider over a code-hosting REST API.
//!
//! The provider issues one primary repository request, then fans out five
//! parallel requests (releases, contributors, readme, license, languages)
//! and composes the results. Only the primary request can fail the
//! operation; fan-out failures are absorbed as missing data.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::path::PathBuf;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use chrono::Utc;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION, USER_AGENT};
use reqwest::Response;
use semver::Version;
use serde::de::DeserializeOwned;
use tracing::{debug, warn};
use url::Url;

use porter_registry::PackageIdentity;

use crate::cache::DiskCache;
use crate::error::{ProviderError, ProviderResult};
use crate::git_url::derive_api_url;
use crate::types::{
    Contributor, ContributorPayload, EnrichedMetadata, License, LicensePayload, ReadmePayload,
    ReleasePayload, RepositoryPayload,
};

/// User agent for API requests.
const USER_AGENT_VALUE: &str = concat!("porter-metadata/", env!("CARGO_PKG_VERSION"));

/// Accept header for the primary repository request (topics preview).
const ACCEPT_PREVIEW: &str = "application/vnd.github.mercy-preview+json";

/// Accept header for fan-out requests.
const ACCEPT_V3: &str = "application/vnd.github.v3+json";

/// Provider configuration.
#[derive(Debug, Clone)]
pub struct ProviderConfig {
    /// Override for the derived `https://api.<host>` base (testing and
    /// single-host deployments).
    pub api_base_url: Option<Url>,

    /// Bearer token for authenticated requests.
    pub auth_token: Option<String>,

    /// Path of the on-disk cache; `None` keeps the cache in memory.
    pub cache_path: Option<PathBuf>,

    /// Cache TTL in seconds.
    pub cache_ttl_secs: u64,

    /// Cache size ceiling over stored values, in bytes.
    pub cache_size_limit_bytes: u64,

    /// Per-request timeout in milliseconds.
    pub timeout_millis: u64,

    /// Attempts per request, including the first.
    pub max_attempts: u32,

    /// Base delay for exponential-backoff retries, in milliseconds.
    pub retry_base_delay_millis: u64,

    /// Remaining-call threshold below which a warning is logged.
    pub rate_limit_warning_threshold: u32,

    /// Errors within the window that open the per-host circuit breaker.
    pub breaker_error_threshold: u32,

    /// Circuit breaker window, in seconds.
    pub breaker_window_secs: u64,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            api_base_url: None,
            auth_token: None,
            cache_path: None,
            cache_ttl_secs: 3600,
            cache_size_limit_bytes: 16 * 1024 * 1024,
            timeout_millis: 1000,
            max_attempts: 3,
            retry_base_delay_millis: 50,
            rate_limit_warning_threshold: 5,
            breaker_error_threshold: 50,
            breaker_window_secs: 30,
        }
    }
}

impl ProviderConfig {
    /// Override the API base URL.
    pub fn with_api_base_url(mut self, url: Url) -> Self {
        self.api_base_url = Some(url);
        self
    }

    /// Set the auth token.
    pub fn with_auth_token(mut self, token: impl Into<String>) -> Self {
        self.auth_token = Some(token.into());
        self
    }

    /// Set the cache file path.
    pub fn with_cache_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.cache_path = Some(path.into());
        self
    }

    /// Set the cache TTL.
    pub fn with_cache_ttl_secs(mut self, secs: u64) -> Self {
        self.cache_ttl_secs = secs;
        self
    }
}

/// Per-host circuit breaker: opens after too many errors in a window.
struct CircuitBreaker {
    threshold: u32,
    window: Duration,
    errors: Mutex<HashMap<String, VecDeque<Instant>>>,
}

impl CircuitBreaker {
    fn new(threshold: u32, window: Duration) -> Self {
        Self {
            threshold,
            window,
            errors: Mutex::new(HashMap::new()),
        }
    }

    fn is_open(&self, host: &str) -> bool {
        let mut errors = self.errors.lock().unwrap();
        let Some(timestamps) = errors.get_mut(host) else {
            return false;
        };
        let cutoff = Instant::now() - self.window;
        while timestamps.front().is_some_and(|t| *t < cutoff) {
            timestamps.pop_front();
        }
        timestamps.len() as u32 >= self.threshold
    }

    fn record_error(&self, host: &str) {
        let mut errors = self.errors.lock().unwrap();
        errors
            .entry(host.to_string())
            .or_default()
            .push_back(Instant::now());
    }
}

/// Metadata provider backed by a code-hosting service's REST API.
pub struct MetadataProvider {
    http: reqwest::Client,
    config: ProviderConfig,
    cache: DiskCache,
    breaker: CircuitBreaker,
}

impl MetadataProvider {
    /// Create a provider.
    pub fn new(config: ProviderConfig) -> ProviderResult<Self> {
        let mut default_headers = HeaderMap::new();
        default_headers.insert(USER_AGENT, HeaderValue::from_static(USER_AGENT_VALUE));

        let http = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.timeout_millis))
            .default_headers(default_headers)
            .build()
            .map_err(|e| ProviderError::Transport {
                message: format!("failed to create HTTP client: {}", e),
            })?;

        let cache = match &config.cache_path {
            Some(path) => DiskCache::open(
                path,
                config.cache_ttl_secs,
                config.cache_size_limit_bytes,
            )?,
            None => DiskCache::memory(config.cache_ttl_secs, config.cache_size_limit_bytes)?,
        };

        let breaker = CircuitBreaker::new(
            config.breaker_error_threshold,
            Duration::from_secs(config.breaker_window_secs),
        );

        Ok(Self {
            http,
            config,
            cache,
            breaker,
        })
    }

    /// Fetch enriched metadata for a package hosted at a source-control
    /// location.
    pub async fn get(
        &self,
        identity: &PackageIdentity,
        location: &str,
    ) -> ProviderResult<EnrichedMetadata> {
        if let Some(cached) = self.cache.get(identity.as_str())? {
            if let Ok(metadata) = serde_json::from_str(&cached) {
                return Ok(metadata);
            }
        }

        let repo_url = self.repo_api_url(location)?;
        debug!(identity = %identity, url = %repo_url, "fetching package metadata");

        let response = self.get_with_retry(repo_url.as_str(), ACCEPT_PREVIEW).await?;
        self.inspect_rate_limits(repo_url.as_str(), response.headers())?;
        let repository: RepositoryPayload = self.expect_ok(repo_url.as_str(), response).await?;

        // Fan out; each leg yields None on anything but a clean 200.
        let releases_url = format!("{}/releases?per_page=20", repo_url);
        let contributors_url = format!("{}/contributors", repo_url);
        let readme_url = format!("{}/readme", repo_url);
        let license_url = format!("{}/license", repo_url);
        let languages_url = format!("{}/languages", repo_url);
        let (releases, contributors, readme, license, languages) = tokio::join!(
            self.optional_get::<Vec<ReleasePayload>>(&releases_url),
            self.optional_get::<Vec<ContributorPayload>>(&contributors_url),
            self.optional_get::<ReadmePayload>(&readme_url),
            self.optional_get::<LicensePayload>(&license_url),
            self.optional_get::<BTreeMap<String, u64>>(&languages_url),
        );

        let mut versions: Vec<Version> = releases
            .unwrap_or_default()
            .into_iter()
            .filter_map(|release| {
                let tag = release.tag_name.trim_start_matches('v');
                Version::parse(tag).ok()
            })
            .collect();
        versions.sort_by(|a, b| b.cmp(a));

        let authors = contributors.map(|contributors| {
            contributors
                .into_iter()
                .map(|c| Contributor {
                    username: c.login,
                    url: c.html_url.and_then(|u| Url::parse(&u).ok()),
                    contributions: c.contributions.unwrap_or(0),
                })
                .collect::<Vec<_>>()
        });

        let metadata = EnrichedMetadata {
            summary: repository.description,
            keywords: repository.topics,
            versions,
            watchers_count: repository.watchers_count,
            readme_url: readme
                .and_then(|r| r.download_url)
                .and_then(|u| Url::parse(&u).ok()),
            license: license.and_then(|payload| {
                payload.license.map(|info| License {
                    name: info.name,
                    url: payload.download_url.and_then(|u| Url::parse(&u).ok()),
                })
            }),
            authors,
            languages,
            processed_at: Utc::now(),
        };

        match serde_json::to_string(&metadata) {
            Ok(json) => self.cache.put(identity.as_str(), &json)?,
            Err(e) => warn!(identity = %identity, error = %e, "failed to serialize cache entry"),
        }

        Ok(metadata)
    }

    /// Repository API URL: configured base, or derived from the location.
    fn repo_api_url(&self, location: &str) -> ProviderResult<Url> {
        let derived = derive_api_url(location)?;
        match &self.config.api_base_url {
            Some(base) => {
                let path = derived.path().trim_start_matches('/');
                let base = base.as_str().trim_end_matches('/');
                Url::parse(&format!("{}/{}", base, path)).map_err(|_| {
                    ProviderError::InvalidGitUrl {
                        url: location.to_string(),
                    }
                })
            }
            None => Ok(derived),
        }
    }

    /// Issue a GET with retry, backoff, and the circuit breaker.
    async fn get_with_retry(&self, url: &str, accept: &str) -> ProviderResult<Response> {
        let host = Url::parse(url)
            .ok()
            .and_then(|u| u.host_str().map(String::from))
            .unwrap_or_default();

        if self.breaker.is_open(&host) {
            return Err(ProviderError::Transport {
                message: format!("circuit breaker open for {}", host),
            });
        }

        let mut attempt = 0;
        loop {
            attempt += 1;
            let result = self.send(url, accept).await;

            match result {
                Ok(response) if response.status().is_server_error() => {
                    self.breaker.record_error(&host);
                    if attempt >= self.config.max_attempts {
                        return Ok(response);
                    }
                }
                Ok(response) => return Ok(response),
                Err(e) => {
                    self.breaker.record_error(&host);
                    if attempt >= self.config.max_attempts {
                        return Err(e);
                    }
                }
            }

            let backoff = Duration::from_millis(
                self.config.retry_base_delay_millis * (1u64 << (attempt - 1)),
            );
            debug!(url, attempt, backoff_ms = backoff.as_millis() as u64, "retrying request");
            tokio::time::sleep(backoff).await;
        }
    }

    async fn send(&self, url: &str, accept: &str) -> ProviderResult<Response> {
        let mut request = self.http.get(url).header(ACCEPT, accept);
        if let Some(token) = &self.config.auth_token {
            request = request.header(AUTHORIZATION, format!("token {}", token));
        }
        Ok(request.send().await?)
    }

    /// Check the rate-limit headers of a primary response.
    fn inspect_rate_limits(&self, url: &str, headers: &HeaderMap) -> ProviderResult<()> {
        let parse = |name: &str| {
            headers
                .get(name)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse::<u32>().ok())
        };
        let limit = parse("X-RateLimit-Limit");
        let remaining = parse("X-RateLimit-Remaining");

        if let (Some(limit), Some(remaining)) = (limit, remaining) {
            if remaining == 0 {
                return Err(ProviderError::ApiLimitsExceeded {
                    url: url.to_string(),
                    limit,
                });
            }
            if remaining < self.config.rate_limit_warning_threshold {
                warn!(
                    url,
                    remaining, limit, "approaching API rate limit; consider an auth token"
                );
            }
        }
        Ok(())
    }

    /// Map the primary response, decoding the body on 200.
    async fn expect_ok<T: DeserializeOwned>(
        &self,
        url: &str,
        response: Response,
    ) -> ProviderResult<T> {
        match response.status().as_u16() {
            200 => response
                .json()
                .await
                .map_err(|e| ProviderError::InvalidResponse {
                    url: url.to_string(),
                    message: format!("failed to decode body: {}", e),
                }),
            401 if self.config.auth_token.is_some() => Err(ProviderError::InvalidAuthToken {
                url: url.to_string(),
            }),
            401 | 403 => Err(ProviderError::PermissionDenied {
                url: url.to_string(),
            }),
            404 => Err(ProviderError::NotFound {
                url: url.to_string(),
            }),
            status => Err(ProviderError::InvalidResponse {
                url: url.to_string(),
                message: format!("unexpected status {}", status),
            }),
        }
    }

    /// Fan-out GET: any failure or non-200 yields `None`.
    async fn optional_get<T: DeserializeOwned>(&self, url: &str) -> Option<T> {
        let response = self.get_with_retry(url, ACCEPT_V3).await.ok()?;
        if response.status().as_u16() != 200 {
            debug!(url, status = response.status().as_u16(), "fan-out request yielded no data");
            return None;
        }
        response.json().await.ok()
    }
}
