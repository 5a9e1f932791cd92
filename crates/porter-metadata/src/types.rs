//! Enriched metadata model and API response payloads.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use semver::Version;
use serde::{Deserialize, Serialize};
use url::Url;

/// Enriched package metadata composed from the code-hosting API.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnrichedMetadata {
    /// Repository description.
    #[serde(default)]
    pub summary: Option<String>,

    /// Repository topics.
    #[serde(default)]
    pub keywords: Option<Vec<String>>,

    /// Release versions whose tags parse as semver, sorted descending.
    pub versions: Vec<Version>,

    /// Watcher count.
    #[serde(default)]
    pub watchers_count: Option<u64>,

    /// Raw readme URL.
    #[serde(default)]
    pub readme_url: Option<Url>,

    /// License name and raw URL.
    #[serde(default)]
    pub license: Option<License>,

    /// Contributors, ordered by contribution count.
    #[serde(default)]
    pub authors: Option<Vec<Contributor>>,

    /// Language name to byte count.
    #[serde(default)]
    pub languages: Option<BTreeMap<String, u64>>,

    /// When this record was composed.
    pub processed_at: DateTime<Utc>,
}

/// Repository license.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct License {
    /// License name (e.g. `Apache License 2.0`).
    pub name: String,

    /// Raw license file URL.
    #[serde(default)]
    pub url: Option<Url>,
}

/// A repository contributor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Contributor {
    /// Login name.
    pub username: String,

    /// Profile URL.
    #[serde(default)]
    pub url: Option<Url>,

    /// Contribution count.
    #[serde(default)]
    pub contributions: u64,
}

// ---------------------------------------------------------------------------
// Wire payloads (v3 REST API)
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub(crate) struct RepositoryPayload {
    #[serde(default)]
    pub description: Option<String>,

    #[serde(default)]
    pub topics: Option<Vec<String>>,

    #[serde(default)]
    pub watchers_count: Option<u64>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ReleasePayload {
    pub tag_name: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ContributorPayload {
    pub login: String,

    #[serde(default)]
    pub html_url: Option<String>,

    #[serde(default)]
    pub contributions: Option<u64>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ReadmePayload {
    #[serde(default)]
    pub download_url: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct LicensePayload {
    #[serde(default)]
    pub download_url: Option<String>,

    #[serde(default)]
    pub license: Option<LicenseInfoPayload>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct LicenseInfoPayload {
    pub name: String,
}
