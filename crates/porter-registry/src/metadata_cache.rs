//! TTL-bounded cache of decoded package-version metadata.
//!
//! Only the version-metadata operation reads and writes this cache. Lookups
//! are synchronous and never block on I/O. Expired entries stay in the map
//! until the next fetch overwrites them.

use std::collections::HashMap;
use std::sync::RwLock;

use chrono::{DateTime, Duration, Utc};
use semver::Version;
use tracing::debug;
use url::Url;

use crate::identity::RegistryIdentity;
use crate::types::PackageVersionMetadata;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct CacheKey {
    registry: Url,
    package: RegistryIdentity,
    version: Version,
}

struct CachedMetadata {
    metadata: PackageVersionMetadata,
    expires_at: DateTime<Utc>,
}

/// Cache of decoded version metadata.
pub struct MetadataCache {
    entries: RwLock<HashMap<CacheKey, CachedMetadata>>,
    ttl: Duration,
}

impl MetadataCache {
    /// Create a cache with the given TTL in seconds.
    pub fn new(ttl_secs: u64) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            ttl: Duration::seconds(ttl_secs as i64),
        }
    }

    /// Get cached metadata, if still valid.
    pub fn get(
        &self,
        registry: &Url,
        package: &RegistryIdentity,
        version: &Version,
    ) -> Option<PackageVersionMetadata> {
        let key = CacheKey {
            registry: registry.clone(),
            package: package.clone(),
            version: version.clone(),
        };
        let entries = self.entries.read().unwrap();
        let cached = entries.get(&key)?;
        if Utc::now() < cached.expires_at {
            debug!(package = %package, version = %version, "metadata cache hit");
            Some(cached.metadata.clone())
        } else {
            None
        }
    }

    /// Store metadata, replacing any previous entry.
    pub fn put(
        &self,
        registry: &Url,
        package: &RegistryIdentity,
        version: &Version,
        metadata: PackageVersionMetadata,
    ) {
        let key = CacheKey {
            registry: registry.clone(),
            package: package.clone(),
            version: version.clone(),
        };
        let mut entries = self.entries.write().unwrap();
        entries.insert(
            key,
            CachedMetadata {
                metadata,
                expires_at: Utc::now() + self.ttl,
            },
        );
    }
}
