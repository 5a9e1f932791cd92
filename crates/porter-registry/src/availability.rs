//! Availability gate: TTL-bounded cache of per-registry probe results.
//!
//! The probe itself is issued by the client; this module keeps the cache.
//! Both success and failure results are cached unconditionally, because a
//! recent failure is an actionable short-term fact. Entries are served only
//! while `now < expires_at`; expired entries are overwritten on the next
//! probe rather than eagerly evicted.

use std::collections::HashMap;
use std::sync::RwLock;

use chrono::{DateTime, Duration, Utc};
use tracing::debug;
use url::Url;

use crate::types::AvailabilityStatus;

struct CachedStatus {
    status: AvailabilityStatus,
    expires_at: DateTime<Utc>,
}

/// Cache of availability probe results, keyed by registry URL.
pub struct AvailabilityGate {
    entries: RwLock<HashMap<Url, CachedStatus>>,
    ttl: Duration,
}

impl AvailabilityGate {
    /// Create a gate with the given TTL in seconds.
    pub fn new(ttl_secs: u64) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            ttl: Duration::seconds(ttl_secs as i64),
        }
    }

    /// Get the cached status for a registry, if still valid.
    pub fn get(&self, registry: &Url) -> Option<AvailabilityStatus> {
        let entries = self.entries.read().unwrap();
        let cached = entries.get(registry)?;
        if Utc::now() < cached.expires_at {
            debug!(registry = %registry, "availability cache hit");
            Some(cached.status.clone())
        } else {
            None
        }
    }

    /// Record a probe result, replacing any previous entry.
    pub fn put(&self, registry: &Url, status: AvailabilityStatus) {
        let mut entries = self.entries.write().unwrap();
        entries.insert(
            registry.clone(),
            CachedStatus {
                status,
                expires_at: Utc::now() + self.ttl,
            },
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry_url() -> Url {
        Url::parse("https://registry.example.com").unwrap()
    }

    #[test]
    fn test_miss_on_empty_cache() {
        let gate = AvailabilityGate::new(300);
        assert!(gate.get(&registry_url()).is_none());
    }

    #[test]
    fn test_hit_within_ttl() {
        let gate = AvailabilityGate::new(300);
        gate.put(&registry_url(), AvailabilityStatus::Available);
        assert_eq!(
            gate.get(&registry_url()),
            Some(AvailabilityStatus::Available)
        );
    }

    #[test]
    fn test_failures_are_cached_too() {
        let gate = AvailabilityGate::new(300);
        gate.put(&registry_url(), AvailabilityStatus::Unavailable);
        assert_eq!(
            gate.get(&registry_url()),
            Some(AvailabilityStatus::Unavailable)
        );

        gate.put(
            &registry_url(),
            AvailabilityStatus::Error("boom".to_string()),
        );
        assert_eq!(
            gate.get(&registry_url()),
            Some(AvailabilityStatus::Error("boom".to_string()))
        );
    }

    #[test]
    fn test_expired_entry_is_a_miss() {
        let gate = AvailabilityGate::new(0);
        gate.put(&registry_url(), AvailabilityStatus::Available);
        std::thread::sleep(std::time::Duration::from_millis(5));
        assert!(gate.get(&registry_url()).is_none());
    }
}
