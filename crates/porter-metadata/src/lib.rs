//! Package metadata enrichment.
//!
//! This crate augments registry package information with data from a
//! code-hosting service's REST API: description, topics, release versions,
//! contributors, readme and license locations, and language breakdown.
//! Results land in a SQLite-backed cache with a TTL and a size ceiling.
//!
//! # Quick Start
//!
//! ```no_run
//! use porter_metadata::{MetadataProvider, ProviderConfig};
//! use porter_registry::PackageIdentity;
//!
//! # async fn example() -> Result<(), porter_metadata::ProviderError> {
//! let provider = MetadataProvider::new(ProviderConfig::default())?;
//! let identity = PackageIdentity::new("mona.LinkedList");
//! let metadata = provider
//!     .get(&identity, "https://github.com/mona/LinkedList.git")
//!     .await?;
//! println!("{:?}", metadata.summary);
//! # Ok(())
//! # }
//! ```

pub mod cache;
pub mod error;
pub mod git_url;
pub mod provider;
pub mod types;

// Re-export main types
pub use cache::DiskCache;
pub use error::{ProviderError, ProviderResult};
pub use git_url::derive_api_url;
pub use provider::{MetadataProvider, ProviderConfig};
pub use types::{Contributor, EnrichedMetadata, License};
