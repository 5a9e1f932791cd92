//! Error types for the metadata provider.

/// Metadata provider errors.
#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    /// Source-control URL does not have the `host:owner/repo` or
    /// `host/owner/repo` shape.
    #[error("invalid git URL: {url}")]
    InvalidGitUrl { url: String },

    /// Response body was not what the API promises.
    #[error("invalid response from {url}: {message}")]
    InvalidResponse { url: String, message: String },

    /// Authenticated token was rejected.
    #[error("invalid auth token for {url}")]
    InvalidAuthToken { url: String },

    /// Access denied (or unauthenticated where auth is required).
    #[error("permission denied for {url}")]
    PermissionDenied { url: String },

    /// API rate limit exhausted.
    #[error("API limits exceeded for {url} (limit {limit})")]
    ApiLimitsExceeded { url: String, limit: u32 },

    /// Repository does not exist.
    #[error("not found: {url}")]
    NotFound { url: String },

    /// Network failure.
    #[error("transport error: {message}")]
    Transport { message: String },

    /// Cache failure.
    #[error("cache error: {message}")]
    Cache { message: String },
}

impl From<reqwest::Error> for ProviderError {
    fn from(err: reqwest::Error) -> Self {
        Self::Transport {
            message: err.to_string(),
        }
    }
}

impl From<rusqlite::Error> for ProviderError {
    fn from(err: rusqlite::Error) -> Self {
        Self::Cache {
            message: err.to_string(),
        }
    }
}

/// Result type for provider operations.
pub type ProviderResult<T> = Result<T, ProviderError>;
