//! Content negotiation for the versioned registry API.
//!
//! Requests carry `Accept: application/vnd.swift.registry.v1+<type>`;
//! responses are checked for the matching `Content-Version` and
//! `Content-Type` headers.

use reqwest::header::{HeaderMap, CONTENT_TYPE};

use crate::error::{RegistryError, RegistryResult};

/// Supported registry API version.
pub const API_VERSION: &str = "1";

/// Response header carrying the API version.
pub const CONTENT_VERSION_HEADER: &str = "Content-Version";

pub(crate) const CONTENT_TYPE_JSON: &str = "application/json";
pub(crate) const CONTENT_TYPE_MANIFEST: &str = "text/x-swift";
pub(crate) const CONTENT_TYPE_ZIP: &str = "application/zip";
pub(crate) const CONTENT_TYPE_PROBLEM: &str = "application/problem+json";

/// Media types negotiated with the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaType {
    /// JSON API payloads.
    Json,

    /// Manifest sources.
    Swift,

    /// Source archives.
    Zip,
}

impl MediaType {
    /// `Accept` header value for this media type.
    pub fn accept_header(&self) -> String {
        format!(
            "application/vnd.swift.registry.v{}+{}",
            API_VERSION,
            self.suffix()
        )
    }

    /// Expected response `Content-Type` for this media type.
    pub fn content_type(&self) -> &'static str {
        match self {
            Self::Json => CONTENT_TYPE_JSON,
            Self::Swift => CONTENT_TYPE_MANIFEST,
            Self::Zip => CONTENT_TYPE_ZIP,
        }
    }

    fn suffix(&self) -> &'static str {
        match self {
            Self::Json => "json",
            Self::Swift => "swift",
            Self::Zip => "zip",
        }
    }
}

/// Validate the `Content-Version` header on a response.
///
/// The header must equal the supported API version. With `optional` set, an
/// absent header passes; a present-but-wrong header never does.
pub fn validate_api_version(headers: &HeaderMap, optional: bool) -> RegistryResult<()> {
    let actual = headers
        .get(CONTENT_VERSION_HEADER)
        .and_then(|v| v.to_str().ok());

    match actual {
        Some(version) if version == API_VERSION => Ok(()),
        Some(version) => Err(RegistryError::InvalidContentVersion {
            expected: API_VERSION.to_string(),
            actual: Some(version.to_string()),
        }),
        None if optional => Ok(()),
        None => Err(RegistryError::InvalidContentVersion {
            expected: API_VERSION.to_string(),
            actual: None,
        }),
    }
}

/// Validate the `Content-Type` header on a response.
///
/// The header must equal the expected type, or begin with `"<expected>;"`
/// (parameters such as `charset` are allowed).
pub fn validate_content_type(headers: &HeaderMap, expected: &str) -> RegistryResult<()> {
    let actual = headers.get(CONTENT_TYPE).and_then(|v| v.to_str().ok());

    match actual {
        Some(value) if value == expected || value.starts_with(&format!("{};", expected)) => Ok(()),
        other => Err(RegistryError::InvalidContentType {
            expected: expected.to_string(),
            actual: other.map(String::from),
        }),
    }
}

/// Whether a response declared an `application/problem+json` body.
pub(crate) fn is_problem_response(headers: &HeaderMap) -> bool {
    validate_content_type(headers, CONTENT_TYPE_PROBLEM).is_ok()
}
