//! Source-control URL to REST API URL derivation.

use url::Url;

use crate::error::{ProviderError, ProviderResult};

/// Derive the repository API URL for a source-control URL.
///
/// Accepts `host:owner/repo[.git]` and `host/owner/repo[.git]` shapes,
/// with an optional scheme and user-info prefix, and yields
/// `https://api.<host>/repos/<owner>/<repo>`.
pub fn derive_api_url(scm_url: &str) -> ProviderResult<Url> {
    let invalid = || ProviderError::InvalidGitUrl {
        url: scm_url.to_string(),
    };

    let trimmed = scm_url.trim().trim_end_matches('/');
    let trimmed = trimmed.strip_suffix(".git").unwrap_or(trimmed);

    // Scheme and user-info carry no information the API URL needs.
    let rest = trimmed
        .split_once("://")
        .map(|(_, rest)| rest)
        .unwrap_or(trimmed);
    let rest = rest.rsplit_once('@').map(|(_, rest)| rest).unwrap_or(rest);

    let (host, owner, repo) = if let Some((host, path)) = rest.split_once(':') {
        let (owner, repo) = path.split_once('/').ok_or_else(invalid)?;
        (host, owner, repo)
    } else {
        let mut parts = rest.splitn(3, '/');
        let host = parts.next().ok_or_else(invalid)?;
        let owner = parts.next().ok_or_else(invalid)?;
        let repo = parts.next().ok_or_else(invalid)?;
        (host, owner, repo)
    };

    if host.is_empty()
        || owner.is_empty()
        || repo.is_empty()
        || owner.contains('/')
        || repo.contains('/')
        || !host.contains('.')
    {
        return Err(invalid());
    }

    Url::parse(&format!("https://api.{}/repos/{}/{}", host, owner, repo))
        .map_err(|_| invalid())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_https_form() {
        let url = derive_api_url("https://github.com/mona/LinkedList.git").unwrap();
        assert_eq!(url.as_str(), "https://api.github.com/repos/mona/LinkedList");
    }

    #[test]
    fn test_scp_form() {
        let url = derive_api_url("git@github.com:mona/LinkedList.git").unwrap();
        assert_eq!(url.as_str(), "https://api.github.com/repos/mona/LinkedList");
    }

    #[test]
    fn test_bare_host_form() {
        let url = derive_api_url("github.com/mona/LinkedList").unwrap();
        assert_eq!(url.as_str(), "https://api.github.com/repos/mona/LinkedList");
    }

    #[test]
    fn test_enterprise_host() {
        let url = derive_api_url("git.example.com:mona/LinkedList").unwrap();
        assert_eq!(
            url.as_str(),
            "https://api.git.example.com/repos/mona/LinkedList"
        );
    }

    #[test]
    fn test_trailing_slash() {
        let url = derive_api_url("https://github.com/mona/LinkedList/").unwrap();
        assert_eq!(url.as_str(), "https://api.github.com/repos/mona/LinkedList");
    }

    #[test]
    fn test_invalid_shapes() {
        for bad in [
            "",
            "github.com",
            "github.com/mona",
            "github.com:mona",
            "localhost/mona/LinkedList",
            "github.com/mona/Linked/List",
        ] {
            assert!(
                matches!(
                    derive_api_url(bad),
                    Err(ProviderError::InvalidGitUrl { .. })
                ),
                "expected {bad:?} to be rejected"
            );
        }
    }
}
