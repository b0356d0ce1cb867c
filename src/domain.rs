//! Utility functions for turning search result links into seeds and domains.

use crate::error::{AppError, Result};
use url::Url;

fn with_scheme(raw: &str) -> String {
    if raw.starts_with("http://") || raw.starts_with("https://") {
        raw.to_string()
    } else {
        format!("https://{}", raw)
    }
}

/// Parses a result link (or bare host) into a crawlable URL.
/// A missing scheme defaults to `https`, the fragment is dropped.
pub(crate) fn normalize_url(raw: &str) -> Result<Url> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(AppError::DomainExtraction("Link is empty".to_string()));
    }
    let mut url = Url::parse(&with_scheme(trimmed))?;
    url.set_fragment(None);
    if url.host_str().is_none() {
        return Err(AppError::DomainExtraction(format!(
            "Link has no host: {}",
            trimmed
        )));
    }
    Ok(url)
}

/// The lowercase host of `url` without a leading `www.`, used as the dedup key.
pub(crate) fn domain_of(url: &Url) -> Result<String> {
    let host = url
        .host_str()
        .ok_or_else(|| AppError::DomainExtraction(format!("No host in {}", url)))?;
    let host = host.to_lowercase();
    let domain = host.strip_prefix("www.").unwrap_or(&host);
    if domain.is_empty() {
        return Err(AppError::DomainExtraction(format!("Empty host in {}", url)));
    }
    Ok(domain.to_string())
}

/// Convenience for links straight out of a search response.
pub(crate) fn domain_from_link(link: &str) -> Result<(Url, String)> {
    let url = normalize_url(link)?;
    let domain = domain_of(&url)?;
    tracing::debug!("Extracted domain '{}' from '{}'", domain, link);
    Ok((url, domain))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_domain_from_link_simple() {
        assert_eq!(domain_from_link("https://www.example.com").unwrap().1, "example.com");
        assert_eq!(domain_from_link("http://example.com").unwrap().1, "example.com");
        assert_eq!(domain_from_link("example.com").unwrap().1, "example.com");
        assert_eq!(domain_from_link("https://acme.test").unwrap().1, "acme.test");
    }

    #[test]
    fn test_domain_from_link_edge_cases() {
        assert_eq!(
            domain_from_link("https://EXAMPLE.com/path?query=1").unwrap().1,
            "example.com"
        );
        assert_eq!(domain_from_link("http://example.com:8080").unwrap().1, "example.com");
        assert_eq!(
            domain_from_link("https://sub.domain.example.co.uk").unwrap().1,
            "sub.domain.example.co.uk"
        );
    }

    #[test]
    fn test_normalize_url_drops_fragment() {
        let url = normalize_url(" https://acme.test/services#pricing ").unwrap();
        assert_eq!(url.as_str(), "https://acme.test/services");
    }

    #[test]
    fn test_invalid_links() {
        assert!(domain_from_link("").is_err());
        assert!(domain_from_link("http://").is_err());
        assert!(domain_from_link("   ").is_err());
    }
}
