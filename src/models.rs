//! Defines the core data structures used in the lead-sweep application.

use serde::Deserialize;
use std::collections::BTreeSet;
use url::Url;

/// One organic entry of a search result page.
/// Fields absent from the provider response are empty strings.
#[derive(Deserialize, Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct SearchResult {
    #[serde(default)]
    pub link: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub snippet: String,
}

impl SearchResult {
    /// Case-insensitive containment check against title and snippet.
    /// `terms` are expected to be lowercase already.
    pub(crate) fn mentions_any(&self, terms: &[String]) -> bool {
        if terms.is_empty() {
            return true;
        }
        let haystack = format!("{} {}", self.title, self.snippet).to_lowercase();
        terms.iter().any(|t| haystack.contains(t.as_str()))
    }
}

/// A persisted lead, laid out as `[email, domain, keyword, page]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct LeadRow {
    /// Normalized (lowercase) email address.
    pub email: String,
    /// Domain of the site the address was found on.
    pub domain: String,
    /// Search phrase that surfaced the site.
    pub keyword: String,
    /// Result page number (1-based) the site was listed on.
    pub page: u32,
}

impl LeadRow {
    /// A row recording that `domain` was crawled without yielding an address.
    pub(crate) fn domain_marker(domain: &str, keyword: &str, page: u32) -> Self {
        Self {
            email: String::new(),
            domain: domain.to_string(),
            keyword: keyword.to_string(),
            page,
        }
    }

    pub(crate) fn is_domain_marker(&self) -> bool {
        self.email.is_empty()
    }
}

/// Outcome of fetching one candidate page during a crawl.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum PageFetch {
    /// The page answered 2xx and its body was read.
    Fetched { url: Url, status: u16, body: String },
    /// The page could not be used; the reason is kept for logging.
    Failed { url: Url, reason: String },
}

impl PageFetch {
    pub(crate) fn url(&self) -> &Url {
        match self {
            PageFetch::Fetched { url, .. } | PageFetch::Failed { url, .. } => url,
        }
    }

    pub(crate) fn is_fetched(&self) -> bool {
        matches!(self, PageFetch::Fetched { .. })
    }
}

/// Everything a site crawl produced.
#[derive(Debug, Clone)]
pub(crate) struct CrawlReport {
    pub seed: Url,
    /// Per-page outcomes, in fetch order.
    pub pages: Vec<PageFetch>,
    /// Candidate emails grouped by the page they were found on, in fetch order.
    /// Each group is sorted so discovery order is deterministic.
    pub candidates_by_page: Vec<BTreeSet<String>>,
}

impl CrawlReport {
    pub(crate) fn new(seed: Url) -> Self {
        Self {
            seed,
            pages: Vec::new(),
            candidates_by_page: Vec::new(),
        }
    }

    /// Candidates in discovery order, each reported once.
    pub(crate) fn candidates(&self) -> Vec<String> {
        let mut seen: BTreeSet<String> = BTreeSet::new();
        self.candidates_by_page
            .iter()
            .flatten()
            .filter(|c| seen.insert(c.to_string()))
            .cloned()
            .collect()
    }

    pub(crate) fn fetched_pages(&self) -> usize {
        self.pages.iter().filter(|p| p.is_fetched()).count()
    }

    pub(crate) fn failed_pages(&self) -> usize {
        self.pages.len() - self.fetched_pages()
    }
}

/// Counters reported at the end of a run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct RunSummary {
    pub keywords_processed: usize,
    pub keywords_skipped: usize,
    pub results_seen: usize,
    pub results_filtered: usize,
    pub domains_crawled: usize,
    pub domains_skipped: usize,
    pub emails_added: usize,
    pub quota_reached: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_search_result_missing_fields_default_to_empty() {
        let r: SearchResult = serde_json::from_str(r#"{"link":"https://acme.test"}"#).unwrap();
        assert_eq!(r.link, "https://acme.test");
        assert_eq!(r.title, "");
        assert_eq!(r.snippet, "");
    }

    #[test]
    fn test_mentions_any() {
        let r = SearchResult {
            link: "https://acme.test".to_string(),
            title: "Acme RPA Services".to_string(),
            snippet: "Automation for finance teams".to_string(),
        };
        assert!(r.mentions_any(&[]));
        assert!(r.mentions_any(&["rpa".to_string()]));
        assert!(r.mentions_any(&["bookkeeping".to_string(), "finance".to_string()]));
        assert!(!r.mentions_any(&["bakery".to_string()]));
    }

    #[test]
    fn test_candidates_keep_page_order_without_repeats() {
        let mut report = CrawlReport::new(Url::parse("https://acme.test").unwrap());
        report.candidates_by_page.push(
            ["sales@acme.test", "info@acme.test"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
        );
        report.candidates_by_page.push(
            ["sales@acme.test", "press@acme.test"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
        );
        assert_eq!(
            report.candidates(),
            vec!["info@acme.test", "sales@acme.test", "press@acme.test"]
        );
    }
}
