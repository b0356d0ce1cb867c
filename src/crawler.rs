//! Fetches a site's home page and a few fixed sub-pages and collects candidate emails.

use crate::config::{Config, get_random_sleep_duration};
use crate::extractor::extract_from_html;
use crate::models::{CrawlReport, PageFetch};
use async_trait::async_trait;
use reqwest::Client;
use std::collections::BTreeSet;
use std::time::{Duration, Instant};
use url::Url;

/// Something that can crawl a seed URL for email candidates. Never fails:
/// per-page problems are recorded in the report.
#[async_trait]
pub(crate) trait SiteCrawler {
    async fn crawl(&self, seed: &Url) -> CrawlReport;
}

/// Sequential HTTP crawler over the seed plus configured common pages.
#[derive(Debug, Clone)]
pub(crate) struct HttpSiteCrawler {
    http_client: Client,
    common_pages: Vec<String>,
    request_timeout: Duration,
    sleep_between_requests: (f32, f32),
}

impl HttpSiteCrawler {
    pub(crate) fn new(http_client: Client, config: &Config) -> Self {
        Self {
            http_client,
            common_pages: config.common_pages_to_scrape.clone(),
            request_timeout: config.request_timeout,
            sleep_between_requests: config.sleep_between_requests,
        }
    }

    /// The seed followed by each common page resolved against it.
    /// Only same-host URLs are kept; duplicates are dropped, order is preserved.
    pub(crate) fn candidate_urls(&self, seed: &Url) -> Vec<Url> {
        let mut urls = vec![seed.clone()];
        for page_path in &self.common_pages {
            match seed.join(page_path) {
                Ok(full_url) => {
                    if full_url.host_str() != seed.host_str() {
                        tracing::debug!(target: "crawl_task", "Skipping generated URL (different host): {}", full_url);
                    } else if !urls.contains(&full_url) {
                        urls.push(full_url);
                    }
                }
                Err(e) => {
                    tracing::warn!(
                        target: "crawl_task",
                        "Failed to join seed URL {} with page {}: {}",
                        seed,
                        page_path,
                        e
                    );
                }
            }
        }
        urls
    }

    async fn fetch_page(&self, page_url: &Url) -> PageFetch {
        tracing::debug!(target: "crawl_task", "Attempting to GET: {}", page_url);

        let response = match self
            .http_client
            .get(page_url.clone())
            .timeout(self.request_timeout)
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) => {
                let reason = if e.is_timeout() {
                    format!("timeout: {}", e)
                } else if e.is_connect() || e.is_request() {
                    format!("connection error: {}", e)
                } else {
                    format!("request error: {}", e)
                };
                tracing::warn!(target: "crawl_task", "Failed to fetch {}: {}", page_url, reason);
                return PageFetch::Failed {
                    url: page_url.clone(),
                    reason,
                };
            }
        };

        let status = response.status();
        if !status.is_success() {
            if status == reqwest::StatusCode::NOT_FOUND {
                tracing::debug!(target: "crawl_task", "Page not found (404): {}", page_url);
            } else {
                tracing::warn!(target: "crawl_task", "HTTP error fetching {}: {}", page_url, status);
            }
            return PageFetch::Failed {
                url: page_url.clone(),
                reason: format!("HTTP {}", status),
            };
        }

        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|val| val.to_str().ok())
            .unwrap_or("")
            .to_lowercase();
        if !content_type.is_empty() && !content_type.contains("html") && !content_type.contains("text")
        {
            tracing::debug!(
                target: "crawl_task",
                "Skipping non-text content at {} ({})", page_url, content_type
            );
            return PageFetch::Failed {
                url: page_url.clone(),
                reason: format!("non-text content: {}", content_type),
            };
        }

        match response.text().await {
            Ok(body) => PageFetch::Fetched {
                url: page_url.clone(),
                status: status.as_u16(),
                body,
            },
            Err(e) => {
                tracing::warn!(target: "crawl_task", "Failed to read body of {}: {}", page_url, e);
                PageFetch::Failed {
                    url: page_url.clone(),
                    reason: format!("unreadable body: {}", e),
                }
            }
        }
    }
}

#[async_trait]
impl SiteCrawler for HttpSiteCrawler {
    async fn crawl(&self, seed: &Url) -> CrawlReport {
        let start_time = Instant::now();
        tracing::info!(target: "crawl_task", "Starting crawl for: {}", seed);

        let mut report = CrawlReport::new(seed.clone());
        let urls = self.candidate_urls(seed);
        let total = urls.len();

        for (i, page_url) in urls.iter().enumerate() {
            let page = self.fetch_page(page_url).await;
            let candidates: BTreeSet<String> = match &page {
                PageFetch::Fetched { body, .. } => extract_from_html(body).into_iter().collect(),
                PageFetch::Failed { .. } => BTreeSet::new(),
            };
            report.candidates_by_page.push(candidates);
            report.pages.push(page);

            if i + 1 < total {
                let pause = get_random_sleep_duration(self.sleep_between_requests);
                if !pause.is_zero() {
                    tokio::time::sleep(pause).await;
                }
            }
        }

        if report.fetched_pages() == 0 {
            tracing::warn!(target: "crawl_task", "Could not fetch any page for {}", report.seed);
        }

        tracing::info!(
            target: "crawl_task",
            "Crawl for {} finished in {:.2?}. Attempted {} URLs ({} fetched, {} failed). Found {} candidates.",
            report.seed,
            start_time.elapsed(),
            report.pages.len(),
            report.fetched_pages(),
            report.failed_pages(),
            report.candidates().len()
        );

        report
    }
}
