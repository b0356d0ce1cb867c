//! Drives one collection run: keyword → search page → site crawl → filter → append.

use crate::config::Config;
use crate::crawler::SiteCrawler;
use crate::cursor::PageTracker;
use crate::domain::domain_from_link;
use crate::error::Result;
use crate::extractor::{is_free_domain, is_valid, normalize};
use crate::models::{LeadRow, RunSummary, SearchResult};
use crate::search::SearchClient;
use crate::store::LeadStore;
use indicatif::ProgressBar;
use std::collections::HashSet;

/// The knobs of a run, taken from [`Config`] once at startup.
#[derive(Debug, Clone)]
pub(crate) struct RunSettings {
    pub keywords: Vec<String>,
    pub email_quota: usize,
    pub required_terms: Vec<String>,
    pub business_only: bool,
    pub free_email_domains: HashSet<String>,
    pub mark_empty_domains_seen: bool,
}

impl RunSettings {
    pub(crate) fn from_config(config: &Config) -> Self {
        Self {
            keywords: config.keywords.clone(),
            email_quota: config.email_quota,
            required_terms: config.required_terms.clone(),
            business_only: config.business_only,
            free_email_domains: config.free_email_domains.clone(),
            mark_empty_domains_seen: config.mark_empty_domains_seen,
        }
    }
}

/// How processing of one result page ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PageOutcome {
    /// Every result on the page was handled.
    Completed,
    /// The quota was hit before the page was finished.
    Interrupted,
}

/// Owns everything a run touches: the clients, the store and the in-memory seen sets.
pub(crate) struct Collector<S, C, St> {
    settings: RunSettings,
    search: S,
    crawler: C,
    store: St,
    tracker: PageTracker,
    seen_emails: HashSet<String>,
    seen_domains: HashSet<String>,
    summary: RunSummary,
    progress: ProgressBar,
}

impl<S, C, St> Collector<S, C, St>
where
    S: SearchClient,
    C: SiteCrawler,
    St: LeadStore,
{
    /// Reads the seen sets and page cursors from the store.
    pub(crate) async fn new(
        settings: RunSettings,
        tracker_mode: crate::config::CursorMode,
        page_ceiling: u32,
        search: S,
        crawler: C,
        store: St,
    ) -> Result<Self> {
        let seen_emails = store.existing_emails().await?;
        let seen_domains = store.existing_domains().await?;
        let tracker =
            PageTracker::load(&store, &settings.keywords, tracker_mode, page_ceiling).await?;

        tracing::info!(
            target: "collector",
            "Loaded {} known emails and {} known domains",
            seen_emails.len(),
            seen_domains.len()
        );

        Ok(Self {
            settings,
            search,
            crawler,
            store,
            tracker,
            seen_emails,
            seen_domains,
            summary: RunSummary::default(),
            progress: ProgressBar::hidden(),
        })
    }

    /// Reports each added email on `progress`.
    pub(crate) fn with_progress(mut self, progress: ProgressBar) -> Self {
        self.progress = progress;
        self
    }

    fn quota_reached(&self) -> bool {
        self.summary.emails_added >= self.settings.email_quota
    }

    /// Runs every keyword until done or until the quota is reached.
    ///
    /// Completed cursors are written back even when an upstream error aborts the run.
    pub(crate) async fn run(&mut self) -> Result<RunSummary> {
        let outcome = self.process_keywords().await;
        let flushed = self.tracker.flush(&mut self.store).await;
        outcome?;
        flushed?;

        self.progress.finish_with_message("Run complete");
        tracing::info!(
            target: "collector",
            "Run finished: {} emails added ({} keywords processed, {} skipped, {} domains crawled, {} skipped){}",
            self.summary.emails_added,
            self.summary.keywords_processed,
            self.summary.keywords_skipped,
            self.summary.domains_crawled,
            self.summary.domains_skipped,
            if self.summary.quota_reached { ", quota reached" } else { "" }
        );
        Ok(self.summary.clone())
    }

    async fn process_keywords(&mut self) -> Result<()> {
        let keywords = self.settings.keywords.clone();
        for keyword in &keywords {
            if self.quota_reached() {
                self.summary.quota_reached = true;
                break;
            }

            let page = self.tracker.advance(keyword);
            if page > self.tracker.ceiling() {
                tracing::info!(
                    target: "collector",
                    "Skipping '{}': page ceiling {} reached",
                    keyword,
                    self.tracker.ceiling()
                );
                self.summary.keywords_skipped += 1;
                continue;
            }

            tracing::info!(target: "collector", "Keyword '{}': searching page {}", keyword, page);
            let results = self.search.search(keyword, page).await?;
            tracing::info!(
                target: "collector",
                "Keyword '{}': {} results on page {}",
                keyword,
                results.len(),
                page
            );
            self.summary.keywords_processed += 1;

            match self.process_results(keyword, page, &results).await? {
                PageOutcome::Completed => self.tracker.record(keyword, page),
                PageOutcome::Interrupted => {
                    self.summary.quota_reached = true;
                    break;
                }
            }
        }
        Ok(())
    }

    async fn process_results(
        &mut self,
        keyword: &str,
        page: u32,
        results: &[SearchResult],
    ) -> Result<PageOutcome> {
        for (i, result) in results.iter().enumerate() {
            self.summary.results_seen += 1;

            if !result.mentions_any(&self.settings.required_terms) {
                tracing::debug!(target: "collector", "Result {} does not mention a required term", result.link);
                self.summary.results_filtered += 1;
                continue;
            }

            let (seed, domain) = match domain_from_link(&result.link) {
                Ok(parsed) => parsed,
                Err(e) => {
                    tracing::warn!(target: "collector", "Skipping result link '{}': {}", result.link, e);
                    continue;
                }
            };

            if self.seen_domains.contains(&domain) {
                tracing::info!(target: "collector", "Skipping {}: domain already processed", domain);
                self.summary.domains_skipped += 1;
                continue;
            }

            let finished_site = self.process_site(keyword, page, &seed, &domain).await?;

            if self.quota_reached() {
                self.summary.quota_reached = true;
                let page_done = finished_site && i + 1 == results.len();
                return Ok(if page_done {
                    PageOutcome::Completed
                } else {
                    PageOutcome::Interrupted
                });
            }
        }
        Ok(PageOutcome::Completed)
    }

    /// Crawls one site and persists its new emails. Returns false when the quota cut
    /// the site's candidate list short.
    async fn process_site(
        &mut self,
        keyword: &str,
        page: u32,
        seed: &url::Url,
        domain: &str,
    ) -> Result<bool> {
        tracing::info!(target: "collector", "Crawling {} ({})", domain, seed);
        let report = self.crawler.crawl(seed).await;
        self.summary.domains_crawled += 1;

        let mut accepted = 0usize;
        let mut finished = true;
        for candidate in report.candidates() {
            if !is_valid(&candidate) {
                tracing::debug!(target: "collector", "Rejected asset-like candidate {}", candidate);
                continue;
            }
            let email = normalize(&candidate);
            if self.settings.business_only
                && is_free_domain(&email, &self.settings.free_email_domains)
            {
                tracing::debug!(target: "collector", "Rejected free-mail address {}", email);
                continue;
            }
            if self.seen_emails.contains(&email) {
                tracing::debug!(target: "collector", "Already collected {}", email);
                continue;
            }
            if self.quota_reached() {
                finished = false;
                break;
            }

            let row = LeadRow {
                email: email.clone(),
                domain: domain.to_string(),
                keyword: keyword.to_string(),
                page,
            };
            self.store.append(&row).await?;
            self.seen_emails.insert(email);
            accepted += 1;
            self.summary.emails_added += 1;
            self.progress.inc(1);
            tracing::info!(target: "collector", "Added {} from {}", row.email, domain);
        }

        if accepted > 0 {
            self.seen_domains.insert(domain.to_string());
        } else if self.settings.mark_empty_domains_seen {
            self.store
                .append(&LeadRow::domain_marker(domain, keyword, page))
                .await?;
            self.seen_domains.insert(domain.to_string());
            tracing::info!(target: "collector", "No new emails on {}; marked as processed", domain);
        } else {
            tracing::info!(target: "collector", "No new emails on {}", domain);
        }

        Ok(finished)
    }
}
