//! Defines the configuration settings for the lead-sweep application.

use crate::error::{AppError, Result};
use anyhow::Context;
use clap::{Args, ValueEnum};
use serde::Deserialize;
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Settings shared by every subcommand. Each one overrides the configuration file.
#[derive(Args, Debug, Default, Clone)]
pub(crate) struct SettingsArgs {
    /// Path to configuration file (TOML format)
    #[arg(long, global = true, env = "LEAD_SWEEP_CONFIG")]
    pub config_file: Option<String>,

    /// API key for the search provider
    #[arg(long, global = true, env = "LEAD_SWEEP_SEARCH_API_KEY", hide_env_values = true)]
    pub search_api_key: Option<String>,

    /// Search endpoint URL (SerpApi-compatible)
    #[arg(long, global = true, env = "LEAD_SWEEP_SEARCH_ENDPOINT")]
    pub search_endpoint: Option<String>,

    /// Comma-separated list of search phrases
    #[arg(long, global = true, env = "LEAD_SWEEP_KEYWORDS")]
    pub keywords: Option<String>,

    /// Maximum number of emails appended per run
    #[arg(long, global = true, env = "LEAD_SWEEP_EMAIL_QUOTA")]
    pub email_quota: Option<usize>,

    /// Highest result page a keyword may advance to
    #[arg(long, global = true, env = "LEAD_SWEEP_PAGE_CEILING")]
    pub page_ceiling: Option<u32>,

    /// Number of results requested per search page
    #[arg(long, global = true, env = "LEAD_SWEEP_PAGE_SIZE")]
    pub page_size: Option<u32>,

    /// Whether every keyword keeps its own page cursor or all share one
    #[arg(long, global = true, value_enum, env = "LEAD_SWEEP_CURSOR_MODE")]
    pub cursor_mode: Option<CursorMode>,

    /// Comma-separated terms a result title or snippet must contain
    #[arg(long, global = true, env = "LEAD_SWEEP_REQUIRED_TERMS")]
    pub required_terms: Option<String>,

    /// Reject addresses hosted by free webmail providers
    #[arg(long, global = true, env = "LEAD_SWEEP_BUSINESS_ONLY")]
    pub business_only: Option<bool>,

    /// Mark a crawled domain as seen even when it yielded no email
    #[arg(long, global = true, env = "LEAD_SWEEP_MARK_EMPTY_DOMAINS_SEEN")]
    pub mark_empty_domains_seen: Option<bool>,

    /// Comma-separated list of sub-pages crawled for each site
    #[arg(long, global = true, env = "LEAD_SWEEP_COMMON_PAGES")]
    pub common_pages: Option<String>,

    /// HTTP request timeout in seconds
    #[arg(long, global = true, env = "LEAD_SWEEP_REQUEST_TIMEOUT")]
    pub request_timeout: Option<u64>,

    /// Minimum sleep between page fetches (seconds)
    #[arg(long, global = true, env = "LEAD_SWEEP_MIN_SLEEP")]
    pub min_sleep: Option<f32>,

    /// Maximum sleep between page fetches (seconds)
    #[arg(long, global = true, env = "LEAD_SWEEP_MAX_SLEEP")]
    pub max_sleep: Option<f32>,

    /// User agent string for HTTP requests
    #[arg(long, global = true, env = "LEAD_SWEEP_USER_AGENT")]
    pub user_agent: Option<String>,

    /// Storage backend holding the lead worksheet
    #[arg(long, global = true, value_enum, env = "LEAD_SWEEP_STORE")]
    pub store: Option<StoreBackend>,

    /// Path of the local CSV worksheet
    #[arg(long, global = true, env = "LEAD_SWEEP_CSV_PATH")]
    pub csv_path: Option<PathBuf>,

    /// Google Sheets spreadsheet id
    #[arg(long, global = true, env = "LEAD_SWEEP_SPREADSHEET_ID")]
    pub spreadsheet_id: Option<String>,

    /// Name of the worksheet receiving lead rows
    #[arg(long, global = true, env = "LEAD_SWEEP_SHEET_NAME")]
    pub sheet_name: Option<String>,

    /// OAuth access token for the Google Sheets API
    #[arg(long, global = true, env = "LEAD_SWEEP_SHEETS_TOKEN", hide_env_values = true)]
    pub sheets_token: Option<String>,
}

/// How page cursors are keyed in the store.
#[derive(ValueEnum, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "kebab-case")]
pub(crate) enum CursorMode {
    /// One cursor per search phrase.
    #[default]
    PerKeyword,
    /// A single cursor cell shared by every phrase.
    Global,
}

/// Where lead rows and cursors are persisted.
#[derive(ValueEnum, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub(crate) enum StoreBackend {
    /// A CSV file on local disk plus a JSON cursor file next to it.
    #[default]
    Csv,
    /// A Google Sheets spreadsheet.
    Sheets,
}

/// TOML Configuration file structure
#[derive(Deserialize, Debug, Default)]
struct ConfigFile {
    search: Option<SearchConfig>,
    run: Option<RunConfig>,
    network: Option<NetworkConfig>,
    scraping: Option<ScrapingConfig>,
    store: Option<StoreFileConfig>,
}

#[derive(Deserialize, Debug, Default)]
struct SearchConfig {
    endpoint: Option<String>,
    engine: Option<String>,
    api_key: Option<String>,
    page_size: Option<u32>,
    keywords: Option<Vec<String>>,
    required_terms: Option<Vec<String>>,
}

#[derive(Deserialize, Debug, Default)]
struct RunConfig {
    email_quota: Option<usize>,
    page_ceiling: Option<u32>,
    cursor_mode: Option<CursorMode>,
    mark_empty_domains_seen: Option<bool>,
}

#[derive(Deserialize, Debug, Default)]
struct NetworkConfig {
    request_timeout: Option<u64>,
    min_sleep: Option<f32>,
    max_sleep: Option<f32>,
    user_agent: Option<String>,
}

#[derive(Deserialize, Debug, Default)]
struct ScrapingConfig {
    common_pages: Option<Vec<String>>,
    business_only: Option<bool>,
    free_email_domains: Option<Vec<String>>,
}

#[derive(Deserialize, Debug, Default)]
struct StoreFileConfig {
    backend: Option<StoreBackend>,
    csv_path: Option<PathBuf>,
    spreadsheet_id: Option<String>,
    sheet_name: Option<String>,
    cursor_sheet_name: Option<String>,
    access_token: Option<String>,
    endpoint: Option<String>,
}

/// Settings for the spreadsheet store.
#[derive(Debug, Clone)]
pub(crate) struct StoreConfig {
    pub backend: StoreBackend,
    pub csv_path: PathBuf,
    pub spreadsheet_id: Option<String>,
    /// Worksheet holding `[email, domain, keyword, page]` rows.
    pub sheet_name: String,
    /// Worksheet holding `[key, page]` cursor rows.
    pub cursor_sheet_name: String,
    pub access_token: Option<String>,
    pub endpoint: String,
}

/// Application configuration settings.
#[derive(Debug, Clone)]
pub(crate) struct Config {
    /// Search endpoint URL.
    pub search_endpoint: String,
    /// Engine parameter passed to the search provider.
    pub search_engine: String,
    /// Credential for the search provider. Required by `run`.
    pub search_api_key: Option<String>,
    /// Results requested per search page.
    pub page_size: u32,
    /// Search phrases, processed in this order.
    pub keywords: Vec<String>,
    /// If non-empty, a result must mention one of these in its title or snippet.
    pub required_terms: Vec<String>,
    /// Maximum number of emails appended by one run.
    pub email_quota: usize,
    /// Highest page number a cursor may reach.
    pub page_ceiling: u32,
    pub cursor_mode: CursorMode,
    /// Whether a crawled domain with no accepted email is still marked as seen.
    pub mark_empty_domains_seen: bool,
    /// Sub-pages resolved against each seed URL.
    pub common_pages_to_scrape: Vec<String>,
    /// Reject free webmail domains.
    pub business_only: bool,
    pub free_email_domains: HashSet<String>,
    /// Timeout for individual HTTP requests.
    pub request_timeout: Duration,
    /// Minimum and maximum sleep duration between page fetches (seconds).
    pub sleep_between_requests: (f32, f32),
    /// User agent string to use for HTTP requests.
    pub user_agent: String,
    pub store: StoreConfig,
}

impl Default for Config {
    fn default() -> Self {
        let free_email_domains: HashSet<String> = [
            "gmail.com",
            "googlemail.com",
            "yahoo.com",
            "ymail.com",
            "hotmail.com",
            "outlook.com",
            "live.com",
            "msn.com",
            "aol.com",
            "icloud.com",
            "me.com",
            "mail.com",
            "gmx.com",
            "gmx.net",
            "proton.me",
            "protonmail.com",
            "zoho.com",
            "yandex.com",
        ]
        .iter()
        .map(|s| s.to_string())
        .collect();

        Config {
            search_endpoint: "https://serpapi.com/search".to_string(),
            search_engine: "google".to_string(),
            search_api_key: None,
            page_size: 10,
            keywords: Vec::new(),
            required_terms: Vec::new(),
            email_quota: 50,
            page_ceiling: 100,
            cursor_mode: CursorMode::PerKeyword,
            mark_empty_domains_seen: true,
            common_pages_to_scrape: vec!["/contact".to_string(), "/about".to_string()],
            business_only: false,
            free_email_domains,
            request_timeout: Duration::from_secs(10),
            sleep_between_requests: (1.0, 1.0),
            user_agent: "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/118.0.0.0 Safari/537.36".to_string(),
            store: StoreConfig {
                backend: StoreBackend::Csv,
                csv_path: PathBuf::from("leads.csv"),
                spreadsheet_id: None,
                sheet_name: "Leads".to_string(),
                cursor_sheet_name: "cursors".to_string(),
                access_token: None,
                endpoint: "https://sheets.googleapis.com/v4/spreadsheets".to_string(),
            },
        }
    }
}

impl Config {
    /// Returns the search credential or a fatal startup error.
    pub(crate) fn require_search_api_key(&self) -> Result<&str> {
        self.search_api_key
            .as_deref()
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| {
                AppError::MissingCredential(
                    "search API key (set LEAD_SWEEP_SEARCH_API_KEY or [search].api_key)"
                        .to_string(),
                )
            })
    }

    /// Fails when a `run` could not do any work with these settings.
    pub(crate) fn require_keywords(&self) -> Result<()> {
        if self.keywords.is_empty() {
            return Err(AppError::Config(
                "no keywords configured (set LEAD_SWEEP_KEYWORDS or [search].keywords)"
                    .to_string(),
            ));
        }
        Ok(())
    }
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

/// Load configuration from a TOML file
fn load_config_file(file_path: &str) -> anyhow::Result<ConfigFile> {
    let path = Path::new(file_path);
    if !path.exists() {
        tracing::warn!("Configuration file {} not found, using defaults", file_path);
        return Ok(ConfigFile::default());
    }

    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read configuration file: {}", file_path))?;

    let config = parse_config_file(&content)
        .with_context(|| format!("Failed to parse TOML configuration from {}", file_path))?;

    tracing::info!("Loaded configuration from {}", file_path);
    Ok(config)
}

fn parse_config_file(content: &str) -> std::result::Result<ConfigFile, toml::de::Error> {
    toml::from_str(content)
}

fn apply_file_config(config: &mut Config, file_config: &ConfigFile) {
    if let Some(search) = &file_config.search {
        if let Some(endpoint) = &search.endpoint {
            config.search_endpoint = endpoint.clone();
        }
        if let Some(engine) = &search.engine {
            config.search_engine = engine.clone();
        }
        if let Some(key) = &search.api_key {
            config.search_api_key = Some(key.clone());
        }
        if let Some(size) = search.page_size {
            config.page_size = size;
        }
        if let Some(keywords) = &search.keywords {
            config.keywords = keywords.clone();
        }
        if let Some(terms) = &search.required_terms {
            config.required_terms = terms.clone();
        }
    }

    if let Some(run) = &file_config.run {
        if let Some(quota) = run.email_quota {
            config.email_quota = quota;
        }
        if let Some(ceiling) = run.page_ceiling {
            config.page_ceiling = ceiling;
        }
        if let Some(mode) = run.cursor_mode {
            config.cursor_mode = mode;
        }
        if let Some(mark) = run.mark_empty_domains_seen {
            config.mark_empty_domains_seen = mark;
        }
    }

    if let Some(network) = &file_config.network {
        if let Some(timeout) = network.request_timeout {
            config.request_timeout = Duration::from_secs(timeout);
        }
        if let Some(min_sleep) = network.min_sleep {
            config.sleep_between_requests.0 = min_sleep;
        }
        if let Some(max_sleep) = network.max_sleep {
            config.sleep_between_requests.1 = max_sleep;
        }
        if let Some(user_agent) = &network.user_agent {
            config.user_agent = user_agent.clone();
        }
    }

    if let Some(scraping) = &file_config.scraping {
        if let Some(pages) = &scraping.common_pages {
            config.common_pages_to_scrape = pages.clone();
        }
        if let Some(business_only) = scraping.business_only {
            config.business_only = business_only;
        }
        if let Some(domains) = &scraping.free_email_domains {
            config.free_email_domains = domains.iter().map(|d| d.to_lowercase()).collect();
        }
    }

    if let Some(store) = &file_config.store {
        if let Some(backend) = store.backend {
            config.store.backend = backend;
        }
        if let Some(path) = &store.csv_path {
            config.store.csv_path = path.clone();
        }
        if let Some(id) = &store.spreadsheet_id {
            config.store.spreadsheet_id = Some(id.clone());
        }
        if let Some(name) = &store.sheet_name {
            config.store.sheet_name = name.clone();
        }
        if let Some(name) = &store.cursor_sheet_name {
            config.store.cursor_sheet_name = name.clone();
        }
        if let Some(token) = &store.access_token {
            config.store.access_token = Some(token.clone());
        }
        if let Some(endpoint) = &store.endpoint {
            config.store.endpoint = endpoint.clone();
        }
    }
}

/// Apply command line arguments to the Config instance
fn apply_cli_args(config: &mut Config, args: &SettingsArgs) {
    if let Some(ref key) = args.search_api_key {
        config.search_api_key = Some(key.clone());
    }

    if let Some(ref endpoint) = args.search_endpoint {
        config.search_endpoint = endpoint.clone();
    }

    if let Some(ref keywords) = args.keywords {
        config.keywords = split_list(keywords);
    }

    if let Some(quota) = args.email_quota {
        config.email_quota = quota;
    }

    if let Some(ceiling) = args.page_ceiling {
        config.page_ceiling = ceiling;
    }

    if let Some(size) = args.page_size {
        config.page_size = size;
    }

    if let Some(mode) = args.cursor_mode {
        config.cursor_mode = mode;
    }

    if let Some(ref terms) = args.required_terms {
        config.required_terms = split_list(terms);
    }

    if let Some(business_only) = args.business_only {
        config.business_only = business_only;
    }

    if let Some(mark) = args.mark_empty_domains_seen {
        config.mark_empty_domains_seen = mark;
    }

    if let Some(ref pages) = args.common_pages {
        config.common_pages_to_scrape = split_list(pages);
    }

    if let Some(timeout) = args.request_timeout {
        config.request_timeout = Duration::from_secs(timeout);
    }

    if let Some(min_sleep) = args.min_sleep {
        config.sleep_between_requests.0 = min_sleep;
    }

    if let Some(max_sleep) = args.max_sleep {
        config.sleep_between_requests.1 = max_sleep;
    }

    if let Some(ref agent) = args.user_agent {
        config.user_agent = agent.clone();
    }

    if let Some(backend) = args.store {
        config.store.backend = backend;
    }

    if let Some(ref path) = args.csv_path {
        config.store.csv_path = path.clone();
    }

    if let Some(ref id) = args.spreadsheet_id {
        config.store.spreadsheet_id = Some(id.clone());
    }

    if let Some(ref name) = args.sheet_name {
        config.store.sheet_name = name.clone();
    }

    if let Some(ref token) = args.sheets_token {
        config.store.access_token = Some(token.clone());
    }
}

fn validate_config(config: &mut Config) -> anyhow::Result<()> {
    if config.sleep_between_requests.0 < 0.0 {
        config.sleep_between_requests.0 = 0.0;
        tracing::warn!("Min sleep was negative. Setting to 0.");
    }

    if config.sleep_between_requests.0 > config.sleep_between_requests.1 {
        config.sleep_between_requests.1 = config.sleep_between_requests.0;
        tracing::warn!(
            "Min sleep was greater than max sleep. Setting both to {}",
            config.sleep_between_requests.0
        );
    }

    if config.email_quota == 0 {
        config.email_quota = 1;
        tracing::warn!("Email quota was set to 0. Setting to 1.");
    }

    if config.page_size == 0 || config.page_size > 100 {
        let clamped = config.page_size.clamp(1, 100);
        tracing::warn!(
            "Page size {} is outside 1..=100. Setting to {}.",
            config.page_size,
            clamped
        );
        config.page_size = clamped;
    }

    if config.page_ceiling == 0 {
        tracing::warn!("Page ceiling is 0. Every keyword is exhausted and will be skipped.");
    }

    config.keywords.retain(|k| !k.trim().is_empty());
    config.required_terms = config
        .required_terms
        .iter()
        .map(|t| t.trim().to_lowercase())
        .filter(|t| !t.is_empty())
        .collect();

    if config.store.sheet_name.trim().is_empty() {
        anyhow::bail!("Worksheet name must not be empty");
    }

    if config.store.sheet_name == config.store.cursor_sheet_name {
        anyhow::bail!(
            "Lead worksheet and cursor worksheet must differ (both are '{}')",
            config.store.sheet_name
        );
    }

    Ok(())
}

pub(crate) fn build_config(args: &SettingsArgs) -> anyhow::Result<Config> {
    let mut config = Config::default();

    if let Some(ref file_path) = args.config_file {
        let file_config = load_config_file(file_path)?;
        apply_file_config(&mut config, &file_config);
    } else {
        for path in ["./lead-sweep.toml", "./config.toml"].iter() {
            if Path::new(path).exists() {
                match load_config_file(path) {
                    Ok(file_config) => {
                        apply_file_config(&mut config, &file_config);
                        break;
                    }
                    Err(e) => {
                        tracing::warn!("Failed to load configuration from {}: {}", path, e);
                    }
                }
            }
        }
    }

    apply_cli_args(&mut config, args);

    validate_config(&mut config)?;

    tracing::debug!(
        "Final configuration: keywords={:?}, quota={}, ceiling={}, cursor_mode={:?}, store={:?}",
        config.keywords,
        config.email_quota,
        config.page_ceiling,
        config.cursor_mode,
        config.store.backend
    );

    Ok(config)
}

/// Picks the pause between two page fetches.
pub(crate) fn get_random_sleep_duration(range: (f32, f32)) -> Duration {
    use rand::Rng;
    let (min, max) = range;
    if min >= max {
        return Duration::from_secs_f32(min.max(0.0));
    }
    let duration_secs = rand::thread_rng().gen_range(min..max);
    Duration::from_secs_f32(duration_secs)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_config_overrides_defaults() {
        let file = parse_config_file(
            r#"
            [search]
            api_key = "abc"
            keywords = ["RPA automation company", "process mining consultancy"]
            page_size = 20

            [run]
            email_quota = 5
            page_ceiling = 2
            cursor_mode = "global"
            mark_empty_domains_seen = false

            [scraping]
            common_pages = ["/contact-us"]
            business_only = true
            free_email_domains = ["Gmail.com"]

            [store]
            backend = "sheets"
            spreadsheet_id = "sheet-1"
            "#,
        )
        .unwrap();

        let mut config = Config::default();
        apply_file_config(&mut config, &file);

        assert_eq!(config.search_api_key.as_deref(), Some("abc"));
        assert_eq!(config.keywords.len(), 2);
        assert_eq!(config.page_size, 20);
        assert_eq!(config.email_quota, 5);
        assert_eq!(config.page_ceiling, 2);
        assert_eq!(config.cursor_mode, CursorMode::Global);
        assert!(!config.mark_empty_domains_seen);
        assert_eq!(config.common_pages_to_scrape, vec!["/contact-us".to_string()]);
        assert!(config.business_only);
        assert!(config.free_email_domains.contains("gmail.com"));
        assert_eq!(config.store.backend, StoreBackend::Sheets);
        assert_eq!(config.store.spreadsheet_id.as_deref(), Some("sheet-1"));
    }

    #[test]
    fn test_cli_args_override_file() {
        let mut config = Config::default();
        config.email_quota = 5;
        let args = SettingsArgs {
            keywords: Some("a, b ,,c".to_string()),
            email_quota: Some(7),
            common_pages: Some("/team".to_string()),
            ..Default::default()
        };
        apply_cli_args(&mut config, &args);
        assert_eq!(config.keywords, vec!["a", "b", "c"]);
        assert_eq!(config.email_quota, 7);
        assert_eq!(config.common_pages_to_scrape, vec!["/team".to_string()]);
    }

    #[test]
    fn test_validate_clamps_values() {
        let mut config = Config::default();
        config.email_quota = 0;
        config.page_size = 500;
        config.sleep_between_requests = (3.0, 1.0);
        config.required_terms = vec![" RPA ".to_string(), "".to_string()];
        validate_config(&mut config).unwrap();
        assert_eq!(config.email_quota, 1);
        assert_eq!(config.page_size, 100);
        assert_eq!(config.sleep_between_requests, (3.0, 3.0));
        assert_eq!(config.required_terms, vec!["rpa".to_string()]);
    }

    #[test]
    fn test_validate_rejects_shared_worksheet() {
        let mut config = Config::default();
        config.store.cursor_sheet_name = config.store.sheet_name.clone();
        assert!(validate_config(&mut config).is_err());
    }

    #[test]
    fn test_missing_credentials_are_fatal() {
        let mut config = Config::default();
        assert!(matches!(
            config.require_search_api_key(),
            Err(AppError::MissingCredential(_))
        ));
        assert!(matches!(config.require_keywords(), Err(AppError::Config(_))));

        config.search_api_key = Some("key".to_string());
        config.keywords = vec!["RPA automation company".to_string()];
        assert_eq!(config.require_search_api_key().unwrap(), "key");
        assert!(config.require_keywords().is_ok());
    }

    #[test]
    fn test_fixed_sleep_when_range_is_flat() {
        assert_eq!(get_random_sleep_duration((0.0, 0.0)), Duration::ZERO);
        let d = get_random_sleep_duration((0.1, 0.2));
        assert!(d >= Duration::from_secs_f32(0.1) && d < Duration::from_secs_f32(0.2));
    }
}
