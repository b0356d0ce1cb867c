use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use reqwest::Client;
use tracing::info;
use tracing_subscriber::EnvFilter;

mod collector;
mod config;
mod crawler;
mod cursor;
mod domain;
mod error;
mod extractor;
mod models;
mod search;
mod store;

use collector::{Collector, RunSettings};
use config::{Config, SettingsArgs, StoreBackend};
use crawler::{HttpSiteCrawler, SiteCrawler};
use cursor::PageTracker;
use error::AppError;
use search::SerpApiClient;
use store::{CsvSheetStore, GoogleSheetsStore, LeadStore};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Log filter used when RUST_LOG is not set (e.g. "info", "lead_sweep=debug")
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    #[command(flatten)]
    settings: SettingsArgs,
}

#[derive(Subcommand)]
enum Commands {
    /// Sweep the next result page of every keyword and append new emails
    Run,
    /// Crawl a single site and print the emails it yields
    Crawl {
        /// Site URL or bare domain
        url: String,
    },
    /// Show each keyword's page cursor and the store totals
    Status,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let config = config::build_config(&cli.settings).context("Failed to build configuration")?;
    let http_client = build_http_client(&config)?;

    match cli.command {
        Commands::Run => run(&config, http_client).await?,
        Commands::Crawl { url } => crawl(&config, http_client, &url).await?,
        Commands::Status => status(&config, http_client).await?,
    }

    Ok(())
}

fn build_http_client(config: &Config) -> error::Result<Client> {
    Client::builder()
        .user_agent(&config.user_agent)
        .timeout(config.request_timeout)
        .build()
        .map_err(|e| AppError::Generic(anyhow::anyhow!("Failed to build HTTP client: {}", e)))
}

async fn run(config: &Config, http_client: Client) -> Result<()> {
    config.require_keywords()?;
    let search = SerpApiClient::new(http_client.clone(), config)?;
    let crawler = HttpSiteCrawler::new(http_client.clone(), config);

    match config.store.backend {
        StoreBackend::Csv => {
            let store = CsvSheetStore::open(&config.store.csv_path)
                .with_context(|| format!("Failed to open {}", config.store.csv_path.display()))?;
            run_collection(config, search, crawler, store).await
        }
        StoreBackend::Sheets => {
            let store = GoogleSheetsStore::open(http_client, &config.store)
                .await
                .context("Failed to open spreadsheet")?;
            run_collection(config, search, crawler, store).await
        }
    }
}

async fn run_collection<St: LeadStore>(
    config: &Config,
    search: SerpApiClient,
    crawler: HttpSiteCrawler,
    store: St,
) -> Result<()> {
    info!(
        "Starting run over {} keywords (quota {}, ceiling {})",
        config.keywords.len(),
        config.email_quota,
        config.page_ceiling
    );

    let progress_bar = indicatif::ProgressBar::new(config.email_quota as u64);
    progress_bar.set_style(
        indicatif::ProgressStyle::default_bar()
            .template("[{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len} emails {msg}")
            .context("Invalid progress bar template")?
            .progress_chars("##-"),
    );

    let mut collector = Collector::new(
        RunSettings::from_config(config),
        config.cursor_mode,
        config.page_ceiling,
        search,
        crawler,
        store,
    )
    .await?
    .with_progress(progress_bar);

    let summary = collector.run().await?;
    println!("Added {} new emails", summary.emails_added);
    Ok(())
}

async fn crawl(config: &Config, http_client: Client, raw_url: &str) -> Result<()> {
    let seed = domain::normalize_url(raw_url)?;
    let crawler = HttpSiteCrawler::new(http_client, config);
    let report = crawler.crawl(&seed).await;

    for page in &report.pages {
        match page {
            models::PageFetch::Fetched { status, .. } => info!("{} -> {}", page.url(), status),
            models::PageFetch::Failed { reason, .. } => {
                info!("{} -> failed ({})", page.url(), reason)
            }
        }
    }

    let mut seen = std::collections::HashSet::new();
    let emails: Vec<String> = report
        .candidates()
        .iter()
        .filter(|c| extractor::is_valid(c))
        .map(|c| extractor::normalize(c))
        .filter(|e| {
            !config.business_only || !extractor::is_free_domain(e, &config.free_email_domains)
        })
        .filter(|e| seen.insert(e.clone()))
        .collect();

    for email in &emails {
        println!("{}", email);
    }
    info!("Found {} emails on {}", emails.len(), report.seed);
    Ok(())
}

async fn status(config: &Config, http_client: Client) -> Result<()> {
    match config.store.backend {
        StoreBackend::Csv => {
            let store = CsvSheetStore::open(&config.store.csv_path)?;
            print_status(config, &store).await
        }
        StoreBackend::Sheets => {
            let store = GoogleSheetsStore::open(http_client, &config.store).await?;
            print_status(config, &store).await
        }
    }
}

async fn print_status<St: LeadStore>(config: &Config, store: &St) -> Result<()> {
    let tracker =
        PageTracker::load(store, &config.keywords, config.cursor_mode, config.page_ceiling).await?;

    for keyword in &config.keywords {
        let state = if tracker.is_exhausted(keyword) {
            "exhausted".to_string()
        } else {
            format!("next page {}", tracker.advance(keyword))
        };
        println!(
            "{:<40} last page {:>3}/{} ({})",
            keyword,
            tracker.last_page(keyword),
            config.page_ceiling,
            state
        );
    }

    println!(
        "{} emails from {} domains",
        store.existing_emails().await?.len(),
        store.existing_domains().await?.len()
    );
    Ok(())
}
