//! Defines the custom error types for the lead-sweep application.

use std::io;
use thiserror::Error;
use url::ParseError as UrlParseError;

/// The primary error type for a collection run.
#[derive(Error, Debug)]
pub(crate) enum AppError {
    /// Error occurring during configuration loading or validation.
    #[error("Configuration Error: {0}")]
    Config(String),

    /// A credential required to start the run was not supplied.
    #[error("Missing Credential: {0}")]
    MissingCredential(String),

    /// Error related to file input/output operations.
    #[error("IO Error: {0}")]
    Io(#[from] io::Error),

    /// Error during JSON serialization or deserialization.
    #[error("JSON Error: {0}")]
    Json(#[from] serde_json::Error),

    /// Error reading or writing the local CSV worksheet.
    #[error("CSV Error: {0}")]
    Csv(#[from] csv::Error),

    /// Error parsing a URL.
    #[error("URL Parsing Error: {0}")]
    UrlParse(#[from] UrlParseError),

    /// Error making HTTP requests via reqwest.
    #[error("HTTP Request Error: {0}")]
    Request(#[from] reqwest::Error),

    /// The search API answered with something other than a result page.
    #[error("Malformed Search Response: {0}")]
    SearchResponse(String),

    /// The spreadsheet backend rejected a read or write.
    #[error("Store Error: {0}")]
    Store(String),

    /// The worksheet header does not match the lead row layout.
    #[error("Schema Mismatch: expected header {expected:?}, found {found:?}")]
    Schema {
        /// The canonical header.
        expected: Vec<String>,
        /// The header row actually present in the worksheet.
        found: Vec<String>,
    },

    /// Failed to extract a domain from the provided URL.
    #[error("Failed to extract domain from URL: {0}")]
    DomainExtraction(String),

    /// An underlying error that doesn't fit other categories, using anyhow.
    #[error("Generic Error: {0}")]
    Generic(#[from] anyhow::Error),
}

pub(crate) type Result<T> = std::result::Result<T, AppError>;
