//! Finds email-like strings in page content and weeds out obvious false positives.

use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{Html, Selector};
use std::collections::HashSet;

/// Pattern for `local-part@domain.tld`. Boundaries are ASCII-only and the local part
/// starts with a letter or digit, so `ü-info@firma.de` yields `info@firma.de`.
pub(crate) static EMAIL_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?-u:\b)[A-Za-z0-9][A-Za-z0-9._%+-]*@[A-Za-z0-9.-]+\.[A-Za-z]{2,}(?-u:\b)")
        .expect("Failed to compile email regex pattern. This should not happen.")
});

/// Density (`@2x`) or pixel-size (`-300x200`) suffix right before a file extension.
static RESPONSIVE_IMAGE_MARKER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?:@\d+(?:\.\d+)?x|-\d+x\d+)\.[a-z0-9]+$")
        .expect("Failed to compile responsive image regex pattern. This should not happen.")
});

static BODY_SELECTOR: Lazy<Selector> = Lazy::new(|| Selector::parse("body").unwrap());

/// File extensions that show up in markup as `name@2x.png` and similar.
const ASSET_EXTENSIONS: &[&str] = &[
    ".png", ".jpg", ".jpeg", ".gif", ".svg", ".webp", ".bmp", ".ico", ".tif", ".tiff", ".avif",
    ".heic", ".woff", ".woff2", ".ttf", ".otf", ".eot", ".js", ".mjs", ".css", ".map", ".json",
    ".xml", ".pdf", ".mp4", ".webm", ".mp3",
];

/// Returns every distinct substring of `text` matching the email pattern, as written.
pub(crate) fn extract_emails(text: &str) -> HashSet<String> {
    EMAIL_REGEX
        .find_iter(text)
        .map(|m| m.as_str().to_string())
        .collect()
}

/// Scans both the raw markup and the decoded text of an HTML document.
///
/// The raw pass sees `mailto:` targets and attribute values, the text pass sees
/// addresses written with character references such as `&#64;`.
pub(crate) fn extract_from_html(html: &str) -> HashSet<String> {
    let mut found = extract_emails(html);

    let document = Html::parse_document(html);
    let mut text_content = String::new();
    let root = document
        .select(&BODY_SELECTOR)
        .next()
        .unwrap_or_else(|| document.root_element());
    for text_fragment in root.text() {
        text_content.push_str(text_fragment.trim());
        text_content.push(' ');
    }

    found.extend(extract_emails(&text_content));
    found
}

/// Whether a candidate is plausibly an address rather than an asset file name.
pub(crate) fn is_valid(candidate: &str) -> bool {
    let lower = candidate.trim().to_lowercase();
    if ASSET_EXTENSIONS.iter().any(|ext| lower.ends_with(ext)) {
        return false;
    }
    !RESPONSIVE_IMAGE_MARKER.is_match(&lower)
}

/// Lowercased, trimmed form used for storage and deduplication.
pub(crate) fn normalize(email: &str) -> String {
    email.trim().to_lowercase()
}

/// The part after the last `@`, lowercased.
pub(crate) fn email_domain(email: &str) -> Option<String> {
    email
        .rsplit_once('@')
        .map(|(_, domain)| domain.trim().to_lowercase())
        .filter(|d| !d.is_empty())
}

/// Whether the address belongs to one of the given free webmail providers.
pub(crate) fn is_free_domain(email: &str, free_domains: &HashSet<String>) -> bool {
    email_domain(email)
        .map(|d| free_domains.contains(&d))
        .unwrap_or(false)
}
