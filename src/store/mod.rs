//! Spreadsheet-backed system of record for collected leads and page cursors.

mod csv_sheet;
mod sheets;

pub(crate) use csv_sheet::CsvSheetStore;
pub(crate) use sheets::GoogleSheetsStore;

use crate::error::{AppError, Result};
use crate::models::LeadRow;
use async_trait::async_trait;
use std::collections::HashSet;

/// Column layout of the lead worksheet.
///
/// Every backend reads and writes rows through this type so the layout lives in one place.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct SheetSchema {
    pub email: usize,
    pub domain: usize,
    pub keyword: usize,
    pub page: usize,
}

pub(crate) const LEAD_SCHEMA: SheetSchema = SheetSchema {
    email: 0,
    domain: 1,
    keyword: 2,
    page: 3,
};

/// Header of the cursor worksheet / file.
pub(crate) const CURSOR_HEADER: [&str; 2] = ["key", "page"];

impl SheetSchema {
    pub(crate) fn header(&self) -> Vec<String> {
        let mut header = vec![String::new(); self.width()];
        header[self.email] = "email".to_string();
        header[self.domain] = "domain".to_string();
        header[self.keyword] = "keyword".to_string();
        header[self.page] = "page".to_string();
        header
    }

    pub(crate) fn width(&self) -> usize {
        [self.email, self.domain, self.keyword, self.page]
            .iter()
            .max()
            .map(|m| m + 1)
            .unwrap_or(0)
    }

    /// Compares a header row against the layout cell by cell, ignoring case and
    /// surrounding whitespace. Only trailing empty cells are tolerated.
    pub(crate) fn validate_header(&self, found: &[String]) -> Result<()> {
        let expected = self.header();
        let mut normalized: Vec<String> = found.iter().map(|c| c.trim().to_lowercase()).collect();
        while normalized.last().is_some_and(|c| c.is_empty()) {
            normalized.pop();
        }
        if normalized != expected {
            return Err(AppError::Schema {
                expected,
                found: found.to_vec(),
            });
        }
        Ok(())
    }

    pub(crate) fn to_record(&self, row: &LeadRow) -> Vec<String> {
        let mut record = vec![String::new(); self.width()];
        record[self.email] = row.email.clone();
        record[self.domain] = row.domain.clone();
        record[self.keyword] = row.keyword.clone();
        record[self.page] = row.page.to_string();
        record
    }

    /// Reads one data row. Short rows are padded; an unparsable page is 0.
    /// Rows with neither an email nor a domain are ignored.
    pub(crate) fn from_record<S: AsRef<str>>(&self, cells: &[S]) -> Option<LeadRow> {
        let cell = |i: usize| cells.get(i).map(|c| c.as_ref().trim()).unwrap_or("");
        let email = cell(self.email).to_lowercase();
        let domain = cell(self.domain).to_lowercase();
        if email.is_empty() && domain.is_empty() {
            return None;
        }
        Some(LeadRow {
            email,
            domain,
            keyword: cell(self.keyword).to_string(),
            page: cell(self.page).parse().unwrap_or(0),
        })
    }
}

/// Seen-email set derived from stored rows. Domain markers carry no email.
pub(crate) fn emails_of(rows: &[LeadRow]) -> HashSet<String> {
    rows.iter()
        .filter(|r| !r.is_domain_marker())
        .map(|r| r.email.clone())
        .collect()
}

/// Seen-domain set derived from stored rows.
pub(crate) fn domains_of(rows: &[LeadRow]) -> HashSet<String> {
    rows.iter()
        .filter(|r| !r.domain.is_empty())
        .map(|r| r.domain.clone())
        .collect()
}

/// Persistence operations the collector relies on. One writer per run is assumed.
#[async_trait]
pub(crate) trait LeadStore: Send + Sync {
    /// All stored lead rows, in worksheet order.
    async fn rows(&self) -> Result<Vec<LeadRow>>;

    async fn existing_emails(&self) -> Result<HashSet<String>> {
        Ok(emails_of(&self.rows().await?))
    }

    async fn existing_domains(&self) -> Result<HashSet<String>> {
        Ok(domains_of(&self.rows().await?))
    }

    /// Appends one row at the end of the worksheet.
    async fn append(&mut self, row: &LeadRow) -> Result<()>;

    async fn read_cursor(&self, key: &str) -> Result<Option<u32>>;

    /// Overwrites the cursor cell for `key`.
    async fn write_cursor(&mut self, key: &str, page: u32) -> Result<()>;
}

/// In-memory store used by tests across modules.
#[cfg(test)]
#[derive(Debug, Default, Clone)]
pub(crate) struct MemoryStore {
    pub rows: Vec<LeadRow>,
    pub cursors: std::collections::HashMap<String, u32>,
}

#[cfg(test)]
#[async_trait]
impl LeadStore for MemoryStore {
    async fn rows(&self) -> Result<Vec<LeadRow>> {
        Ok(self.rows.clone())
    }

    async fn append(&mut self, row: &LeadRow) -> Result<()> {
        self.rows.push(row.clone());
        Ok(())
    }

    async fn read_cursor(&self, key: &str) -> Result<Option<u32>> {
        Ok(self.cursors.get(key).copied())
    }

    async fn write_cursor(&mut self, key: &str, page: u32) -> Result<()> {
        self.cursors.insert(key.to_string(), page);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cells(values: &[&str]) -> Vec<String> {
        values.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_header_matches_canonical_layout() {
        assert_eq!(LEAD_SCHEMA.header(), cells(&["email", "domain", "keyword", "page"]));
        assert!(LEAD_SCHEMA
            .validate_header(&cells(&[" Email", "DOMAIN", "keyword", "page "]))
            .is_ok());
    }

    #[test]
    fn test_mismatched_header_is_rejected() {
        let err = LEAD_SCHEMA
            .validate_header(&cells(&["email", "keyword", "page", "domain"]))
            .unwrap_err();
        assert!(matches!(err, AppError::Schema { .. }));
    }

    #[test]
    fn test_header_gaps_are_rejected_but_trailing_blanks_pass() {
        let err = LEAD_SCHEMA
            .validate_header(&cells(&["email", "", "domain", "keyword", "page"]))
            .unwrap_err();
        assert!(matches!(err, AppError::Schema { .. }));
        assert!(LEAD_SCHEMA
            .validate_header(&cells(&["email", "domain", "keyword", "page", "", " "]))
            .is_ok());
    }

    #[test]
    fn test_record_layout() {
        let row = LeadRow {
            email: "sales@acme.test".to_string(),
            domain: "acme.test".to_string(),
            keyword: "RPA automation company".to_string(),
            page: 1,
        };
        assert_eq!(
            LEAD_SCHEMA.to_record(&row),
            cells(&["sales@acme.test", "acme.test", "RPA automation company", "1"])
        );
        assert_eq!(LEAD_SCHEMA.from_record(&LEAD_SCHEMA.to_record(&row)), Some(row));
    }

    #[test]
    fn test_from_record_tolerates_bad_cells() {
        let row = LEAD_SCHEMA
            .from_record(&cells(&["Sales@Acme.test", "acme.test", "kw", "n/a"]))
            .unwrap();
        assert_eq!(row.email, "sales@acme.test");
        assert_eq!(row.page, 0);

        let short = LEAD_SCHEMA.from_record(&cells(&["a@b.io"])).unwrap();
        assert_eq!(short.page, 0);
        assert_eq!(short.keyword, "");

        assert!(LEAD_SCHEMA.from_record(&cells(&["", "", "kw", "3"])).is_none());
    }

    #[tokio::test]
    async fn test_seen_sets_skip_domain_markers() {
        let store = MemoryStore {
            rows: vec![
                LeadRow {
                    email: "sales@acme.test".to_string(),
                    domain: "acme.test".to_string(),
                    keyword: "kw".to_string(),
                    page: 1,
                },
                LeadRow::domain_marker("empty.test", "kw", 1),
            ],
            ..Default::default()
        };
        let emails = store.existing_emails().await.unwrap();
        let domains = store.existing_domains().await.unwrap();
        assert_eq!(emails.len(), 1);
        assert!(domains.contains("acme.test"));
        assert!(domains.contains("empty.test"));
    }
}
