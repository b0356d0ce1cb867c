//! Lead worksheet kept as a CSV file on local disk.

use super::{LEAD_SCHEMA, LeadStore};
use crate::error::Result;
use crate::models::LeadRow;
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::fs::{self, OpenOptions};
use std::path::{Path, PathBuf};

/// Leads in `<name>.csv`, cursors in `<name>.cursors.json` next to it.
#[derive(Debug)]
pub(crate) struct CsvSheetStore {
    path: PathBuf,
    cursor_path: PathBuf,
    rows: Vec<LeadRow>,
    cursors: BTreeMap<String, u32>,
}

impl CsvSheetStore {
    /// Opens (or creates) the worksheet and validates its header.
    pub(crate) fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let cursor_path = path.with_extension("cursors.json");

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let is_empty = fs::metadata(&path).map(|m| m.len() == 0).unwrap_or(true);
        if is_empty {
            tracing::info!(target: "store", "Creating worksheet {}", path.display());
            let mut writer = csv::Writer::from_path(&path)?;
            writer.write_record(LEAD_SCHEMA.header())?;
            writer.flush()?;
        }

        let rows = Self::read_rows(&path)?;

        let cursors = if cursor_path.exists() {
            let content = fs::read_to_string(&cursor_path)?;
            serde_json::from_str(&content)?
        } else {
            BTreeMap::new()
        };

        tracing::info!(
            target: "store",
            "Opened {} ({} rows, {} cursors)",
            path.display(),
            rows.len(),
            cursors.len()
        );

        Ok(Self {
            path,
            cursor_path,
            rows,
            cursors,
        })
    }

    fn read_rows(path: &Path) -> Result<Vec<LeadRow>> {
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .from_path(path)?;

        let header: Vec<String> = reader.headers()?.iter().map(|h| h.to_string()).collect();
        LEAD_SCHEMA.validate_header(&header)?;

        let mut rows = Vec::new();
        for record in reader.records() {
            let record = record?;
            let cells: Vec<&str> = record.iter().collect();
            if let Some(row) = LEAD_SCHEMA.from_record(&cells) {
                rows.push(row);
            }
        }
        Ok(rows)
    }

    fn save_cursors(&self) -> Result<()> {
        let content = serde_json::to_string_pretty(&self.cursors)?;
        fs::write(&self.cursor_path, content)?;
        Ok(())
    }
}

#[async_trait]
impl LeadStore for CsvSheetStore {
    async fn rows(&self) -> Result<Vec<LeadRow>> {
        Ok(self.rows.clone())
    }

    async fn append(&mut self, row: &LeadRow) -> Result<()> {
        let file = OpenOptions::new().append(true).open(&self.path)?;
        let mut writer = csv::WriterBuilder::new()
            .has_headers(false)
            .from_writer(file);
        writer.write_record(LEAD_SCHEMA.to_record(row))?;
        writer.flush()?;
        self.rows.push(row.clone());
        Ok(())
    }

    async fn read_cursor(&self, key: &str) -> Result<Option<u32>> {
        Ok(self.cursors.get(key).copied())
    }

    async fn write_cursor(&mut self, key: &str, page: u32) -> Result<()> {
        self.cursors.insert(key.to_string(), page);
        self.save_cursors()
    }
}
