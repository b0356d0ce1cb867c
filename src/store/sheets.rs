//! Lead worksheet hosted in Google Sheets, accessed through the v4 values API.

use super::{CURSOR_HEADER, LEAD_SCHEMA, LeadStore};
use crate::config::StoreConfig;
use crate::error::{AppError, Result};
use crate::models::LeadRow;
use async_trait::async_trait;
use reqwest::{Client, Method};
use serde::Deserialize;
use serde_json::{Value, json};
use std::collections::HashMap;
use url::Url;

#[derive(Deserialize, Debug, Default)]
struct ValueRange {
    #[serde(default)]
    values: Vec<Vec<Value>>,
}

fn cell_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

/// A1 range on a named worksheet, quoted so names with spaces work.
fn a1_range(sheet: &str, cells: &str) -> String {
    format!("'{}'!{}", sheet.replace('\'', "''"), cells)
}

/// Store backed by two worksheets of one spreadsheet: leads and cursors.
#[derive(Debug)]
pub(crate) struct GoogleSheetsStore {
    http_client: Client,
    endpoint: String,
    spreadsheet_id: String,
    access_token: String,
    sheet_name: String,
    cursor_sheet_name: String,
    rows: Vec<LeadRow>,
    /// key -> (1-based sheet row, page)
    cursors: HashMap<String, (usize, u32)>,
    /// Rows used on the cursor worksheet, header included.
    cursor_rows: usize,
}

impl GoogleSheetsStore {
    /// Connects, validates the lead header (writing it on an empty sheet) and loads
    /// rows and cursors.
    pub(crate) async fn open(http_client: Client, config: &StoreConfig) -> Result<Self> {
        let spreadsheet_id = config
            .spreadsheet_id
            .clone()
            .filter(|s| !s.trim().is_empty())
            .ok_or_else(|| {
                AppError::MissingCredential(
                    "spreadsheet id (set LEAD_SWEEP_SPREADSHEET_ID or [store].spreadsheet_id)"
                        .to_string(),
                )
            })?;
        let access_token = config
            .access_token
            .clone()
            .filter(|s| !s.trim().is_empty())
            .ok_or_else(|| {
                AppError::MissingCredential(
                    "sheets access token (set LEAD_SWEEP_SHEETS_TOKEN or [store].access_token)"
                        .to_string(),
                )
            })?;

        let mut store = Self {
            http_client,
            endpoint: config.endpoint.trim_end_matches('/').to_string(),
            spreadsheet_id,
            access_token,
            sheet_name: config.sheet_name.clone(),
            cursor_sheet_name: config.cursor_sheet_name.clone(),
            rows: Vec::new(),
            cursors: HashMap::new(),
            cursor_rows: 0,
        };
        store.load_leads().await?;
        store.load_cursors().await?;

        tracing::info!(
            target: "store",
            "Opened spreadsheet {} ({} rows, {} cursors)",
            store.spreadsheet_id,
            store.rows.len(),
            store.cursors.len()
        );
        Ok(store)
    }

    fn values_url(&self, range: &str, suffix: &str) -> Result<Url> {
        let mut url = Url::parse(&self.endpoint)?;
        url.path_segments_mut()
            .map_err(|_| AppError::Config(format!("Invalid sheets endpoint: {}", self.endpoint)))?
            .push(&self.spreadsheet_id)
            .push("values")
            .push(&format!("{}{}", range, suffix));
        Ok(url)
    }

    async fn call(
        &self,
        method: Method,
        range: &str,
        suffix: &str,
        query: &[(&str, &str)],
        body: Option<Value>,
    ) -> Result<ValueRange> {
        let url = self.values_url(range, suffix)?;
        let mut request = self
            .http_client
            .request(method.clone(), url)
            .bearer_auth(&self.access_token)
            .query(query);
        if let Some(body) = body {
            request = request.json(&body);
        }

        let response = request.send().await?;
        let status = response.status();
        let text = response.text().await?;
        if !status.is_success() {
            return Err(AppError::Store(format!(
                "Sheets API {} {} on {}: {}",
                method,
                status,
                range,
                text.chars().take(200).collect::<String>()
            )));
        }

        if method == Method::GET {
            Ok(serde_json::from_str(&text)?)
        } else {
            Ok(ValueRange::default())
        }
    }

    async fn get_values(&self, range: &str) -> Result<Vec<Vec<String>>> {
        let values = self.call(Method::GET, range, "", &[], None).await?;
        Ok(values
            .values
            .iter()
            .map(|row| row.iter().map(cell_text).collect())
            .collect())
    }

    async fn put_values(&self, range: &str, row: Vec<String>) -> Result<()> {
        self.call(
            Method::PUT,
            range,
            "",
            &[("valueInputOption", "RAW")],
            Some(json!({ "values": [row] })),
        )
        .await
        .map(|_| ())
    }

    async fn append_values(&self, range: &str, row: Vec<String>) -> Result<()> {
        self.call(
            Method::POST,
            range,
            ":append",
            &[("valueInputOption", "RAW"), ("insertDataOption", "INSERT_ROWS")],
            Some(json!({ "values": [row] })),
        )
        .await
        .map(|_| ())
    }

    async fn load_leads(&mut self) -> Result<()> {
        let range = a1_range(&self.sheet_name, "A:D");
        let values = self.get_values(&range).await?;
        match values.split_first() {
            None => {
                tracing::info!(target: "store", "Worksheet '{}' is empty, writing header", self.sheet_name);
                self.put_values(&a1_range(&self.sheet_name, "A1:D1"), LEAD_SCHEMA.header())
                    .await?;
                self.rows.clear();
            }
            Some((header, data)) => {
                LEAD_SCHEMA.validate_header(header)?;
                self.rows = data
                    .iter()
                    .filter_map(|cells| LEAD_SCHEMA.from_record(cells))
                    .collect();
            }
        }
        Ok(())
    }

    async fn load_cursors(&mut self) -> Result<()> {
        let range = a1_range(&self.cursor_sheet_name, "A:B");
        let values = self.get_values(&range).await?;
        if values.is_empty() {
            let header = CURSOR_HEADER.iter().map(|s| s.to_string()).collect();
            self.put_values(&a1_range(&self.cursor_sheet_name, "A1:B1"), header)
                .await?;
            self.cursor_rows = 1;
            return Ok(());
        }

        self.cursor_rows = values.len();
        for (i, row) in values.iter().enumerate().skip(1) {
            let key = row.first().map(|k| k.trim()).unwrap_or("");
            if key.is_empty() {
                continue;
            }
            let page = row.get(1).and_then(|p| p.trim().parse().ok()).unwrap_or(0);
            let entry = self.cursors.entry(key.to_string()).or_insert((i + 1, page));
            if page > entry.1 {
                *entry = (i + 1, page);
            }
        }
        Ok(())
    }
}

#[async_trait]
impl LeadStore for GoogleSheetsStore {
    async fn rows(&self) -> Result<Vec<LeadRow>> {
        Ok(self.rows.clone())
    }

    async fn append(&mut self, row: &LeadRow) -> Result<()> {
        let range = a1_range(&self.sheet_name, "A:D");
        self.append_values(&range, LEAD_SCHEMA.to_record(row)).await?;
        self.rows.push(row.clone());
        Ok(())
    }

    async fn read_cursor(&self, key: &str) -> Result<Option<u32>> {
        Ok(self.cursors.get(key).map(|(_, page)| *page))
    }

    async fn write_cursor(&mut self, key: &str, page: u32) -> Result<()> {
        let record = vec![key.to_string(), page.to_string()];
        match self.cursors.get(key).map(|(row, _)| *row) {
            Some(row) => {
                let range = a1_range(&self.cursor_sheet_name, &format!("A{}:B{}", row, row));
                self.put_values(&range, record).await?;
                self.cursors.insert(key.to_string(), (row, page));
            }
            None => {
                let range = a1_range(&self.cursor_sheet_name, "A:B");
                self.append_values(&range, record).await?;
                self.cursor_rows += 1;
                self.cursors.insert(key.to_string(), (self.cursor_rows, page));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Matcher;

    fn store_config(endpoint: String) -> StoreConfig {
        StoreConfig {
            backend: crate::config::StoreBackend::Sheets,
            csv_path: "unused.csv".into(),
            spreadsheet_id: Some("sheet-1".to_string()),
            sheet_name: "Leads".to_string(),
            cursor_sheet_name: "cursors".to_string(),
            access_token: Some("token".to_string()),
            endpoint,
        }
    }

    #[tokio::test]
    async fn test_missing_token_is_fatal() {
        let mut config = store_config("http://127.0.0.1:9".to_string());
        config.access_token = None;
        let err = GoogleSheetsStore::open(Client::new(), &config).await.unwrap_err();
        assert!(matches!(err, AppError::MissingCredential(_)));
    }

    #[test]
    fn test_a1_range_quotes_names() {
        assert_eq!(a1_range("Leads", "A:D"), "'Leads'!A:D");
        assert_eq!(a1_range("Bob's leads", "A1:D1"), "'Bob''s leads'!A1:D1");
    }

    #[tokio::test]
    async fn test_open_reads_rows_and_cursors_then_writes() {
        let mut server = mockito::Server::new_async().await;
        let leads = server
            .mock("GET", Matcher::Regex("/sheet-1/values/.*Leads.*A:D$".to_string()))
            .match_header("authorization", "Bearer token")
            .with_status(200)
            .with_body(
                r#"{"values":[["email","domain","keyword","page"],["sales@acme.test","acme.test","RPA automation company","1"],["","quiet.test","RPA automation company",2]]}"#,
            )
            .create_async()
            .await;
        let cursors = server
            .mock("GET", Matcher::Regex("/sheet-1/values/.*cursors.*A:B$".to_string()))
            .with_status(200)
            .with_body(r#"{"values":[["key","page"],["RPA automation company","2"]]}"#)
            .create_async()
            .await;

        let mut store = GoogleSheetsStore::open(
            Client::new(),
            &store_config(format!("{}/v4/spreadsheets", server.url())),
        )
        .await
        .unwrap();
        leads.assert_async().await;
        cursors.assert_async().await;

        assert_eq!(store.rows().await.unwrap().len(), 2);
        assert_eq!(store.rows().await.unwrap()[1].page, 2);
        assert_eq!(store.existing_emails().await.unwrap().len(), 1);
        assert_eq!(store.read_cursor("RPA automation company").await.unwrap(), Some(2));

        let append = server
            .mock("POST", Matcher::Regex("Leads.*A:D:append$".to_string()))
            .match_query(Matcher::UrlEncoded("valueInputOption".into(), "RAW".into()))
            .match_body(Matcher::Json(serde_json::json!({
                "values": [["info@beta.test", "beta.test", "RPA automation company", "3"]]
            })))
            .with_status(200)
            .with_body("{}")
            .create_async()
            .await;
        store
            .append(&LeadRow {
                email: "info@beta.test".to_string(),
                domain: "beta.test".to_string(),
                keyword: "RPA automation company".to_string(),
                page: 3,
            })
            .await
            .unwrap();
        append.assert_async().await;

        let update = server
            .mock("PUT", Matcher::Regex("cursors.*A2:B2$".to_string()))
            .match_query(Matcher::Any)
            .match_body(Matcher::Json(serde_json::json!({
                "values": [["RPA automation company", "3"]]
            })))
            .with_status(200)
            .with_body("{}")
            .create_async()
            .await;
        store.write_cursor("RPA automation company", 3).await.unwrap();
        update.assert_async().await;
        assert_eq!(store.read_cursor("RPA automation company").await.unwrap(), Some(3));
    }

    #[tokio::test]
    async fn test_empty_sheet_gets_header_and_bad_header_fails() {
        let mut server = mockito::Server::new_async().await;
        let _leads = server
            .mock("GET", Matcher::Regex("Leads.*A:D$".to_string()))
            .with_status(200)
            .with_body(r#"{"range":"Leads!A1:D1000","majorDimension":"ROWS"}"#)
            .create_async()
            .await;
        let header = server
            .mock("PUT", Matcher::Regex("Leads.*A1:D1$".to_string()))
            .match_query(Matcher::Any)
            .match_body(Matcher::Json(serde_json::json!({
                "values": [["email", "domain", "keyword", "page"]]
            })))
            .with_status(200)
            .with_body("{}")
            .create_async()
            .await;
        let _cursors = server
            .mock("GET", Matcher::Regex("cursors.*A:B$".to_string()))
            .with_status(200)
            .with_body(r#"{"values":[["key","page"]]}"#)
            .create_async()
            .await;

        let endpoint = format!("{}/v4/spreadsheets", server.url());
        let store = GoogleSheetsStore::open(Client::new(), &store_config(endpoint.clone()))
            .await
            .unwrap();
        header.assert_async().await;
        assert!(store.rows().await.unwrap().is_empty());

        let mut bad_server = mockito::Server::new_async().await;
        let _bad = bad_server
            .mock("GET", Matcher::Regex("Leads.*A:D$".to_string()))
            .with_status(200)
            .with_body(r#"{"values":[["Email","Keyword","Page"]]}"#)
            .create_async()
            .await;
        let err = GoogleSheetsStore::open(
            Client::new(),
            &store_config(format!("{}/v4/spreadsheets", bad_server.url())),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, AppError::Schema { .. }));
    }

    #[tokio::test]
    async fn test_api_error_surfaces_as_store_error() {
        let mut server = mockito::Server::new_async().await;
        let _leads = server
            .mock("GET", Matcher::Regex("Leads.*A:D$".to_string()))
            .with_status(403)
            .with_body(r#"{"error":{"code":403,"message":"The caller does not have permission"}}"#)
            .create_async()
            .await;
        let err = GoogleSheetsStore::open(
            Client::new(),
            &store_config(format!("{}/v4/spreadsheets", server.url())),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, AppError::Store(_)));
    }
}
