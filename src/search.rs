//! Client for the paginated keyword search API.

use crate::config::Config;
use crate::error::{AppError, Result};
use crate::models::SearchResult;
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;

/// A source of search result pages.
#[async_trait]
pub(crate) trait SearchClient {
    /// Returns the organic results of `query` on 1-based result page `page`.
    async fn search(&self, query: &str, page: u32) -> Result<Vec<SearchResult>>;
}

/// Shape of a SerpApi-style response. Only the parts we consume.
#[derive(Deserialize, Debug)]
struct SearchResponse {
    #[serde(default)]
    organic_results: Option<Vec<SearchResult>>,
    #[serde(default)]
    error: Option<String>,
}

/// Searches through a SerpApi-compatible HTTP endpoint.
#[derive(Debug, Clone)]
pub(crate) struct SerpApiClient {
    http_client: Client,
    endpoint: String,
    engine: String,
    api_key: String,
    page_size: u32,
}

impl SerpApiClient {
    /// Builds the client; fails when no API key is configured.
    pub(crate) fn new(http_client: Client, config: &Config) -> Result<Self> {
        let api_key = config.require_search_api_key()?.to_string();
        Ok(Self {
            http_client,
            endpoint: config.search_endpoint.clone(),
            engine: config.search_engine.clone(),
            api_key,
            page_size: config.page_size,
        })
    }

    /// Offset of the first result on `page`.
    fn offset(&self, page: u32) -> u32 {
        page.saturating_sub(1).saturating_mul(self.page_size)
    }
}

#[async_trait]
impl SearchClient for SerpApiClient {
    async fn search(&self, query: &str, page: u32) -> Result<Vec<SearchResult>> {
        let start = self.offset(page);
        tracing::debug!(target: "search", "Searching '{}' page {} (start={})", query, page, start);

        let start_param = start.to_string();
        let num_param = self.page_size.to_string();
        let response = self
            .http_client
            .get(&self.endpoint)
            .query(&[
                ("engine", self.engine.as_str()),
                ("q", query),
                ("start", start_param.as_str()),
                ("num", num_param.as_str()),
                ("api_key", self.api_key.as_str()),
            ])
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            return Err(AppError::SearchResponse(format!(
                "HTTP {} for query '{}': {}",
                status,
                query,
                body.chars().take(200).collect::<String>()
            )));
        }

        parse_search_response(&body)
    }
}

/// Turns a response body into results.
/// A missing result list is an empty page; an `error` field or non-JSON body is fatal,
/// except for the provider's "no results" notice.
fn parse_search_response(body: &str) -> Result<Vec<SearchResult>> {
    let parsed: SearchResponse = serde_json::from_str(body)
        .map_err(|e| AppError::SearchResponse(format!("Unparseable body: {}", e)))?;

    if let Some(error) = parsed.error {
        if error.contains("hasn't returned any results") {
            return Ok(Vec::new());
        }
        return Err(AppError::SearchResponse(error));
    }

    Ok(parsed.organic_results.unwrap_or_default())
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Matcher;

    fn client_for(endpoint: String) -> SerpApiClient {
        let config = Config {
            search_endpoint: endpoint,
            search_api_key: Some("test-key".to_string()),
            ..Config::default()
        };
        SerpApiClient::new(Client::new(), &config).unwrap()
    }

    #[test]
    fn test_parse_fills_missing_fields() {
        let results = parse_search_response(
            r#"{"organic_results":[{"link":"https://acme.test","title":"Acme"},{"snippet":"x"}]}"#,
        )
        .unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].snippet, "");
        assert_eq!(results[1].link, "");
    }

    #[test]
    fn test_parse_without_results_is_empty_page() {
        assert!(parse_search_response(r#"{"search_metadata":{}}"#).unwrap().is_empty());
        assert!(
            parse_search_response(r#"{"error":"Google hasn't returned any results for this query."}"#)
                .unwrap()
                .is_empty()
        );
    }

    #[test]
    fn test_parse_rejects_malformed_bodies() {
        assert!(matches!(
            parse_search_response(r#"{"error":"Invalid API key."}"#),
            Err(AppError::SearchResponse(_))
        ));
        assert!(matches!(
            parse_search_response("<html>oops</html>"),
            Err(AppError::SearchResponse(_))
        ));
        assert!(matches!(
            parse_search_response(r#"{"organic_results":"nope"}"#),
            Err(AppError::SearchResponse(_))
        ));
    }

    #[test]
    fn test_offset_saturates_on_huge_pages() {
        let client = client_for("http://localhost".to_string());
        assert_eq!(client.offset(0), 0);
        assert_eq!(client.offset(1), 0);
        assert_eq!(client.offset(3), 20);
        assert_eq!(client.offset(u32::MAX), u32::MAX);
    }

    #[test]
    fn test_missing_api_key_fails_construction() {
        let config = Config::default();
        assert!(matches!(
            SerpApiClient::new(Client::new(), &config),
            Err(AppError::MissingCredential(_))
        ));
    }

    #[tokio::test]
    async fn test_search_sends_offset_and_key() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/search")
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded("q".into(), "RPA automation company".into()),
                Matcher::UrlEncoded("start".into(), "20".into()),
                Matcher::UrlEncoded("num".into(), "10".into()),
                Matcher::UrlEncoded("api_key".into(), "test-key".into()),
                Matcher::UrlEncoded("engine".into(), "google".into()),
            ]))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"organic_results":[{"link":"https://acme.test","title":"Acme","snippet":"RPA"}]}"#)
            .create_async()
            .await;

        let client = client_for(format!("{}/search", server.url()));
        let results = client.search("RPA automation company", 3).await.unwrap();

        mock.assert_async().await;
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].link, "https://acme.test");
    }

    #[tokio::test]
    async fn test_search_http_error_is_fatal() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/search")
            .match_query(Matcher::Any)
            .with_status(401)
            .with_body(r#"{"error":"Invalid API key."}"#)
            .create_async()
            .await;

        let client = client_for(format!("{}/search", server.url()));
        let err = client.search("anything", 1).await.unwrap_err();
        assert!(matches!(err, AppError::SearchResponse(_)));
    }
}
