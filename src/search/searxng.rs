//! SearxNG JSON API client.

use super::{SearchBackend, SearchResult};
use crate::error::{Result, ScoutError};
use crate::http::create_client;
use async_trait::async_trait;
use reqwest::header::ACCEPT;
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, info, instrument};
use url::Url;

/// Search backend speaking the SearxNG `format=json` API.
pub struct SearxngClient {
    client: reqwest::Client,
    endpoint: Url,
}

impl SearxngClient {
    /// Create a client for `endpoint`, e.g. `http://localhost:5003/search`.
    pub fn new(endpoint: &str, timeout: Duration) -> Result<Self> {
        let endpoint = Url::parse(endpoint).map_err(|e| {
            ScoutError::Config(format!("Invalid search endpoint '{}': {}", endpoint, e))
        })?;
        Ok(Self {
            client: create_client(timeout)?,
            endpoint,
        })
    }

    fn query_url(&self, query: &str) -> Url {
        let mut url = self.endpoint.clone();
        url.query_pairs_mut()
            .append_pair("q", query)
            .append_pair("format", "json");
        url
    }
}

#[async_trait]
impl SearchBackend for SearxngClient {
    #[instrument(skip(self))]
    async fn try_search(&self, query: &str, max_results: usize) -> Result<Vec<SearchResult>> {
        debug!("Searching {}", self.endpoint);

        let response = self
            .client
            .get(self.query_url(query))
            .header(ACCEPT, "application/json")
            .send()
            .await
            .map_err(|e| ScoutError::from_transport("Search request", e))?
            .error_for_status()
            .map_err(|e| ScoutError::from_transport("Search request", e))?;

        let body = response
            .text()
            .await
            .map_err(|e| ScoutError::from_transport("Search response", e))?;

        let results = parse_results(&body, max_results)?;
        info!("Retrieved {} search results", results.len());
        Ok(results)
    }
}

/// Normalize a SearxNG response body.
///
/// The first `max_results` upstream entries are considered, in order, and
/// entries lacking a url, title or content are dropped.
fn parse_results(body: &str, max_results: usize) -> Result<Vec<SearchResult>> {
    let data: Value = serde_json::from_str(body)
        .map_err(|e| ScoutError::UpstreamProtocol(format!("search response is not JSON: {e}")))?;

    let Some(raw) = data.get("results") else {
        return Ok(Vec::new());
    };
    let raw = raw
        .as_array()
        .ok_or_else(|| ScoutError::UpstreamProtocol("\"results\" is not an array".to_string()))?;

    Ok(raw
        .iter()
        .take(max_results)
        .filter_map(SearchResult::from_raw)
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::search::MAX_CONTENT_CHARS;
    use crate::testing::serve;
    use axum::{extract::Query, routing::get, Json, Router};
    use serde_json::json;
    use std::collections::HashMap;

    fn hit(n: usize) -> Value {
        json!({"title": format!("Result {n}"), "url": format!("https://example.com/{n}"), "content": "x"})
    }

    #[test]
    fn test_parse_results_caps_before_filtering() {
        let body = json!({"results": [hit(1), {"title": "no url", "content": "c"}, hit(3), hit(4)]});
        let results = parse_results(&body.to_string(), 3).unwrap();

        let urls: Vec<&str> = results.iter().map(|r| r.url.as_str()).collect();
        assert_eq!(urls, vec!["https://example.com/1", "https://example.com/3"]);
    }

    #[test]
    fn test_parse_results_bad_shapes() {
        assert!(parse_results("{}", 5).unwrap().is_empty());
        assert!(matches!(
            parse_results("<html>", 5),
            Err(ScoutError::UpstreamProtocol(_))
        ));
        assert!(matches!(
            parse_results(r#"{"results": "none"}"#, 5),
            Err(ScoutError::UpstreamProtocol(_))
        ));
    }

    #[test]
    fn test_invalid_endpoint() {
        assert!(matches!(
            SearxngClient::new("not a url", Duration::from_secs(1)),
            Err(ScoutError::Config(_))
        ));
    }

    #[tokio::test]
    async fn test_search_against_server() {
        let router = Router::new().route(
            "/search",
            get(|Query(params): Query<HashMap<String, String>>| async move {
                let long = "y".repeat(MAX_CONTENT_CHARS + 50);
                Json(json!({"results": [
                    {
                        "title": params.get("q").cloned().unwrap_or_default(),
                        "url": "https://example.com/a",
                        "content": long,
                        "publishedDate": params.get("format").cloned().unwrap_or_default()
                    },
                    hit(2),
                    hit(3)
                ]}))
            }),
        );
        let base = serve(router).await;
        let client = SearxngClient::new(&format!("{base}/search"), Duration::from_secs(5)).unwrap();

        let results = client.search("NVDA stock & price", 2).await;

        assert_eq!(results.len(), 2);
        assert_eq!(results[0].title, "NVDA stock & price");
        assert_eq!(results[0].published, "json");
        assert_eq!(results[0].content.chars().count(), MAX_CONTENT_CHARS + 3);
    }

    #[tokio::test]
    async fn test_unreachable_backend_degrades_to_empty() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let client =
            SearxngClient::new(&format!("http://{addr}/search"), Duration::from_secs(2)).unwrap();

        assert!(matches!(
            client.try_search("q", 5).await,
            Err(ScoutError::UpstreamUnavailable(_))
        ));
        assert!(client.search("q", 5).await.is_empty());
    }
}
