//! Web-search adapter.
//!
//! Client for a SerpAPI-style endpoint plus the fan-out helper that runs
//! many queries concurrently. Result order is stable: queries keep their
//! input order and each query's results keep the provider's ranking.
//! Duplicates across queries are kept; the judge weighs them.

use std::time::{Duration, Instant};

use futures::future::join_all;
use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::config::SearchConfig;
use crate::error::{SearchApiResult, SearchError};

/// One organic web-search result
#[derive(Debug, Clone, PartialEq)]
pub struct SearchResult {
    pub url: String,
    pub title: Option<String>,
    pub excerpt: Option<String>,
    pub pub_date: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    organic_results: Vec<OrganicResult>,
}

#[derive(Debug, Deserialize)]
struct OrganicResult {
    link: String,
    title: Option<String>,
    snippet: Option<String>,
    date: Option<String>,
}

impl From<OrganicResult> for SearchResult {
    fn from(raw: OrganicResult) -> Self {
        Self {
            url: raw.link,
            title: raw.title,
            excerpt: raw.snippet,
            pub_date: raw.date,
        }
    }
}

/// Client for the web-search endpoint
#[derive(Clone)]
pub struct SearchClient {
    client: Client,
    base_url: String,
    api_key: String,
    timeout_ms: u64,
}

impl SearchClient {
    /// Create a new search client
    pub fn new(config: &SearchConfig) -> SearchApiResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()
            .map_err(SearchError::Http)?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            timeout_ms: config.timeout_ms,
        })
    }

    /// Run one search query, asking for at most `num` results.
    ///
    /// A response without `organic_results` is an empty result list, not
    /// an error.
    pub async fn search(&self, query: &str, num: u8) -> SearchApiResult<Vec<SearchResult>> {
        let url = format!("{}/search", self.base_url);

        debug!(query = %query, num = num, "Calling search endpoint");
        let start = Instant::now();

        let response = self
            .client
            .get(&url)
            .query(&[
                ("q", query),
                ("num", &num.to_string()),
                ("engine", "google"),
                ("api_key", &self.api_key),
            ])
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    SearchError::Timeout {
                        timeout_ms: self.timeout_ms,
                    }
                } else {
                    SearchError::Http(e)
                }
            })?;

        let status = response.status();

        if !status.is_success() {
            let error_body = response.text().await.unwrap_or_default();
            return Err(SearchError::Api {
                status: status.as_u16(),
                message: error_body,
            });
        }

        let parsed: SearchResponse =
            response.json().await.map_err(|e| SearchError::InvalidResponse {
                message: format!("Failed to parse response: {}", e),
            })?;

        let results: Vec<SearchResult> =
            parsed.organic_results.into_iter().map(Into::into).collect();

        if results.is_empty() {
            warn!(query = %query, "Search returned no organic results");
        }

        info!(
            query = %query,
            results = results.len(),
            latency_ms = start.elapsed().as_millis() as u64,
            "Search call succeeded"
        );

        Ok(results)
    }

    /// Run all queries concurrently and concatenate their results.
    ///
    /// The combined list preserves query order and per-query ranking.
    /// Empty per-query results are tolerated; any per-query error fails
    /// the whole fan-out.
    pub async fn fan_out(
        &self,
        queries: &[String],
        per_query: u8,
    ) -> SearchApiResult<Vec<SearchResult>> {
        let calls = queries.iter().map(|q| self.search(q, per_query));
        let outcomes = join_all(calls).await;

        let mut combined = Vec::new();
        for outcome in outcomes {
            combined.extend(outcome?);
        }

        Ok(combined)
    }

    /// Get the base URL (for testing)
    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}
