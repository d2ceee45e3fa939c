//! Brave Search provider (JSON API, requires API key)

use std::time::Duration;

use reqwest::Client;
use secrecy::ExposeSecret;
use serde::Deserialize;
use tracing::debug;

use super::{dedup_by_url, SearchResult, SearchService};
use crate::config::BraveConfig;
use crate::error::{Error, Result};
use crate::ratelimit::RateLimiter;

/// Web search endpoint
const ENDPOINT: &str = "https://api.search.brave.com/res/v1/web/search";

/// Results requested per page
const PAGE_SIZE: usize = 10;

/// Maximum pages fetched per query
const MAX_PAGES: usize = 6;

/// Unique results at which pagination stops early
const MAX_RESULTS: usize = 60;

/// Pause between page requests
const INTER_PAGE_DELAY: Duration = Duration::from_millis(500);

/// Requests-per-minute ceiling for the API
const RPM: usize = 60;

/// Brave Search API response structures
#[derive(Debug, Deserialize)]
struct BraveSearchResponse {
    web: Option<BraveWebResults>,
}

#[derive(Debug, Deserialize)]
struct BraveWebResults {
    results: Vec<BraveWebResult>,
}

#[derive(Debug, Deserialize)]
struct BraveWebResult {
    title: String,
    url: String,
    #[serde(default)]
    description: String,
}

/// Paginated Brave Search provider behind a 60 rpm rate limiter.
pub struct BraveSearchProvider {
    client: Client,
    config: BraveConfig,
    limiter: RateLimiter,
}

impl BraveSearchProvider {
    /// Create a new provider.
    pub fn new(config: BraveConfig) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .expect("Failed to create HTTP client");
        Self {
            client,
            config,
            limiter: RateLimiter::new(RPM),
        }
    }

    /// Create from environment variables, if `BRAVE_API_KEY` is set.
    pub fn from_env() -> Option<Self> {
        BraveConfig::from_env().map(Self::new)
    }

    async fn fetch_page(&self, query: &str, page: usize) -> Result<Vec<SearchResult>> {
        self.limiter.wait_for_slot().await;

        let response = self
            .client
            .get(ENDPOINT)
            .query(&[
                ("q", query),
                ("count", &PAGE_SIZE.to_string()),
                ("offset", &page.to_string()),
            ])
            .header("Accept", "application/json")
            .header("X-Subscription-Token", self.config.api_key.expose_secret())
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(Error::InvalidResponse(format!(
                "Brave Search returned status {}",
                response.status()
            )));
        }

        let body: BraveSearchResponse = response.json().await?;
        Ok(body
            .web
            .map(|w| {
                w.results
                    .into_iter()
                    .map(|r| SearchResult::new(r.title, r.url, r.description))
                    .collect()
            })
            .unwrap_or_default())
    }
}

#[async_trait::async_trait]
impl SearchService for BraveSearchProvider {
    async fn search(&self, query: &str) -> Result<Vec<SearchResult>> {
        let query = query.trim();
        if query.is_empty() {
            return Err(Error::InvalidQuery("empty query".into()));
        }

        let mut unique: Vec<SearchResult> = Vec::new();
        for page in 0..MAX_PAGES {
            if page > 0 {
                tokio::time::sleep(INTER_PAGE_DELAY).await;
            }
            let page_results = self.fetch_page(query, page).await?;
            if page_results.is_empty() {
                break;
            }
            unique = dedup_by_url(unique.into_iter().chain(page_results).collect());
            debug!("Brave page {} brought total to {} unique results", page, unique.len());
            if unique.len() >= MAX_RESULTS {
                unique.truncate(MAX_RESULTS);
                break;
            }
        }

        if unique.is_empty() {
            return Err(Error::NoResultsFound(query.to_string()));
        }
        Ok(unique)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn response_deserializes() {
        let json = r#"{
            "web": {
                "results": [
                    {"title": "Rust", "url": "https://rust-lang.org", "description": "A language"},
                    {"title": "NoDesc", "url": "https://example.com"}
                ]
            }
        }"#;
        let parsed: BraveSearchResponse = serde_json::from_str(json).unwrap();
        let results = parsed.web.unwrap().results;
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].title, "Rust");
        assert_eq!(results[1].description, "");
    }

    #[test]
    fn response_without_web_section() {
        let parsed: BraveSearchResponse = serde_json::from_str("{}").unwrap();
        assert!(parsed.web.is_none());
    }
}
