//! DuckDuckGo search provider (HTML scraping, no API key required)

use std::sync::OnceLock;
use std::time::Duration;

use reqwest::Client;
use scraper::{Html, Selector};
use tracing::{debug, warn};

use super::{dedup_by_url, SearchResult, SearchService};
use crate::error::{Error, Result};

/// Endpoint serving the HTML results page
const HTML_ENDPOINT: &str = "https://html.duckduckgo.com/html/";

/// Default timeout for search requests
const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Pause between query variations
const INTER_QUERY_DELAY: Duration = Duration::from_secs(1);

/// Topic-broadening suffixes appended to the raw query
const QUERY_SUFFIXES: [&str; 4] = ["overview", "explained", "guide", "tutorial"];

/// Maximum number of query variations issued per search
const MAX_VARIATIONS: usize = 5;

fn result_selector() -> &'static Selector {
    static SEL: OnceLock<Selector> = OnceLock::new();
    SEL.get_or_init(|| Selector::parse("div.result").expect("valid selector"))
}

fn link_selector() -> &'static Selector {
    static SEL: OnceLock<Selector> = OnceLock::new();
    SEL.get_or_init(|| Selector::parse("a.result__a").expect("valid selector"))
}

fn snippet_selector() -> &'static Selector {
    static SEL: OnceLock<Selector> = OnceLock::new();
    SEL.get_or_init(|| Selector::parse("a.result__snippet, .result__snippet").expect("valid selector"))
}

/// DuckDuckGo search provider.
///
/// Issues the raw query plus a small set of topic-broadening variations
/// sequentially, scrapes anchor+snippet pairs from the results page, and
/// unions everything deduplicated by URL. Errors on individual variations
/// are logged and swallowed.
pub struct DuckDuckGoProvider {
    client: Client,
}

impl Default for DuckDuckGoProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl DuckDuckGoProvider {
    /// Create a new provider with the default timeout.
    pub fn new() -> Self {
        Self::with_timeout(DEFAULT_TIMEOUT_SECS)
    }

    /// Create a provider with a custom request timeout.
    pub fn with_timeout(timeout_secs: u64) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .user_agent(crate::extract::DESKTOP_USER_AGENT)
            .build()
            .expect("Failed to create HTTP client");
        Self { client }
    }

    /// Fetch and parse the results page for one query variation.
    async fn search_variation(&self, query: &str) -> Result<Vec<SearchResult>> {
        let response = self
            .client
            .get(HTML_ENDPOINT)
            .query(&[("q", query)])
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(Error::InvalidResponse(format!(
                "DuckDuckGo returned status {}",
                response.status()
            )));
        }

        let html = response.text().await?;
        Ok(parse_results_page(&html))
    }
}

#[async_trait::async_trait]
impl SearchService for DuckDuckGoProvider {
    async fn search(&self, query: &str) -> Result<Vec<SearchResult>> {
        let query = query.trim();
        if query.is_empty() {
            return Err(Error::InvalidQuery("empty query".into()));
        }

        let mut all = Vec::new();
        for (i, variation) in query_variations(query).into_iter().enumerate() {
            if i > 0 {
                tokio::time::sleep(INTER_QUERY_DELAY).await;
            }
            match self.search_variation(&variation).await {
                Ok(results) => {
                    debug!("DuckDuckGo variation '{}' returned {} results", variation, results.len());
                    all.extend(results);
                }
                Err(e) => {
                    warn!("DuckDuckGo variation '{}' failed: {}", variation, e);
                }
            }
        }

        let unique = dedup_by_url(all);
        if unique.is_empty() {
            return Err(Error::NoResultsFound(query.to_string()));
        }
        Ok(unique)
    }
}

/// The raw query plus topic-broadening variations, capped at [`MAX_VARIATIONS`].
fn query_variations(query: &str) -> Vec<String> {
    std::iter::once(query.to_string())
        .chain(QUERY_SUFFIXES.iter().map(|s| format!("{} {}", query, s)))
        .take(MAX_VARIATIONS)
        .collect()
}

/// Extract anchor+snippet pairs from a results page.
fn parse_results_page(html: &str) -> Vec<SearchResult> {
    let document = Html::parse_document(html);
    let mut results = Vec::new();

    for block in document.select(result_selector()) {
        let Some(link) = block.select(link_selector()).next() else {
            continue;
        };
        let Some(href) = link.value().attr("href") else {
            continue;
        };
        let title = link.text().collect::<String>().trim().to_string();
        if href.is_empty() || title.is_empty() {
            continue;
        }
        let snippet = block
            .select(snippet_selector())
            .next()
            .map(|s| s.text().collect::<String>().trim().to_string())
            .unwrap_or_default();
        results.push(SearchResult::new(title, href, snippet));
    }

    results
}
