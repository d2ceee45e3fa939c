//! Web search providers
//!
//! Interchangeable adapters that turn a query string into an ordered list of
//! [`SearchResult`]s:
//! - DuckDuckGo (HTML scraping, no API key required)
//! - Brave Search (JSON API, requires API key)
//! - Composite (fans out to all configured providers and unions results)

mod brave;
mod composite;
mod duckduckgo;

pub use brave::BraveSearchProvider;
pub use composite::CompositeSearchProvider;
pub use duckduckgo::DuckDuckGoProvider;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// A single search result from any provider.
///
/// Two results are equal iff their URLs are equal; titles and snippets are
/// presentation only.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResult {
    /// Title of the page
    pub title: String,
    /// Absolute URL of the page
    pub url: String,
    /// Snippet or description
    pub snippet: String,
}

impl SearchResult {
    /// Create a result, normalizing protocol-relative URLs to https.
    pub fn new(title: impl Into<String>, url: impl Into<String>, snippet: impl Into<String>) -> Self {
        let url: String = url.into();
        let url = if url.starts_with("//") {
            format!("https:{}", url)
        } else {
            url
        };
        Self {
            title: title.into(),
            url,
            snippet: snippet.into(),
        }
    }
}

impl PartialEq for SearchResult {
    fn eq(&self, other: &Self) -> bool {
        self.url == other.url
    }
}

impl Eq for SearchResult {}

impl std::hash::Hash for SearchResult {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.url.hash(state);
    }
}

/// A search backend.
#[async_trait]
pub trait SearchService: Send + Sync {
    /// Run a query and return results in provider order.
    ///
    /// Fails with `InvalidQuery` for empty queries, `InvalidResponse` for
    /// unusable upstream replies, and `NoResultsFound` when the provider
    /// found nothing.
    async fn search(&self, query: &str) -> Result<Vec<SearchResult>>;
}

/// Deduplicate results by URL, preserving first-seen order.
pub(crate) fn dedup_by_url(results: Vec<SearchResult>) -> Vec<SearchResult> {
    let mut seen = std::collections::HashSet::new();
    results
        .into_iter()
        .filter(|r| seen.insert(r.url.clone()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn protocol_relative_url_is_normalized() {
        let r = SearchResult::new("t", "//example.com/page", "s");
        assert_eq!(r.url, "https://example.com/page");
    }

    #[test]
    fn equality_is_by_url_only() {
        let a = SearchResult::new("title a", "https://example.com", "snippet a");
        let b = SearchResult::new("title b", "https://example.com", "snippet b");
        assert_eq!(a, b);
    }

    #[test]
    fn dedup_keeps_first_seen() {
        let results = vec![
            SearchResult::new("first", "https://a.example", ""),
            SearchResult::new("second", "https://b.example", ""),
            SearchResult::new("dup", "https://a.example", ""),
        ];
        let unique = dedup_by_url(results);
        assert_eq!(unique.len(), 2);
        assert_eq!(unique[0].title, "first");
        assert_eq!(unique[1].url, "https://b.example");
    }
}
