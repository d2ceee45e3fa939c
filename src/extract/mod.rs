//! Content extractors
//!
//! Interchangeable adapters that turn a URL into clean body text:
//! - [`WebExtractor`]: generic readability extraction for arbitrary pages
//! - [`RedditExtractor`]: Reddit's JSON API, including deferred comment
//!   subtree expansion
//!
//! [`ExtractorFactory`] picks the extractor from the resolved host,
//! transparently unwrapping search-engine redirect URLs first.

mod reddit;
mod web;

pub use reddit::RedditExtractor;
pub use web::WebExtractor;

use std::sync::Arc;

use async_trait::async_trait;
use url::Url;

use crate::error::Result;

/// Desktop User-Agent sent with page and API requests.
pub const DESKTOP_USER_AGENT: &str =
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) \
     Chrome/120.0.0.0 Safari/537.36";

/// Converts a URL into clean body text.
#[async_trait]
pub trait ContentExtractor: Send + Sync {
    /// Fetch the URL and return its readable text content.
    async fn extract_content(&self, url: &Url) -> Result<String>;
}

/// Host-suffix dispatch table over content extractors.
pub struct ExtractorFactory {
    rules: Vec<(&'static str, Arc<dyn ContentExtractor>)>,
    fallback: Arc<dyn ContentExtractor>,
}

impl Default for ExtractorFactory {
    fn default() -> Self {
        Self::new()
    }
}

impl ExtractorFactory {
    /// The standard table: Reddit hosts get the Reddit extractor, everything
    /// else the generic web extractor.
    pub fn new() -> Self {
        let reddit: Arc<dyn ContentExtractor> = Arc::new(RedditExtractor::new());
        Self {
            rules: vec![("reddit.com", Arc::clone(&reddit)), ("redd.it", reddit)],
            fallback: Arc::new(WebExtractor::new()),
        }
    }

    /// A factory with an empty table and the given fallback extractor.
    pub fn with_fallback(fallback: Arc<dyn ContentExtractor>) -> Self {
        Self {
            rules: Vec::new(),
            fallback,
        }
    }

    /// Route `host_suffix` (exact host or any subdomain of it) to `extractor`.
    pub fn register(&mut self, host_suffix: &'static str, extractor: Arc<dyn ContentExtractor>) {
        self.rules.push((host_suffix, extractor));
    }

    /// Unwrap redirector URLs.
    ///
    /// DuckDuckGo result links point at its own host with the target in the
    /// `uddg` query parameter; the decoded target replaces the wrapper.
    /// Idempotent: resolving an already-resolved URL returns it unchanged.
    pub fn resolve_redirect(url: &Url) -> Url {
        let is_ddg = url
            .host_str()
            .is_some_and(|h| h == "duckduckgo.com" || h.ends_with(".duckduckgo.com"));
        if !is_ddg {
            return url.clone();
        }
        url.query_pairs()
            .find(|(k, _)| k == "uddg")
            .and_then(|(_, v)| Url::parse(&v).ok())
            .unwrap_or_else(|| url.clone())
    }

    /// Resolve redirects, then pick the extractor for the final host.
    pub fn extractor_for(&self, url: &Url) -> (Url, Arc<dyn ContentExtractor>) {
        let resolved = Self::resolve_redirect(url);
        let host = resolved.host_str().unwrap_or_default();
        for (suffix, extractor) in &self.rules {
            if host == *suffix || host.ends_with(&format!(".{}", suffix)) {
                return (resolved, Arc::clone(extractor));
            }
        }
        (resolved, Arc::clone(&self.fallback))
    }
}
