//! Composite search provider
//!
//! Fans the query out to every configured child provider, records per-child
//! errors, and unions the results preserving first-seen order. The composite
//! fails only when every child failed and the union is empty.

use std::sync::Arc;

use tracing::warn;

use super::{dedup_by_url, SearchResult, SearchService};
use crate::error::{Error, Result};

/// Unions the results of several search providers.
pub struct CompositeSearchProvider {
    providers: Vec<Arc<dyn SearchService>>,
}

impl CompositeSearchProvider {
    /// Create a composite over the given children. Order matters: earlier
    /// providers win ties in the first-seen union.
    pub fn new(providers: Vec<Arc<dyn SearchService>>) -> Self {
        Self { providers }
    }
}

#[async_trait::async_trait]
impl SearchService for CompositeSearchProvider {
    async fn search(&self, query: &str) -> Result<Vec<SearchResult>> {
        let query = query.trim();
        if query.is_empty() {
            return Err(Error::InvalidQuery("empty query".into()));
        }

        let outcomes = futures::future::join_all(
            self.providers.iter().map(|p| p.search(query)),
        )
        .await;

        let mut first_error = None;
        let mut union = Vec::new();
        for outcome in outcomes {
            match outcome {
                Ok(results) => union.extend(results),
                Err(e) => {
                    warn!("search provider failed for '{}': {}", query, e);
                    if first_error.is_none() {
                        first_error = Some(e);
                    }
                }
            }
        }

        let unique = dedup_by_url(union);
        if unique.is_empty() {
            return Err(first_error.unwrap_or_else(|| Error::NoResultsFound(query.to_string())));
        }
        Ok(unique)
    }
}
