//! Error types for the research agent

use thiserror::Error;

/// Result type alias using the crate's Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for the research agent
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// The query string was empty or malformed
    #[error("Invalid query: {0}")]
    InvalidQuery(String),

    /// A URL could not be parsed or normalized
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    /// A provider returned a response we could not use (non-2xx, bad payload)
    #[error("Invalid response from {0}")]
    InvalidResponse(String),

    /// A single provider found nothing for a query
    #[error("No results found for query: {0}")]
    NoResultsFound(String),

    /// Every search avenue is exhausted and the gap queue is empty
    #[error("No search results for any pending question")]
    NoSearchResults,

    /// The run consumed more prompt tokens than the configured budget
    #[error("Token budget exceeded: used {used} of {budget}")]
    TokenBudgetExceeded { used: u64, budget: u64 },

    /// The LLM reply could not be decoded into a research action
    #[error("Could not parse LLM response: {0}")]
    InvalidLlmResponse(String),

    /// LLM provider error (transport or upstream)
    #[error("LLM provider error: {0}")]
    Provider(String),

    /// Content extraction error
    #[error("Extraction error: {0}")]
    Extraction(String),

    /// Rate limit hit (HTTP 429)
    #[error("Rate limit exceeded: {0}")]
    RateLimit(String),

    /// The run was cancelled at a suspension point
    #[error("Research run cancelled")]
    Cancelled,

    /// HTTP request error
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Check if error is retryable
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Error::Http(_) | Error::RateLimit(_) | Error::InvalidResponse(_) | Error::Provider(_)
        )
    }

    /// Check if error is a client error (caller's fault)
    pub fn is_client_error(&self) -> bool {
        matches!(self, Error::InvalidQuery(_) | Error::InvalidUrl(_))
    }

    /// Check if error terminates a research run (as opposed to a single fetch)
    pub fn is_fatal_for_run(&self) -> bool {
        matches!(
            self,
            Error::NoSearchResults
                | Error::TokenBudgetExceeded { .. }
                | Error::InvalidLlmResponse(_)
                | Error::Cancelled
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryable_classification() {
        assert!(Error::RateLimit("429".into()).is_retryable());
        assert!(Error::InvalidResponse("brave".into()).is_retryable());
        assert!(!Error::InvalidQuery("".into()).is_retryable());
    }

    #[test]
    fn fatal_classification() {
        assert!(Error::NoSearchResults.is_fatal_for_run());
        assert!(Error::TokenBudgetExceeded { used: 2, budget: 1 }.is_fatal_for_run());
        assert!(!Error::NoResultsFound("q".into()).is_fatal_for_run());
    }

    #[test]
    fn budget_error_message_carries_numbers() {
        let e = Error::TokenBudgetExceeded { used: 1800, budget: 1000 };
        assert_eq!(e.to_string(), "Token budget exceeded: used 1800 of 1000");
    }
}
