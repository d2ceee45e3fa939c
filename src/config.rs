//! Configuration for the research agent and its providers
//!
//! Configuration is deserializable from a TOML file and can also be built
//! from environment variables (with `.env` support via dotenvy). All knobs
//! are immutable for the duration of a research run.

use std::path::Path;
use std::time::Duration;

use secrecy::SecretString;
use serde::Deserialize;

use crate::error::{Error, Result};

/// Which definitiveness predicate gates candidate answers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum DefinitivenessMode {
    /// Require length, the four section keywords, a paragraph break, a
    /// discourse marker, and a minimum reference count.
    #[default]
    Structured,
    /// Require only length > 30 and no hedging phrase. Suitable for
    /// short-answer profiles.
    Simple,
}

/// How strictly LLM replies are decoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ParserMode {
    /// Decode, repair, fall back to a `FINAL ANSWER:` marker, then fail.
    #[default]
    Strict,
    /// Same pipeline, but the final fallback treats the whole payload as
    /// prose. Never fails.
    Lenient,
}

/// Knobs for the research control loop.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    /// Pause between loop iterations, in milliseconds.
    pub step_sleep_ms: u64,
    /// How many unproductive LLM actions end the run.
    pub max_bad_attempts: u32,
    /// Budget of prompt bytes charged across all LLM calls in one run.
    pub token_budget: u64,
    /// Minimum answer length for the structured definitiveness test.
    pub min_answer_length: usize,
    /// Maximum number of query variations requested from the LLM up front.
    pub max_search_queries: usize,
    /// Minimum number of references a definitive answer must cite.
    pub min_sources: usize,
    /// Which definitiveness predicate to apply.
    pub definitiveness: DefinitivenessMode,
    /// How strictly LLM replies are decoded.
    pub parser: ParserMode,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            step_sleep_ms: 500,
            max_bad_attempts: 3,
            token_budget: 1_000_000,
            min_answer_length: 300,
            max_search_queries: 5,
            min_sources: 2,
            definitiveness: DefinitivenessMode::default(),
            parser: ParserMode::default(),
        }
    }
}

impl AgentConfig {
    /// The inter-iteration sleep as a `Duration`.
    pub fn step_sleep(&self) -> Duration {
        Duration::from_millis(self.step_sleep_ms)
    }
}

/// Brave Search API configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct BraveConfig {
    /// API key for Brave Search
    pub api_key: SecretString,
    /// Request timeout in seconds
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl BraveConfig {
    /// Create config from environment variables
    pub fn from_env() -> Option<Self> {
        let api_key = std::env::var("BRAVE_API_KEY").ok()?;
        Some(Self {
            api_key: SecretString::from(api_key),
            timeout_secs: std::env::var("BRAVE_TIMEOUT")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or_else(default_timeout_secs),
        })
    }
}

/// LLM provider configuration (OpenAI-compatible chat endpoint).
#[derive(Debug, Clone, Deserialize)]
pub struct LlmConfig {
    /// Bearer token for the chat completions endpoint
    pub api_key: SecretString,
    /// Base URL of the API
    #[serde(default = "default_llm_base_url")]
    pub base_url: String,
    /// Model identifier
    #[serde(default = "default_llm_model")]
    pub model: String,
    /// Request timeout in seconds
    #[serde(default = "default_llm_timeout_secs")]
    pub timeout_secs: u64,
}

impl LlmConfig {
    /// Create config from environment variables
    pub fn from_env() -> Option<Self> {
        let api_key = std::env::var("LLM_API_KEY")
            .or_else(|_| std::env::var("OPENROUTER_API_KEY"))
            .ok()?;
        Some(Self {
            api_key: SecretString::from(api_key),
            base_url: std::env::var("LLM_BASE_URL").unwrap_or_else(|_| default_llm_base_url()),
            model: std::env::var("LLM_MODEL").unwrap_or_else(|_| default_llm_model()),
            timeout_secs: std::env::var("LLM_TIMEOUT")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or_else(default_llm_timeout_secs),
        })
    }
}

/// Top-level configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Research loop knobs
    pub agent: AgentConfig,
    /// Brave Search, if an API key is configured
    pub brave: Option<BraveConfig>,
    /// LLM provider, if an API key is configured
    pub llm: Option<LlmConfig>,
}

impl Config {
    /// Load configuration from a TOML file
    pub fn from_path(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("Failed to read config file {}: {}", path.display(), e))
        })?;
        toml::from_str(&content).map_err(|e| Error::Config(format!("Invalid TOML config: {}", e)))
    }

    /// Load configuration from environment variables, reading `.env` if present
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();
        Self {
            agent: AgentConfig::default(),
            brave: BraveConfig::from_env(),
            llm: LlmConfig::from_env(),
        }
    }
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_llm_timeout_secs() -> u64 {
    120
}

fn default_llm_base_url() -> String {
    "https://openrouter.ai/api/v1".to_string()
}

fn default_llm_model() -> String {
    "anthropic/claude-sonnet-4".to_string()
}
