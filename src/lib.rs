//! # DeepResearch
//!
//! An autonomous deep-research agent built with Rust.
//!
//! ## Features
//!
//! - **Research control loop:** gap queue, visited-URL tracking, token
//!   budgets, and structured LLM action dispatch
//! - **Multi-source search:** DuckDuckGo scraping and Brave Search behind
//!   one composite provider
//! - **Domain-aware extraction:** generic readability extraction plus a
//!   Reddit-specific API extractor
//! - **Resilient parsing:** LLM replies survive malformed JSON, chat
//!   template artefacts, and prose wrappers

pub mod agent;
pub mod config;
pub mod error;
pub mod extract;
pub mod llm;
pub mod ratelimit;
pub mod search;

pub use agent::ResearchAgent;
pub use config::Config;
pub use error::{Error, Result};

/// Application version from Cargo.toml
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Application name
pub const NAME: &str = env!("CARGO_PKG_NAME");
