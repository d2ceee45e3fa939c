//! DeepResearch CLI
//!
//! Runs one research question end-to-end and prints the cited answer.

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use deepresearch::agent::ResearchAgent;
use deepresearch::config::Config;
use deepresearch::extract::ExtractorFactory;
use deepresearch::llm::ChatClient;
use deepresearch::search::{
    BraveSearchProvider, CompositeSearchProvider, DuckDuckGoProvider, SearchService,
};
use deepresearch::{Error, Result, VERSION};

#[derive(Parser)]
#[command(
    name = "deepresearch",
    version = VERSION,
    about = "Autonomous deep-research agent",
    long_about = None
)]
struct Cli {
    /// The research question
    question: Vec<String>,

    /// Path to a TOML config file (defaults to environment variables)
    #[arg(long, short)]
    config: Option<PathBuf>,

    /// Override the bad-attempt limit
    #[arg(long)]
    max_bad_attempts: Option<u32>,

    /// Override the prompt-byte budget
    #[arg(long)]
    token_budget: Option<u64>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let question = cli.question.join(" ");
    if question.trim().is_empty() {
        return Err(Error::InvalidQuery("no question given".into()));
    }

    let mut config = match &cli.config {
        Some(path) => Config::from_path(path)?,
        None => Config::from_env(),
    };
    if let Some(limit) = cli.max_bad_attempts {
        config.agent.max_bad_attempts = limit;
    }
    if let Some(budget) = cli.token_budget {
        config.agent.token_budget = budget;
    }

    let mut providers: Vec<Arc<dyn SearchService>> = vec![Arc::new(DuckDuckGoProvider::new())];
    if let Some(brave) = config.brave.clone() {
        info!("Brave Search enabled");
        providers.push(Arc::new(BraveSearchProvider::new(brave)));
    }
    let search = Arc::new(CompositeSearchProvider::new(providers));

    let llm_config = config
        .llm
        .clone()
        .ok_or_else(|| Error::Config("no LLM configured (set LLM_API_KEY)".into()))?;
    let llm = Arc::new(ChatClient::new(llm_config)?);

    let mut agent = ResearchAgent::new(search, ExtractorFactory::new(), llm, config.agent);

    info!("researching: {}", question);
    let answer = agent.get_response(&question).await?;
    println!("{}", answer);
    Ok(())
}
