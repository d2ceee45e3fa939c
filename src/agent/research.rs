//! The research control loop
//!
//! Owns the gap queue, visited-URL set, diary, token accounting, candidate
//! answers, and the interpretation of LLM actions. One call to
//! [`ResearchAgent::get_response`] runs the full loop: search, extract,
//! prompt, dispatch, repeat, until a definitive answer exists or budgets
//! run out. Beast Mode is the terminal fallback when no candidate survived.

use std::collections::{HashSet, VecDeque};
use std::future::Future;
use std::sync::Arc;

use futures::future::join_all;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use url::Url;

use crate::config::{AgentConfig, DefinitivenessMode};
use crate::error::{Error, Result};
use crate::extract::ExtractorFactory;
use crate::llm::parser::{parse_llm_response, LlmAction, LlmResponse};
use crate::llm::LlmProvider;
use crate::search::{SearchResult, SearchService};

use super::diary::Diary;
use super::prompts;

/// Aggregate extracted-content ceiling per iteration, in estimated tokens
const CONTENT_TOKEN_BUDGET: usize = 900_000;

/// Upper bound on content bytes placed into a single prompt
const PROMPT_CONTENT_MAX_BYTES: usize = 48_000;

/// Answers shorter than this go through the expansion re-prompt
const SHORT_ANSWER_LEN: usize = 40;

/// Answers longer than this become candidates even when not definitive
const CANDIDATE_LENGTH_BYPASS: usize = 50;

/// Hedging phrases that disqualify an answer outright
const HEDGING_PHRASES: [&str; 4] = [
    "i don't know",
    "unsure",
    "not available",
    "insufficient information",
];

/// Section keywords the structured definitiveness test requires
const SECTION_KEYWORDS: [&str; 4] = ["summary", "background", "analysis", "conclusion"];

/// Discourse markers, at least one of which must appear
const DISCOURSE_MARKERS: [&str; 4] = ["First", "Additionally", "Furthermore", "In conclusion"];

/// The deep-research agent.
///
/// The agent exclusively owns its run state; providers and extractors are
/// shared handles. State is reset at the start of every `get_response`.
pub struct ResearchAgent {
    search: Arc<dyn SearchService>,
    extractors: ExtractorFactory,
    llm: Arc<dyn LlmProvider>,
    config: AgentConfig,
    cancel: CancellationToken,

    gaps: VecDeque<String>,
    visited: Vec<String>,
    diary: Diary,
    token_usage: u64,
    candidates: Vec<String>,
    bad_attempts: u32,
}

impl ResearchAgent {
    /// Create an agent over the given providers.
    pub fn new(
        search: Arc<dyn SearchService>,
        extractors: ExtractorFactory,
        llm: Arc<dyn LlmProvider>,
        config: AgentConfig,
    ) -> Self {
        Self {
            search,
            extractors,
            llm,
            config,
            cancel: CancellationToken::new(),
            gaps: VecDeque::new(),
            visited: Vec::new(),
            diary: Diary::new(),
            token_usage: 0,
            candidates: Vec::new(),
            bad_attempts: 0,
        }
    }

    /// A handle that cancels the running research when triggered.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Prompt bytes charged so far in the current or last run.
    pub fn token_usage(&self) -> u64 {
        self.token_usage
    }

    /// Run the research loop with the configured bad-attempt limit.
    pub async fn get_response(&mut self, question: &str) -> Result<String> {
        let limit = self.config.max_bad_attempts;
        self.get_response_with_limit(question, limit).await
    }

    /// Run the research loop with an explicit bad-attempt limit.
    pub async fn get_response_with_limit(
        &mut self,
        question: &str,
        max_bad_attempts: u32,
    ) -> Result<String> {
        let question = question.trim();
        if question.is_empty() {
            return Err(Error::InvalidQuery("empty question".into()));
        }

        self.gaps.clear();
        self.visited.clear();
        self.diary.clear();
        self.token_usage = 0;
        self.candidates.clear();
        self.bad_attempts = 0;

        self.gaps.push_back(question.to_string());
        self.expand_initial_queries(question).await?;

        let step_sleep = self.config.step_sleep();
        loop {
            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return Err(Error::Cancelled),
                _ = tokio::time::sleep(step_sleep) => {}
            }

            let current = self
                .gaps
                .pop_front()
                .unwrap_or_else(|| question.to_string());
            info!("researching gap: {}", current);
            self.diary.record(format!("Researching: {}", current));

            // -- Search ------------------------------------------------------
            let results =
                match cancellable(&self.cancel, self.search.search(&current)).await? {
                    Ok(results) => results,
                    Err(e) => {
                        warn!("search failed for '{}': {}", current, e);
                        self.diary.record(format!("Search failed for '{}': {}", current, e));
                        Vec::new()
                    }
                };

            if results.is_empty() && self.gaps.is_empty() {
                return Err(Error::NoSearchResults);
            }

            let unvisited: Vec<SearchResult> = results
                .into_iter()
                .filter(|r| !self.visited.iter().any(|v| v == &r.url))
                .collect();

            if unvisited.is_empty() {
                debug!("every result for '{}' was already visited", current);
                self.diary
                    .record(format!("All results for '{}' already visited; re-queued", current));
                self.push_gap_back(current);
                continue;
            }

            // Mark visited before extraction so concurrent gaps never
            // re-fetch, and failed extractions are not retried this run.
            for result in &unvisited {
                self.visited.push(result.url.clone());
            }
            self.diary
                .record(format!("Found {} new sources for '{}'", unvisited.len(), current));

            // -- Extract -----------------------------------------------------
            let contents = self.fetch_pages(&unvisited).await?;
            let aggregated = admit_contents(contents);
            let content_block = truncate_at_sentence(&aggregated, PROMPT_CONTENT_MAX_BYTES);

            // -- Prompt and invoke ------------------------------------------
            let prompt = prompts::step_prompt(
                question,
                &current,
                &content_block,
                &self.diary.render(),
                &self.visited,
            );
            self.charge_prompt(&prompt)?;

            let reply = cancellable(
                &self.cancel,
                self.llm
                    .process_text(Some(prompts::SYSTEM_PROMPT), &prompt, true),
            )
            .await??;

            let parsed = parse_llm_response(&reply, self.config.parser)?;
            self.dispatch(parsed, question, &current).await?;

            // -- Terminate? --------------------------------------------------
            if self.gaps.is_empty() || self.bad_attempts >= max_bad_attempts {
                return self.finalize(question).await;
            }
        }
    }

    /// Ask the model for query variations and push them ahead of the
    /// original question. Failures here are not fatal: the raw question
    /// still drives the loop.
    async fn expand_initial_queries(&mut self, question: &str) -> Result<()> {
        let prompt = prompts::query_expansion_prompt(question, self.config.max_search_queries);
        self.charge_prompt(&prompt)?;

        let reply = match cancellable(
            &self.cancel,
            self.llm.process_text(None, &prompt, false),
        )
        .await?
        {
            Ok(reply) => reply,
            Err(e) => {
                warn!("query expansion failed: {}", e);
                self.diary.record(format!("Query expansion failed: {}", e));
                return Ok(());
            }
        };

        let variations =
            parse_query_lines(&reply, self.config.max_search_queries, question);
        if !variations.is_empty() {
            self.diary.record(format!(
                "Expanded the question into {} search queries",
                variations.len()
            ));
            for variation in variations.into_iter().rev() {
                self.gaps.push_front(variation);
            }
        }
        Ok(())
    }

    /// Extract all unvisited URLs concurrently. Per-URL failures are logged
    /// and yield nothing; the batch never fails.
    async fn fetch_pages(&mut self, results: &[SearchResult]) -> Result<Vec<String>> {
        let factory = &self.extractors;
        let fetches = results.iter().map(|result| async move {
            let parsed = match Url::parse(&result.url) {
                Ok(url) => url,
                Err(e) => {
                    warn!("skipping unparseable URL {}: {}", result.url, e);
                    return (result.url.clone(), String::new());
                }
            };
            let (resolved, extractor) = factory.extractor_for(&parsed);
            match extractor.extract_content(&resolved).await {
                Ok(text) => (result.url.clone(), text),
                Err(e) => {
                    warn!("extraction failed for {}: {}", result.url, e);
                    (result.url.clone(), String::new())
                }
            }
        });

        let outcomes = cancellable(&self.cancel, join_all(fetches)).await?;

        let mut contents = Vec::new();
        for (url, text) in outcomes {
            if text.trim().is_empty() {
                self.diary.record(format!("No content extracted from {}", url));
            } else {
                contents.push(text);
            }
        }
        Ok(contents)
    }

    /// Interpret one LLM decision and update run state.
    async fn dispatch(
        &mut self,
        response: LlmResponse,
        question: &str,
        current: &str,
    ) -> Result<()> {
        match &response.action {
            LlmAction::Answer => self.handle_answer(response, question).await,
            LlmAction::Reflect => {
                let questions: Vec<String> = response
                    .questions_to_answer
                    .into_iter()
                    .map(|q| q.trim().to_string())
                    .filter(|q| !q.is_empty())
                    .collect();
                if questions.is_empty() {
                    self.diary.record("Reflection produced no sub-questions; re-queued current gap");
                    self.push_gap_back(current.to_string());
                } else {
                    self.diary
                        .record(format!("Reflection added {} sub-questions", questions.len()));
                    for q in questions {
                        self.push_gap_back(q);
                    }
                }
                self.bad_attempts += 1;
                Ok(())
            }
            LlmAction::Search => {
                let query = response
                    .search_query
                    .map(|q| q.trim().to_string())
                    .filter(|q| !q.is_empty());
                match query {
                    Some(query) => {
                        self.diary.record(format!("Following up with search: {}", query));
                        self.gaps.push_front(query);
                    }
                    None => {
                        self.diary.record("Search action carried no query; re-queued current gap");
                        self.push_gap_back(current.to_string());
                    }
                }
                self.bad_attempts += 1;
                Ok(())
            }
            LlmAction::Unknown(name) => {
                warn!("unknown LLM action '{}'", name);
                self.diary.record(format!("Unknown action '{}' from the model", name));
                self.bad_attempts += 1;
                Ok(())
            }
        }
    }

    /// Evaluate an `answer` action: expand if terse, then gate on the
    /// definitiveness test (or the length bypass).
    async fn handle_answer(&mut self, response: LlmResponse, question: &str) -> Result<()> {
        let mut answer = response
            .answer
            .as_deref()
            .unwrap_or_default()
            .trim()
            .to_string();
        if answer.is_empty() {
            self.diary.record("Model produced an empty answer");
            self.bad_attempts += 1;
            return Ok(());
        }

        if answer.chars().count() < SHORT_ANSWER_LEN {
            let prompt = prompts::expansion_prompt(question, &answer, &self.diary.render());
            self.charge_prompt(&prompt)?;
            let expanded = cancellable(
                &self.cancel,
                self.llm
                    .process_text(Some(prompts::SYSTEM_PROMPT), &prompt, false),
            )
            .await??;
            let expanded = expanded.trim().to_string();
            if !expanded.is_empty() {
                self.diary.record("Expanded a terse answer using the research log");
                answer = expanded;
            }
        }

        let definitive = is_definitive(&answer, response.references.len(), &self.config);
        if definitive || answer.len() > CANDIDATE_LENGTH_BYPASS {
            self.diary.record(if definitive {
                "Answer accepted as a definitive candidate"
            } else {
                "Answer kept as a provisional candidate"
            });
            self.candidates.push(answer);
        } else {
            self.diary.record("Answer rejected: not definitive");
            self.bad_attempts += 1;
        }
        Ok(())
    }

    /// Return the latest candidate, or fall back to Beast Mode.
    async fn finalize(&mut self, question: &str) -> Result<String> {
        if let Some(answer) = self.candidates.last() {
            info!(
                "research finished: {} candidates, {} sources, {} prompt bytes",
                self.candidates.len(),
                self.visited.len(),
                self.token_usage
            );
            return Ok(self.with_sources(answer));
        }

        info!("no candidate answers survived; engaging Beast Mode");
        self.diary.record("Beast Mode engaged");
        let prompt = prompts::beast_mode_prompt(question, &self.diary.render());
        self.charge_prompt(&prompt)?;
        let answer = cancellable(
            &self.cancel,
            self.llm
                .process_text(Some(prompts::SYSTEM_PROMPT), &prompt, true),
        )
        .await??;
        Ok(self.with_sources(answer.trim()))
    }

    /// Charge a prompt against the run budget.
    ///
    /// Only prompt bytes count toward the budget; reply sizes are visible in
    /// the logs but do not consume it.
    fn charge_prompt(&mut self, prompt: &str) -> Result<()> {
        self.token_usage += prompt.len() as u64;
        debug!("prompt of {} bytes, {} charged so far", prompt.len(), self.token_usage);
        if self.token_usage > self.config.token_budget {
            return Err(Error::TokenBudgetExceeded {
                used: self.token_usage,
                budget: self.config.token_budget,
            });
        }
        Ok(())
    }

    /// Append the sources section listing every visited URL.
    fn with_sources(&self, answer: &str) -> String {
        if self.visited.is_empty() {
            return answer.to_string();
        }
        format!("{}\n\nSources:\n{}", answer.trim_end(), self.visited.join("\n"))
    }

    /// Re-enqueue a gap at the tail, dropping empties.
    fn push_gap_back(&mut self, gap: String) {
        if !gap.trim().is_empty() {
            self.gaps.push_back(gap);
        }
    }
}

/// Race a future against the agent's cancellation token.
async fn cancellable<T>(
    cancel: &CancellationToken,
    fut: impl Future<Output = T>,
) -> Result<T> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(Error::Cancelled),
        value = fut => Ok(value),
    }
}

/// The definitiveness predicate over an answer and its reference count.
fn is_definitive(answer: &str, reference_count: usize, config: &AgentConfig) -> bool {
    let lower = answer.to_lowercase();
    if HEDGING_PHRASES.iter().any(|phrase| lower.contains(phrase)) {
        return false;
    }
    match config.definitiveness {
        DefinitivenessMode::Simple => answer.len() > 30,
        DefinitivenessMode::Structured => {
            answer.len() >= config.min_answer_length
                && SECTION_KEYWORDS.iter().all(|k| lower.contains(k))
                && answer.contains("\n\n")
                && DISCOURSE_MARKERS.iter().any(|m| answer.contains(m))
                && reference_count >= config.min_sources
        }
    }
}

/// Sort gathered page contents shortest-first and admit greedily under the
/// aggregate token ceiling. Shorter pages win: diversity over depth.
fn admit_contents(mut contents: Vec<String>) -> String {
    contents.sort_by_key(|c| c.len());
    let mut admitted = Vec::new();
    let mut total_tokens = 0usize;
    for content in contents {
        let tokens = estimate_tokens(&content);
        if total_tokens + tokens > CONTENT_TOKEN_BUDGET {
            break;
        }
        total_tokens += tokens;
        admitted.push(content);
    }
    admitted.join("\n\n---\n\n")
}

/// Cheap token estimate: one token per four bytes.
fn estimate_tokens(s: &str) -> usize {
    s.len() / 4
}

/// Clip text to `max_bytes`, preferring the last full sentence.
fn truncate_at_sentence(s: &str, max_bytes: usize) -> String {
    if s.len() <= max_bytes {
        return s.to_string();
    }
    let mut end = max_bytes;
    while end > 0 && !s.is_char_boundary(end) {
        end -= 1;
    }
    let clipped = &s[..end];
    match clipped.rfind(". ") {
        Some(idx) => clipped[..idx + 1].to_string(),
        None => clipped.to_string(),
    }
}

/// Pull distinct queries out of the expansion reply, one per line.
fn parse_query_lines(reply: &str, max: usize, question: &str) -> Vec<String> {
    let mut seen = HashSet::new();
    reply
        .lines()
        .map(|line| {
            line.trim()
                .trim_start_matches(|c: char| {
                    c.is_ascii_digit() || matches!(c, '.' | ')' | '-' | '*')
                })
                .trim()
                .to_string()
        })
        .filter(|line| !line.is_empty() && line != question)
        .filter(|line| seen.insert(line.to_lowercase()))
        .take(max)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn structured_config() -> AgentConfig {
        AgentConfig {
            min_answer_length: 100,
            min_sources: 2,
            ..AgentConfig::default()
        }
    }

    fn structured_answer() -> String {
        "Summary: quicksort partitions around a pivot.\n\n\
         Background: invented by Hoare. Additionally, it is in-place.\n\n\
         Analysis: average O(n log n).\n\n\
         Conclusion: a solid default sort."
            .to_string()
    }

    #[test]
    fn hedging_always_disqualifies() {
        let config = structured_config();
        let answer = format!("{}\nHowever, I am unsure about the details.", structured_answer());
        assert!(!is_definitive(&answer, 3, &config));
    }

    #[test]
    fn structured_test_requires_all_sections() {
        let config = structured_config();
        assert!(is_definitive(&structured_answer(), 2, &config));
        let missing_section = structured_answer().replace("Background", "History");
        assert!(!is_definitive(&missing_section, 2, &config));
    }

    #[test]
    fn structured_test_requires_enough_references() {
        let config = structured_config();
        assert!(!is_definitive(&structured_answer(), 1, &config));
    }

    #[test]
    fn structured_test_requires_paragraph_break_and_marker() {
        let config = structured_config();
        let flat = structured_answer().replace("\n\n", " ");
        assert!(!is_definitive(&flat, 2, &config));
        let unmarked = structured_answer().replace("Additionally", "Also");
        assert!(!is_definitive(&unmarked, 2, &config));
    }

    #[test]
    fn simple_mode_only_needs_length() {
        let config = AgentConfig {
            definitiveness: DefinitivenessMode::Simple,
            ..AgentConfig::default()
        };
        assert!(is_definitive("The answer is 42, with some elaboration.", 0, &config));
        assert!(!is_definitive("Short.", 0, &config));
        assert!(!is_definitive(
            "The information is not available in the sources.",
            0,
            &config
        ));
    }

    #[test]
    fn admission_is_shortest_first_under_cap() {
        let long = "x".repeat(CONTENT_TOKEN_BUDGET * 4);
        let contents = vec![long, "short page".to_string(), "medium length page".to_string()];
        let admitted = admit_contents(contents);
        assert!(admitted.contains("short page"));
        assert!(admitted.contains("medium length page"));
        assert!(admitted.len() < 1000);
    }

    #[test]
    fn truncation_prefers_sentence_boundary() {
        let text = "First sentence. Second sentence. Third and final sentence continues.";
        let clipped = truncate_at_sentence(text, 40);
        assert_eq!(clipped, "First sentence. Second sentence.");
        assert_eq!(truncate_at_sentence("short", 40), "short");
    }

    #[test]
    fn truncation_respects_char_boundaries() {
        let text = format!("{}é and more. Tail", "x".repeat(10));
        let clipped = truncate_at_sentence(&text, 11);
        assert!(text.starts_with(&clipped));
    }

    #[test]
    fn query_lines_are_cleaned_and_deduped() {
        let reply = "1. rust ownership model\n- rust ownership model\n2) borrow checker rules\n\n* lifetimes explained";
        let queries = parse_query_lines(reply, 5, "ignored");
        assert_eq!(
            queries,
            vec!["rust ownership model", "borrow checker rules", "lifetimes explained"]
        );
    }

    #[test]
    fn query_lines_exclude_the_original_question() {
        let queries = parse_query_lines("the question\nsomething else", 5, "the question");
        assert_eq!(queries, vec!["something else"]);
    }

    #[test]
    fn query_lines_respect_the_limit() {
        let reply = "a\nb\nc\nd";
        assert_eq!(parse_query_lines(reply, 2, "q").len(), 2);
    }
}
