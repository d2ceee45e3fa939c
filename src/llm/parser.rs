//! Tolerant decoder for LLM research replies
//!
//! Models rarely return the clean JSON they were asked for. The strict path
//! decodes, then repairs common damage (chat-template tokens, clipped
//! braces, missing commas) and retries, then falls back to a literal
//! `FINAL ANSWER:` marker before giving up. The lenient path runs the same
//! pipeline but never rejects: its final fallback treats the whole payload
//! as prose and returns it as an answer.

use std::sync::OnceLock;

use regex::Regex;
use serde::Deserialize;

use crate::config::ParserMode;
use crate::error::{Error, Result};

/// Marker scanned for when JSON decoding fails entirely
const FINAL_ANSWER_MARKER: &str = "FINAL ANSWER:";

/// Chat-template artefacts stripped before decoding
const TEMPLATE_TOKENS: [&str; 7] = [
    "<|im_start|>",
    "<|im_end|>",
    "<|endoftext|>",
    "<|eot_id|>",
    "<s>",
    "</s>",
    "[/INST]",
];

fn missing_comma_fix() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r#""[ \t]*\n[ \t]*""#).expect("valid regex"))
}

fn colon_newline_fix() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r#":[ \t]*\n[ \t]*""#).expect("valid regex"))
}

fn code_fence() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?m)^```[a-zA-Z]*[ \t]*$").expect("valid regex"))
}

/// What the LLM decided to do next.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LlmAction {
    /// Provide a final answer
    Answer,
    /// Issue a new search query
    Search,
    /// Break the question into sub-questions
    Reflect,
    /// Anything else; counted as a bad attempt by the agent
    Unknown(String),
}

impl From<&str> for LlmAction {
    fn from(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "answer" => LlmAction::Answer,
            "search" => LlmAction::Search,
            "reflect" => LlmAction::Reflect,
            other => LlmAction::Unknown(other.to_string()),
        }
    }
}

/// A cited source attached to an answer.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Reference {
    /// Verbatim quote supporting the answer, if the model supplied one
    #[serde(rename = "exactQuote", default)]
    pub exact_quote: Option<String>,
    /// Source URL
    pub url: String,
}

/// Wire shape of the reply, before normalization
#[derive(Debug, Deserialize)]
struct RawResponse {
    action: String,
    #[serde(default)]
    thoughts: Option<String>,
    #[serde(rename = "searchQuery", default)]
    search_query: Option<String>,
    #[serde(rename = "questionsToAnswer", default)]
    questions_to_answer: Option<Vec<String>>,
    #[serde(default)]
    answer: Option<String>,
    #[serde(default)]
    references: Option<Vec<Reference>>,
}

/// A decoded research decision.
#[derive(Debug, Clone)]
pub struct LlmResponse {
    /// The normalized action
    pub action: LlmAction,
    /// The model's reasoning, if any
    pub thoughts: String,
    /// Query for the `search` action
    pub search_query: Option<String>,
    /// Sub-questions for the `reflect` action
    pub questions_to_answer: Vec<String>,
    /// Answer text for the `answer` action
    pub answer: Option<String>,
    /// Cited sources
    pub references: Vec<Reference>,
}

impl LlmResponse {
    /// Wrap plain text as an `answer` response.
    pub fn answer_only(text: impl Into<String>) -> Self {
        Self {
            action: LlmAction::Answer,
            thoughts: String::new(),
            search_query: None,
            questions_to_answer: Vec::new(),
            answer: Some(text.into()),
            references: Vec::new(),
        }
    }

    fn from_raw(raw: RawResponse) -> Self {
        Self {
            action: LlmAction::from(raw.action.as_str()),
            thoughts: raw.thoughts.unwrap_or_default(),
            search_query: raw.search_query,
            questions_to_answer: raw.questions_to_answer.unwrap_or_default(),
            answer: raw.answer,
            references: raw.references.unwrap_or_default(),
        }
    }
}

/// Decode an LLM reply.
///
/// With [`ParserMode::Strict`], unusable payloads produce
/// `Error::InvalidLlmResponse`. With [`ParserMode::Lenient`], the call
/// never fails: the last resort returns the cleaned payload as an answer.
pub fn parse_llm_response(raw: &str, mode: ParserMode) -> Result<LlmResponse> {
    if let Ok(parsed) = serde_json::from_str::<RawResponse>(raw.trim()) {
        return Ok(LlmResponse::from_raw(parsed));
    }

    let repaired = repair_json(raw);
    if let Ok(parsed) = serde_json::from_str::<RawResponse>(&repaired) {
        return Ok(LlmResponse::from_raw(parsed));
    }

    if let Some(idx) = raw.find(FINAL_ANSWER_MARKER) {
        let answer = raw[idx + FINAL_ANSWER_MARKER.len()..].trim();
        if !answer.is_empty() {
            return Ok(LlmResponse::answer_only(answer));
        }
    }

    match mode {
        ParserMode::Strict => Err(Error::InvalidLlmResponse(snippet(raw))),
        ParserMode::Lenient => Ok(LlmResponse::answer_only(clean_prose(raw))),
    }
}

/// Undo the damage models most often inflict on their own JSON.
fn repair_json(raw: &str) -> String {
    let mut s = raw.to_string();
    for token in TEMPLATE_TOKENS {
        s = s.replace(token, "");
    }
    let s = s.trim();

    // Clip to the outermost object.
    let clipped = match (s.find('{'), s.rfind('}')) {
        (Some(open), Some(close)) if open < close => &s[open..=close],
        _ => s,
    };

    let fixed = colon_newline_fix().replace_all(clipped, ": \"");
    let fixed = missing_comma_fix().replace_all(&fixed, "\",\n\"");
    fixed.into_owned()
}

/// Reduce an arbitrary payload to displayable prose.
fn clean_prose(raw: &str) -> String {
    let mut s = raw.to_string();
    for token in TEMPLATE_TOKENS {
        s = s.replace(token, "");
    }
    let s = code_fence().replace_all(&s, "");

    let mut lines = Vec::new();
    for line in s.lines() {
        let trimmed = line.trim();
        // Drop bare JSON punctuation left over from half-formed objects.
        if matches!(trimmed, "{" | "}" | "[" | "]" | "," | "\",") {
            continue;
        }
        if let Some(heading) = trimmed.strip_prefix('#') {
            lines.push(format!("## {}", heading.trim_start_matches('#').trim()));
        } else {
            lines.push(line.to_string());
        }
    }
    lines.join("\n").trim().to_string()
}

fn snippet(raw: &str) -> String {
    let trimmed = raw.trim();
    let end = trimmed
        .char_indices()
        .take(120)
        .last()
        .map(|(i, c)| i + c.len_utf8())
        .unwrap_or(0);
    trimmed[..end].to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_well_formed_reply() {
        let raw = r#"{
            "action": "search",
            "thoughts": "need more sources",
            "searchQuery": "quicksort pivot selection",
            "questionsToAnswer": null,
            "answer": null,
            "references": null
        }"#;
        let parsed = parse_llm_response(raw, ParserMode::Strict).unwrap();
        assert_eq!(parsed.action, LlmAction::Search);
        assert_eq!(parsed.search_query.as_deref(), Some("quicksort pivot selection"));
        assert!(parsed.questions_to_answer.is_empty());
    }

    #[test]
    fn action_is_case_insensitive() {
        let raw = r#"{"action": "ANSWER", "thoughts": "", "answer": "done"}"#;
        let parsed = parse_llm_response(raw, ParserMode::Strict).unwrap();
        assert_eq!(parsed.action, LlmAction::Answer);
    }

    #[test]
    fn unknown_action_is_preserved() {
        let raw = r#"{"action": "ponder", "thoughts": ""}"#;
        let parsed = parse_llm_response(raw, ParserMode::Strict).unwrap();
        assert_eq!(parsed.action, LlmAction::Unknown("ponder".into()));
    }

    #[test]
    fn references_decode_with_optional_quote() {
        let raw = r#"{
            "action": "answer",
            "thoughts": "",
            "answer": "text",
            "references": [
                {"exactQuote": "a quote", "url": "https://a.example"},
                {"url": "https://b.example"}
            ]
        }"#;
        let parsed = parse_llm_response(raw, ParserMode::Strict).unwrap();
        assert_eq!(parsed.references.len(), 2);
        assert_eq!(parsed.references[1].exact_quote, None);
    }

    #[test]
    fn repairs_template_tokens_and_fences() {
        let raw = "<|im_start|>{\"action\": \"answer\", \"thoughts\": \"t\", \"answer\": \"fixed\"}<|im_end|>";
        let parsed = parse_llm_response(raw, ParserMode::Strict).unwrap();
        assert_eq!(parsed.answer.as_deref(), Some("fixed"));
    }

    #[test]
    fn repairs_missing_comma_between_pairs() {
        let raw = "{\"action\": \"answer\"\n\"thoughts\": \"t\"\n\"answer\": \"patched\"}";
        let parsed = parse_llm_response(raw, ParserMode::Strict).unwrap();
        assert_eq!(parsed.answer.as_deref(), Some("patched"));
    }

    #[test]
    fn repairs_json_wrapped_in_prose() {
        let raw = "Sure, here is my decision:\n{\"action\": \"reflect\", \"thoughts\": \"\", \"questionsToAnswer\": [\"what is a pivot?\"]}\nHope that helps!";
        let parsed = parse_llm_response(raw, ParserMode::Strict).unwrap();
        assert_eq!(parsed.action, LlmAction::Reflect);
        assert_eq!(parsed.questions_to_answer, vec!["what is a pivot?"]);
    }

    #[test]
    fn falls_back_to_final_answer_marker() {
        let raw = "I could not produce JSON.\nFINAL ANSWER: The capital of France is Paris.";
        let parsed = parse_llm_response(raw, ParserMode::Strict).unwrap();
        assert_eq!(parsed.action, LlmAction::Answer);
        assert_eq!(parsed.answer.as_deref(), Some("The capital of France is Paris."));
    }

    #[test]
    fn strict_mode_rejects_garbage() {
        let err = parse_llm_response("no json here at all", ParserMode::Strict).unwrap_err();
        assert!(matches!(err, Error::InvalidLlmResponse(_)));
    }

    #[test]
    fn lenient_mode_never_fails() {
        let parsed = parse_llm_response("no json here at all", ParserMode::Lenient).unwrap();
        assert_eq!(parsed.action, LlmAction::Answer);
        assert_eq!(parsed.answer.as_deref(), Some("no json here at all"));
    }

    #[test]
    fn lenient_mode_strips_fences_and_normalizes_headings() {
        let raw = "```markdown\n### Findings\nSome text.\n```";
        let parsed = parse_llm_response(raw, ParserMode::Lenient).unwrap();
        let answer = parsed.answer.unwrap();
        assert!(answer.contains("## Findings"));
        assert!(answer.contains("Some text."));
        assert!(!answer.contains("```"));
    }

    #[test]
    fn snippet_respects_char_boundaries() {
        let s = "é".repeat(200);
        let snip = snippet(&s);
        assert!(snip.chars().count() <= 120);
    }
}
