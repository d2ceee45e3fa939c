//! Prompt templates for the research loop

use chrono::Utc;

/// System prompt shared by all research calls.
pub const SYSTEM_PROMPT: &str = "\
You are a meticulous research assistant. You gather evidence from the web, \
reason about what is still missing, and only answer when the evidence \
supports a definitive, citation-backed response.";

/// Ask the model to widen the question into distinct search queries.
pub fn query_expansion_prompt(question: &str, max_queries: usize) -> String {
    format!(
        "Generate up to {max_queries} distinct web search queries that together \
         cover this research question from different angles.\n\n\
         Question: {question}\n\n\
         Reply with one query per line. No numbering, no commentary.",
    )
}

/// The main per-iteration prompt: evidence, log, and the action schema.
pub fn step_prompt(
    question: &str,
    current_gap: &str,
    content: &str,
    diary: &str,
    visited: &[String],
) -> String {
    let date = Utc::now().format("%Y-%m-%d");
    let references = if visited.is_empty() {
        "(none yet)".to_string()
    } else {
        visited.join("\n")
    };
    let diary = if diary.is_empty() { "(empty)" } else { diary };

    format!(
        "Current date: {date}\n\n\
         Research question: {question}\n\
         Currently investigating: {current_gap}\n\n\
         == Gathered content ==\n{content}\n\n\
         == Research log ==\n{diary}\n\n\
         == Visited references ==\n{references}\n\n\
         Decide your next move. Pick exactly one action:\n\
         - \"answer\": you have enough evidence for a definitive answer with \
         Summary, Background, Analysis and Conclusion sections.\n\
         - \"search\": you need one more targeted web search.\n\
         - \"reflect\": the question should be split into sub-questions.\n\n\
         Respond strictly with JSON in this schema and nothing else:\n\
         {{\"action\": \"answer\" | \"search\" | \"reflect\",\n\
          \"thoughts\": \"...\",\n\
          \"searchQuery\": \"...\" | null,\n\
          \"questionsToAnswer\": [\"...\"] | null,\n\
          \"answer\": \"...\" | null,\n\
          \"references\": [{{\"exactQuote\": \"...\", \"url\": \"...\"}}] | null}}",
    )
}

/// Ask the model to expand an answer that came back too short.
pub fn expansion_prompt(question: &str, short_answer: &str, diary: &str) -> String {
    format!(
        "Your previous answer to the research question was too brief.\n\n\
         Question: {question}\n\
         Previous answer: {short_answer}\n\n\
         == Research log ==\n{diary}\n\n\
         Expand the answer into a full response with Summary, Background, \
         Analysis and Conclusion sections, drawing on everything in the \
         research log. Reply with the expanded answer only.",
    )
}

/// The last-resort prompt: a best-effort answer is mandatory.
pub fn beast_mode_prompt(question: &str, diary: &str) -> String {
    let date = Utc::now().format("%Y-%m-%d");
    format!(
        "Beast Mode Activated.\n\n\
         Current date: {date}\n\
         Research question: {question}\n\n\
         == Full research log ==\n{diary}\n\n\
         Budgets are exhausted. Using everything in the log, produce your \
         single best final answer right now. Do not refuse, do not hedge, \
         do not ask for more time. Reply with the answer only.",
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn step_prompt_contains_date_question_and_schema() {
        let prompt = step_prompt("what is quicksort?", "pivot selection", "content", "log", &[
            "https://a.example".to_string(),
        ]);
        let today = Utc::now().format("%Y-%m-%d").to_string();
        assert!(prompt.contains(&today));
        assert!(prompt.contains("what is quicksort?"));
        assert!(prompt.contains("\"action\""));
        assert!(prompt.contains("searchQuery"));
        assert!(prompt.contains("questionsToAnswer"));
        assert!(prompt.contains("https://a.example"));
    }

    #[test]
    fn expansion_prompt_embeds_previous_answer() {
        let prompt = expansion_prompt("q", "too short", "log line");
        assert!(prompt.contains("too short"));
        assert!(prompt.contains("log line"));
    }

    #[test]
    fn beast_mode_announces_itself_and_includes_diary() {
        let prompt = beast_mode_prompt("q", "diary content");
        assert!(prompt.starts_with("Beast Mode Activated."));
        assert!(prompt.contains("diary content"));
    }

    #[test]
    fn query_expansion_names_the_limit() {
        let prompt = query_expansion_prompt("q", 5);
        assert!(prompt.contains("up to 5"));
    }
}
