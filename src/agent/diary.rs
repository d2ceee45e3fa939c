//! Append-only research diary
//!
//! Every noteworthy event in a run is recorded with a local timestamp. The
//! rendered log is snapshot into prompts so the model keeps continuity
//! across iterations.

use chrono::{DateTime, Local};
use tracing::debug;

/// One diary line.
#[derive(Debug, Clone)]
pub struct DiaryEntry {
    /// When the event happened (local time)
    pub timestamp: DateTime<Local>,
    /// What happened
    pub message: String,
}

/// The agent's append-only event log.
#[derive(Debug, Default)]
pub struct Diary {
    entries: Vec<DiaryEntry>,
}

impl Diary {
    /// Create an empty diary.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an event.
    pub fn record(&mut self, message: impl Into<String>) {
        let message = message.into();
        debug!("diary: {}", message);
        self.entries.push(DiaryEntry {
            timestamp: Local::now(),
            message,
        });
    }

    /// Render the log for inclusion in a prompt.
    pub fn render(&self) -> String {
        self.entries
            .iter()
            .map(|e| format!("[{}] {}", e.timestamp.format("%H:%M:%S"), e.message))
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Drop all entries (start of a new run).
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn records_in_order() {
        let mut diary = Diary::new();
        diary.record("first");
        diary.record("second");
        let rendered = diary.render();
        let first = rendered.find("first").unwrap();
        let second = rendered.find("second").unwrap();
        assert!(first < second);
        assert_eq!(diary.len(), 2);
    }

    #[test]
    fn rendered_lines_carry_timestamps() {
        let mut diary = Diary::new();
        diary.record("event");
        let rendered = diary.render();
        assert!(rendered.starts_with('['));
        assert!(rendered.ends_with("] event"));
    }

    #[test]
    fn clear_empties_the_log() {
        let mut diary = Diary::new();
        diary.record("event");
        diary.clear();
        assert!(diary.is_empty());
        assert_eq!(diary.render(), "");
    }
}
