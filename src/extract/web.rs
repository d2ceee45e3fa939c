//! Generic readability extractor for arbitrary web pages

use std::sync::OnceLock;
use std::time::Duration;

use regex::Regex;
use reqwest::Client;
use scraper::{ElementRef, Html, Selector};
use url::Url;

use super::{ContentExtractor, DESKTOP_USER_AGENT};
use crate::error::{Error, Result};

/// Default timeout for page fetches
const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// A candidate text block must exceed this length to win
const MIN_CONTENT_LEN: usize = 100;

/// Subtrees stripped before text collection
const NOISE_TAGS: [&str; 6] = ["script", "style", "nav", "footer", "header", "aside"];

/// Content containers, tried in order
const CONTENT_SELECTORS: [&str; 3] = ["article", "main", "body"];

fn tag_stripper() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"<[^>]+>").expect("valid regex"))
}

/// Fetches a page and reduces it to readable text.
///
/// Prefers `<article>`, then `<main>`, then `<body>`, taking the first whose
/// collected text (with script/style/nav/footer/header/aside subtrees
/// removed) exceeds 100 characters. Falls back to a regex tag stripper.
pub struct WebExtractor {
    client: Client,
}

impl Default for WebExtractor {
    fn default() -> Self {
        Self::new()
    }
}

impl WebExtractor {
    /// Create an extractor with the default timeout.
    pub fn new() -> Self {
        Self::with_timeout(DEFAULT_TIMEOUT_SECS)
    }

    /// Create an extractor with a custom request timeout.
    pub fn with_timeout(timeout_secs: u64) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .user_agent(DESKTOP_USER_AGENT)
            .build()
            .expect("Failed to create HTTP client");
        Self { client }
    }
}

#[async_trait::async_trait]
impl ContentExtractor for WebExtractor {
    async fn extract_content(&self, url: &Url) -> Result<String> {
        let response = self
            .client
            .get(url.clone())
            .header("Accept", "text/html")
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(Error::InvalidResponse(format!(
                "{} returned status {}",
                url,
                response.status()
            )));
        }

        let body = response.text().await?;
        Ok(extract_readable(&body))
    }
}

/// Reduce an HTML payload to readable text.
fn extract_readable(body: &str) -> String {
    let document = if body.contains("<html") {
        Html::parse_document(body)
    } else {
        Html::parse_fragment(body)
    };

    for selector_str in CONTENT_SELECTORS {
        let selector = Selector::parse(selector_str).expect("valid selector");
        if let Some(element) = document.select(&selector).next() {
            let mut text = String::new();
            collect_text(element, &mut text);
            let text = collapse_whitespace(&text);
            if text.len() > MIN_CONTENT_LEN {
                return text;
            }
        }
    }

    // Nothing substantial in the usual containers; strip tags wholesale.
    let stripped = tag_stripper().replace_all(body, " ");
    collapse_whitespace(&stripped)
}

/// Append the text of `element`, skipping noise subtrees.
fn collect_text(element: ElementRef, out: &mut String) {
    for child in element.children() {
        if let Some(text) = child.value().as_text() {
            out.push_str(text);
            out.push(' ');
        } else if let Some(child_element) = ElementRef::wrap(child) {
            if !NOISE_TAGS.contains(&child_element.value().name()) {
                collect_text(child_element, out);
            }
        }
    }
}

/// Collapse all whitespace runs to single spaces and trim.
fn collapse_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn padding(label: &str) -> String {
        format!("{} ", label).repeat(30)
    }

    #[test]
    fn prefers_article_over_body() {
        let article = padding("article text");
        let html = format!(
            "<html><body><p>{}</p><article><p>{}</p></article></body></html>",
            padding("body filler"),
            article
        );
        let text = extract_readable(&html);
        assert!(text.contains("article text"));
        assert!(!text.contains("body filler"));
    }

    #[test]
    fn strips_noise_subtrees() {
        let html = format!(
            "<html><body><nav>menu menu menu</nav><main><p>{}</p></main>\
             <footer>copyright</footer><script>var x = 1;</script></body></html>",
            padding("real content")
        );
        let text = extract_readable(&html);
        assert!(text.contains("real content"));
        assert!(!text.contains("menu"));
        assert!(!text.contains("copyright"));
        assert!(!text.contains("var x"));
    }

    #[test]
    fn short_containers_fall_through_to_stripper() {
        let tail = padding("tail prose");
        let html = format!("<html><body><p>tiny</p></body></html><div>{}</div>", tail);
        let text = extract_readable(&html);
        assert!(text.contains("tail prose"));
    }

    #[test]
    fn fragment_without_html_tag_uses_stripper() {
        let fragment = format!("<p>{}</p>", padding("fragment text"));
        let text = extract_readable(&fragment);
        assert!(text.contains("fragment text"));
        assert!(!text.contains('<'));
    }

    #[test]
    fn whitespace_is_collapsed() {
        assert_eq!(collapse_whitespace("  a \n\n  b\tc  "), "a b c");
    }
}
