//! Reddit content extractor
//!
//! Talks to Reddit's public JSON API. Thread URLs produce the post header,
//! selftext, and the full comment tree; listing URLs produce a compact
//! per-entry summary. Truncated comment subtrees ("more" nodes) are deferred
//! to a work queue and expanded through the `morechildren` endpoint with
//! bounded concurrency and rate-limit-aware retries.

use std::time::Duration;

use rand::Rng;
use reqwest::Client;
use serde_json::Value;
use tokio::sync::Semaphore;
use tokio::time::sleep;
use tracing::{debug, warn};
use url::Url;

use super::{ContentExtractor, DESKTOP_USER_AGENT};
use crate::error::{Error, Result};

/// Canonical API host
const CANONICAL_HOST: &str = "www.reddit.com";

/// Endpoint for expanding deferred comment subtrees
const MORE_CHILDREN_ENDPOINT: &str = "https://www.reddit.com/api/morechildren.json";

/// Comment ids per `morechildren` request
const MORE_CHUNK_SIZE: usize = 100;

/// Simultaneous `morechildren` requests
const MORE_CONCURRENCY: usize = 3;

/// Retry cap for a failing chunk
const DEFAULT_MAX_RETRY: u32 = 5;

/// Spacing between chunk requests
const INTER_CHUNK_DELAY: Duration = Duration::from_millis(500);

/// Default timeout for API requests
const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Reddit thread/listing extractor.
pub struct RedditExtractor {
    client: Client,
    more_permits: Semaphore,
    max_retry: u32,
}

impl Default for RedditExtractor {
    fn default() -> Self {
        Self::new()
    }
}

impl RedditExtractor {
    /// Create an extractor with default limits.
    pub fn new() -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(DEFAULT_TIMEOUT_SECS))
            .user_agent(DESKTOP_USER_AGENT)
            .build()
            .expect("Failed to create HTTP client");
        Self {
            client,
            more_permits: Semaphore::new(MORE_CONCURRENCY),
            max_retry: DEFAULT_MAX_RETRY,
        }
    }

    /// Normalize a Reddit URL for the JSON API: https, canonical host,
    /// `.json` path suffix, and a 1000-comment limit for threads.
    fn normalize_url(url: &Url) -> Result<Url> {
        let mut normalized = url.clone();
        normalized
            .set_scheme("https")
            .map_err(|_| Error::InvalidUrl(url.to_string()))?;
        normalized
            .set_host(Some(CANONICAL_HOST))
            .map_err(|_| Error::InvalidUrl(url.to_string()))?;

        let path = normalized.path().trim_end_matches('/').to_string();
        if !path.ends_with(".json") {
            normalized.set_path(&format!("{}.json", path));
        }

        if normalized.path().contains("/comments/") {
            normalized.set_query(Some("limit=1000"));
        } else {
            normalized.set_query(None);
        }
        Ok(normalized)
    }

    /// Expand every deferred subtree. Failures abandon their subtree only.
    async fn fetch_deferred(&self, link_id: &str, pending: Vec<(Vec<String>, u32)>) -> String {
        let chunks = chunk_pending(pending);
        debug!("expanding {} deferred comment chunks for {}", chunks.len(), link_id);

        let fetches = chunks.into_iter().map(|(ids, depth)| async move {
            let _permit = self.more_permits.acquire().await.ok()?;
            let outcome = self.fetch_more_chunk(link_id, &ids, depth).await;
            sleep(INTER_CHUNK_DELAY).await;
            match outcome {
                Ok(text) => Some(text),
                Err(e) => {
                    warn!("abandoning comment subtree of {} ids: {}", ids.len(), e);
                    None
                }
            }
        });

        futures::future::join_all(fetches)
            .await
            .into_iter()
            .flatten()
            .collect()
    }

    /// Fetch one chunk with the retry policy: a single 1-second retry after
    /// HTTP 429, exponential backoff for everything else.
    async fn fetch_more_chunk(&self, link_id: &str, ids: &[String], depth: u32) -> Result<String> {
        let mut attempt: u32 = 0;
        let mut rate_limit_retried = false;
        loop {
            match self.post_more_children(link_id, ids, depth).await {
                Ok(text) => return Ok(text),
                Err(Error::RateLimit(_)) if !rate_limit_retried => {
                    rate_limit_retried = true;
                    sleep(Duration::from_secs(1)).await;
                }
                Err(e) => {
                    attempt += 1;
                    if attempt > self.max_retry {
                        return Err(e);
                    }
                    sleep(backoff_delay(attempt)).await;
                }
            }
        }
    }

    async fn post_more_children(&self, link_id: &str, ids: &[String], depth: u32) -> Result<String> {
        let children = ids.join(",");
        let depth_field = depth.to_string();
        let response = self
            .client
            .post(MORE_CHILDREN_ENDPOINT)
            .form(&[
                ("api_type", "json"),
                ("link_id", link_id),
                ("children", children.as_str()),
                ("sort", "confidence"),
                ("limit_children", "false"),
                ("depth", depth_field.as_str()),
            ])
            .send()
            .await?;

        if response.status().as_u16() == 429 {
            return Err(Error::RateLimit("reddit morechildren".into()));
        }
        if !response.status().is_success() {
            return Err(Error::InvalidResponse(format!(
                "morechildren returned status {}",
                response.status()
            )));
        }

        let payload: Value = response.json().await?;
        Ok(format_more_things(&payload, depth))
    }
}

#[async_trait::async_trait]
impl ContentExtractor for RedditExtractor {
    async fn extract_content(&self, url: &Url) -> Result<String> {
        let url = Self::normalize_url(url)?;
        let response = self
            .client
            .get(url.clone())
            .header("Accept", "application/json")
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(Error::InvalidResponse(format!(
                "{} returned status {}",
                url,
                response.status()
            )));
        }

        let payload: Value = response.json().await?;
        match &payload {
            Value::Array(parts) if parts.len() == 2 => {
                let post = &parts[0]["data"]["children"][0]["data"];
                let link_id = format!("t3_{}", post["id"].as_str().unwrap_or_default());

                let mut out = format_post_header(post);
                let mut pending = Vec::new();
                walk_comments(&parts[1]["data"]["children"], &mut out, &mut pending);

                if !pending.is_empty() {
                    let expanded = self.fetch_deferred(&link_id, pending).await;
                    out.push_str(&expanded);
                }
                Ok(out)
            }
            Value::Object(_) => Ok(format_index_listing(&payload)),
            _ => Err(Error::InvalidResponse("unrecognized reddit payload".into())),
        }
    }
}

/// Exponential backoff, base 2, with sub-250 ms jitter.
fn backoff_delay(attempt: u32) -> Duration {
    let base = Duration::from_secs(2u64.saturating_pow(attempt));
    base + Duration::from_millis(rand::thread_rng().gen_range(0..250))
}

/// Split deferred (ids, depth) entries into request-sized chunks.
fn chunk_pending(pending: Vec<(Vec<String>, u32)>) -> Vec<(Vec<String>, u32)> {
    let mut chunks = Vec::new();
    for (ids, depth) in pending {
        for chunk in ids.chunks(MORE_CHUNK_SIZE) {
            chunks.push((chunk.to_vec(), depth));
        }
    }
    chunks
}

/// Walk a comment listing depth-first with an explicit stack.
///
/// `t1` nodes are formatted in place and their replies pushed at depth+1;
/// `more` nodes defer their ids to `pending`.
fn walk_comments(children: &Value, out: &mut String, pending: &mut Vec<(Vec<String>, u32)>) {
    let mut stack: Vec<(&Value, u32)> = Vec::new();
    if let Some(top) = children.as_array() {
        for child in top.iter().rev() {
            stack.push((child, 0));
        }
    }

    while let Some((node, depth)) = stack.pop() {
        let data = &node["data"];
        match node["kind"].as_str() {
            Some("t1") => {
                out.push_str(&format_comment(data, depth));
                if let Some(replies) = data["replies"]["data"]["children"].as_array() {
                    for child in replies.iter().rev() {
                        stack.push((child, depth + 1));
                    }
                }
            }
            Some("more") => {
                let ids: Vec<String> = data["children"]
                    .as_array()
                    .map(|a| {
                        a.iter()
                            .filter_map(|v| v.as_str().map(str::to_string))
                            .collect()
                    })
                    .unwrap_or_default();
                if !ids.is_empty() {
                    pending.push((ids, depth));
                }
            }
            _ => {}
        }
    }
}

fn format_comment(data: &Value, depth: u32) -> String {
    let body = data["body"].as_str().unwrap_or("").trim();
    if body.is_empty() {
        return String::new();
    }
    let author = data["author"].as_str().unwrap_or("[deleted]");
    let score = data["score"].as_i64().unwrap_or(0);
    format!("{}{}: {} [{}]\n", "  ".repeat(depth as usize), author, body, score)
}

fn format_post_header(post: &Value) -> String {
    let title = post["title"].as_str().unwrap_or("(untitled)");
    let author = post["author"].as_str().unwrap_or("[deleted]");
    let subreddit = post["subreddit"].as_str().unwrap_or("");
    let score = post["score"].as_i64().unwrap_or(0);
    let comments = post["num_comments"].as_i64().unwrap_or(0);
    let nsfw = if post["over_18"].as_bool().unwrap_or(false) {
        " [NSFW]"
    } else {
        ""
    };
    let created = post["created_utc"]
        .as_f64()
        .and_then(|ts| chrono::DateTime::from_timestamp(ts as i64, 0))
        .map(|dt| dt.format("%Y-%m-%d %H:%M UTC").to_string())
        .unwrap_or_default();

    let mut header = format!(
        "Title: {}{}\nAuthor: u/{}  Subreddit: r/{}\nPosted: {}  Score: {}  Comments: {}\n",
        title, nsfw, author, subreddit, created, score, comments
    );
    if let Some(selftext) = post["selftext"].as_str() {
        let selftext = selftext.trim();
        if !selftext.is_empty() {
            header.push('\n');
            header.push_str(selftext);
            header.push('\n');
        }
    }
    header.push('\n');
    header
}

fn format_more_things(payload: &Value, fallback_depth: u32) -> String {
    let mut out = String::new();
    if let Some(things) = payload["json"]["data"]["things"].as_array() {
        for thing in things {
            if thing["kind"].as_str() == Some("t1") {
                let data = &thing["data"];
                let depth = data["depth"]
                    .as_u64()
                    .map(|d| d as u32)
                    .unwrap_or(fallback_depth);
                out.push_str(&format_comment(data, depth));
            }
        }
    }
    out
}

fn format_index_listing(payload: &Value) -> String {
    let mut out = String::new();
    if let Some(children) = payload["data"]["children"].as_array() {
        for child in children {
            let data = &child["data"];
            out.push_str(&format!(
                "- {} (by u/{}, score {}, {} comments)\n  {}\n",
                data["title"].as_str().unwrap_or("(untitled)"),
                data["author"].as_str().unwrap_or("[deleted]"),
                data["score"].as_i64().unwrap_or(0),
                data["num_comments"].as_i64().unwrap_or(0),
                data["url"].as_str().unwrap_or(""),
            ));
        }
    }
    out
}
