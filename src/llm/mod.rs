//! LLM provider interface and chat client
//!
//! The agent only needs one operation from a model: turn a prompt into a
//! full textual reply. [`LlmProvider`] captures that; [`ChatClient`] is a
//! concrete implementation over any OpenAI-compatible chat completions
//! endpoint.

pub mod parser;

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{header, Client};
use secrecy::ExposeSecret;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::LlmConfig;
use crate::error::{Error, Result};

/// A text-in, text-out language model.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Send a prompt and return the model's full reply as one string.
    ///
    /// `streaming` is a hint; implementations may stream internally but must
    /// still return the complete reply.
    async fn process_text(
        &self,
        system_prompt: Option<&str>,
        user_prompt: &str,
        streaming: bool,
    ) -> Result<String>;
}

/// Request body for the chat completions endpoint
#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    stream: bool,
}

/// A chat message
#[derive(Debug, Serialize, Deserialize)]
struct ChatMessage {
    role: String,
    content: String,
}

/// Response body for the chat completions endpoint
#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

/// Client for an OpenAI-compatible chat completions API.
#[derive(Clone)]
pub struct ChatClient {
    client: Client,
    config: LlmConfig,
}

impl ChatClient {
    /// Create a new client from configuration.
    pub fn new(config: LlmConfig) -> Result<Self> {
        let mut headers = header::HeaderMap::new();
        headers.insert(
            header::AUTHORIZATION,
            header::HeaderValue::from_str(&format!("Bearer {}", config.api_key.expose_secret()))
                .map_err(|e| Error::Config(format!("Invalid API key format: {}", e)))?,
        );

        let client = Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self { client, config })
    }

    /// The configured model identifier.
    pub fn model(&self) -> &str {
        &self.config.model
    }
}

#[async_trait]
impl LlmProvider for ChatClient {
    async fn process_text(
        &self,
        system_prompt: Option<&str>,
        user_prompt: &str,
        _streaming: bool,
    ) -> Result<String> {
        let mut messages = Vec::new();
        if let Some(system) = system_prompt {
            messages.push(ChatMessage {
                role: "system".to_string(),
                content: system.to_string(),
            });
        }
        messages.push(ChatMessage {
            role: "user".to_string(),
            content: user_prompt.to_string(),
        });

        let request = ChatRequest {
            model: self.config.model.clone(),
            messages,
            stream: false,
        };

        let url = format!("{}/chat/completions", self.config.base_url);
        debug!("LLM request: model={}, prompt={} bytes", request.model, user_prompt.len());

        let response = self.client.post(&url).json(&request).send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Provider(format!(
                "chat completions returned status {}: {}",
                status, body
            )));
        }

        let body: ChatResponse = response.json().await?;
        body.choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or_else(|| Error::Provider("chat completions returned no choices".into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chat_response_deserializes() {
        let json = r#"{"choices":[{"message":{"role":"assistant","content":"hello"}}]}"#;
        let parsed: ChatResponse = serde_json::from_str(json).unwrap();
        assert_eq!(parsed.choices[0].message.content, "hello");
    }

    #[test]
    fn chat_request_serializes_roles_in_order() {
        let request = ChatRequest {
            model: "m".into(),
            messages: vec![
                ChatMessage { role: "system".into(), content: "s".into() },
                ChatMessage { role: "user".into(), content: "u".into() },
            ],
            stream: false,
        };
        let json = serde_json::to_string(&request).unwrap();
        let system_pos = json.find("system").unwrap();
        let user_pos = json.find("user").unwrap();
        assert!(system_pos < user_pos);
    }
}
