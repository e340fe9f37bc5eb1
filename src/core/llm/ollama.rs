use std::time::Duration;

use anyhow::{Result, anyhow};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{CompleteOptions, LlmGateway};
use crate::config::Settings;

// ── Ollama chat request/response ──

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    stream: bool,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    message: ChatResponseMessage,
}

#[derive(Deserialize)]
struct ChatResponseMessage {
    content: String,
}

/// Ollama-backed text completion gateway.
pub struct OllamaGateway {
    base_url: String,
    model: String,
    client: Client,
}

impl OllamaGateway {
    pub fn new(settings: &Settings) -> Result<Self> {
        Ok(Self {
            base_url: settings.ollama_base_url.trim_end_matches('/').to_string(),
            model: settings.ollama_model.clone(),
            client: Client::builder()
                .timeout(Duration::from_secs(180))
                .build()?,
        })
    }
}

#[async_trait]
impl LlmGateway for OllamaGateway {
    async fn complete(&self, prompt: &str, opts: CompleteOptions) -> Result<String> {
        if opts.enable_sequential_thinking || opts.use_tool_search {
            // Ollama has no tool calling; the flags are accepted and ignored.
            debug!(
                "Tool flags ignored by ollama provider (sequential_thinking={}, tool_search={})",
                opts.enable_sequential_thinking, opts.use_tool_search
            );
        }

        let req = ChatRequest {
            model: &self.model,
            messages: vec![ChatMessage {
                role: "user",
                content: prompt,
            }],
            stream: false,
        };

        let res = self
            .client
            .post(format!("{}/api/chat", self.base_url))
            .json(&req)
            .send()
            .await?;

        if !res.status().is_success() {
            return Err(anyhow!(
                "Ollama API error: {} - {}",
                res.status(),
                res.text().await.unwrap_or_default()
            ));
        }

        let parsed: ChatResponse = res.json().await?;
        Ok(parsed.message.content)
    }
}
