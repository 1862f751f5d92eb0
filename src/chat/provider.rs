// src/chat/provider.rs
//! LLM backends: an OpenAI-compatible chat-completions client, a
//! deterministic mock and a disabled stub.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

use crate::config::LlmConfig;
use crate::model::TokenUsage;

#[derive(Debug, Clone, PartialEq)]
pub struct ChatRequest {
    pub system: String,
    pub prompt: String,
    pub model: String,
    pub max_tokens: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ChatReply {
    pub content: String,
    pub usage: TokenUsage,
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum LlmError {
    #[error("LLM backend not configured (set OPENAI_API_KEY)")]
    Disabled,
    #[error("LLM request failed: {0}")]
    Transport(String),
    #[error("LLM provider error ({status}): {message}")]
    Provider { status: u16, message: String },
    #[error("LLM response had no content")]
    EmptyReply,
}

#[async_trait]
pub trait ChatBackend: Send + Sync {
    async fn complete(&self, req: &ChatRequest) -> Result<ChatReply, LlmError>;
    /// Backend name for logs.
    fn name(&self) -> &'static str;
}

pub type SharedBackend = Arc<dyn ChatBackend>;

/// Pick a backend: mock when `LLM_TEST_MODE=mock`, OpenAI when a key is set,
/// otherwise disabled.
pub fn build_backend(cfg: &LlmConfig) -> SharedBackend {
    if cfg.mock {
        return Arc::new(MockChat::default());
    }
    if cfg.api_key.is_empty() {
        return Arc::new(DisabledChat);
    }
    match OpenAiChat::new(&cfg.base_url, &cfg.api_key, cfg.temperature) {
        Ok(c) => Arc::new(c),
        Err(e) => {
            tracing::error!(
                target: "chat",
                error = %e,
                "could not build LLM client; chat disabled"
            );
            Arc::new(DisabledChat)
        }
    }
}

pub struct OpenAiChat {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
    temperature: f32,
}

impl OpenAiChat {
    pub fn new(base_url: &str, api_key: &str, temperature: f32) -> reqwest::Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent(concat!("fin-pulse/", env!("CARGO_PKG_VERSION")))
            .connect_timeout(Duration::from_secs(10))
            .timeout(Duration::from_secs(120))
            .build()?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            temperature,
        })
    }
}

#[derive(Serialize)]
struct Msg<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Serialize)]
struct Req<'a> {
    model: &'a str,
    messages: Vec<Msg<'a>>,
    temperature: f32,
    max_tokens: u32,
}

#[derive(Deserialize)]
struct Resp {
    #[serde(default)]
    choices: Vec<Choice>,
    #[serde(default)]
    usage: TokenUsage,
}

#[derive(Deserialize)]
struct Choice {
    message: ChoiceMsg,
}

#[derive(Deserialize)]
struct ChoiceMsg {
    #[serde(default)]
    content: Option<String>,
}

#[async_trait]
impl ChatBackend for OpenAiChat {
    async fn complete(&self, req: &ChatRequest) -> Result<ChatReply, LlmError> {
        let body = Req {
            model: &req.model,
            messages: vec![
                Msg {
                    role: "system",
                    content: &req.system,
                },
                Msg {
                    role: "user",
                    content: &req.prompt,
                },
            ],
            temperature: self.temperature,
            max_tokens: req.max_tokens,
        };

        let resp = self
            .http
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| LlmError::Transport(e.without_url().to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            return Err(LlmError::Provider {
                status: status.as_u16(),
                message: provider_message(&text)
                    .unwrap_or_else(|| status.canonical_reason().unwrap_or("error").to_string()),
            });
        }

        let parsed: Resp = resp
            .json()
            .await
            .map_err(|e| LlmError::Transport(format!("bad response body: {e}")))?;
        let content = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .filter(|c| !c.trim().is_empty())
            .ok_or(LlmError::EmptyReply)?;
        Ok(ChatReply {
            content,
            usage: parsed.usage,
        })
    }

    fn name(&self) -> &'static str {
        "openai"
    }
}

/// `{"error": {"message": ...}}` as returned by OpenAI-compatible APIs.
fn provider_message(body: &str) -> Option<String> {
    let v: serde_json::Value = serde_json::from_str(body).ok()?;
    v.pointer("/error/message")
        .or_else(|| v.get("message"))
        .and_then(|m| m.as_str())
        .map(str::to_string)
}

/// Always fails with [`LlmError::Disabled`].
pub struct DisabledChat;

#[async_trait]
impl ChatBackend for DisabledChat {
    async fn complete(&self, _req: &ChatRequest) -> Result<ChatReply, LlmError> {
        Err(LlmError::Disabled)
    }

    fn name(&self) -> &'static str {
        "disabled"
    }
}

/// Deterministic backend for tests and offline runs.
#[derive(Debug, Clone)]
pub struct MockChat {
    pub fixed: String,
}

impl Default for MockChat {
    fn default() -> Self {
        Self {
            fixed: "Mock analysis: markets stable (mock)".to_string(),
        }
    }
}

#[async_trait]
impl ChatBackend for MockChat {
    async fn complete(&self, req: &ChatRequest) -> Result<ChatReply, LlmError> {
        let prompt_tokens = req.prompt.split_whitespace().count() as u32;
        let completion_tokens = self.fixed.split_whitespace().count() as u32;
        Ok(ChatReply {
            content: self.fixed.clone(),
            usage: TokenUsage {
                prompt_tokens,
                completion_tokens,
                total_tokens: prompt_tokens + completion_tokens,
            },
        })
    }

    fn name(&self) -> &'static str {
        "mock"
    }
}
