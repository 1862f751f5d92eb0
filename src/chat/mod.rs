// src/chat/mod.rs
//! Chat/analysis gateway: prompt → LLM → persisted Query record.
//!
//! LLM failures are returned to the caller and never retried. Failing to
//! persist the Query record is logged and does not fail the call.

pub mod prompt;
pub mod provider;

use chrono::Utc;
use metrics::counter;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{error, info};

use crate::config::LlmConfig;
use crate::model::{QueryKind, QueryMetadata, QueryRecord, TokenUsage};
use crate::store::{Collection, FindOptions, SharedStore, StoredDoc, StoreError};
pub use provider::{build_backend, ChatBackend, ChatReply, ChatRequest, LlmError, SharedBackend};

pub const DEFAULT_MAX_TOKENS: u32 = 500;
pub const ANALYSIS_MAX_TOKENS: u32 = 1000;
pub const ANONYMOUS: &str = "anonymous";
pub const SYSTEM_REQUESTER: &str = "system";

#[derive(Debug, thiserror::Error)]
pub enum ChatError {
    #[error(transparent)]
    Llm(#[from] LlmError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Who is asking; recorded with the query.
#[derive(Debug, Clone, Default)]
pub struct ClientMeta {
    pub client_ip: Option<String>,
    pub user_agent: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsultParams {
    #[serde(default)]
    pub prompt: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub max_tokens: Option<u32>,
    #[serde(default, alias = "usuario")]
    pub requester: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConsultReply {
    pub success: bool,
    pub response: String,
    pub model: String,
    pub usage: TokenUsage,
}

pub struct ChatGateway {
    backend: SharedBackend,
    store: SharedStore,
    consult_model: String,
    analysis_model: String,
}

impl ChatGateway {
    pub fn new(backend: SharedBackend, store: SharedStore) -> Self {
        let d = LlmConfig::default();
        Self {
            backend,
            store,
            consult_model: d.consult_model,
            analysis_model: d.analysis_model,
        }
    }

    pub fn from_config(cfg: &LlmConfig, store: SharedStore) -> Self {
        Self {
            backend: build_backend(cfg),
            store,
            consult_model: cfg.consult_model.clone(),
            analysis_model: cfg.analysis_model.clone(),
        }
    }

    pub fn backend_name(&self) -> &'static str {
        self.backend.name()
    }

    async fn ask(
        &self,
        prompt: String,
        model: String,
        max_tokens: u32,
    ) -> Result<(ChatRequest, ChatReply), LlmError> {
        let req = ChatRequest {
            system: prompt::SYSTEM_PROMPT.to_string(),
            prompt,
            model,
            max_tokens,
        };
        match self.backend.complete(&req).await {
            Ok(reply) => {
                counter!("llm_calls_total", "outcome" => "ok").increment(1);
                info!(
                    target: "chat",
                    backend = self.backend.name(),
                    model = %req.model,
                    tokens = reply.usage.total_tokens,
                    "llm call finished"
                );
                Ok((req, reply))
            }
            Err(e) => {
                counter!("llm_calls_total", "outcome" => "error").increment(1);
                error!(
                    target: "chat",
                    backend = self.backend.name(),
                    model = %req.model,
                    error = %e,
                    "llm call failed"
                );
                Err(e)
            }
        }
    }

    async fn record(&self, rec: &QueryRecord) {
        let res = match serde_json::to_value(rec) {
            Ok(body) => self.store.insert(Collection::Queries, None, body).await.map(|_| ()),
            Err(e) => Err(StoreError::Malformed(e)),
        };
        if let Err(e) = res {
            error!(target: "chat", error = %e, "query record not saved");
        }
    }

    /// Free-form question. Replies with the model that was requested.
    pub async fn consult(
        &self,
        params: ConsultParams,
        meta: ClientMeta,
    ) -> Result<ConsultReply, ChatError> {
        let model = params
            .model
            .filter(|m| !m.trim().is_empty())
            .unwrap_or_else(|| self.consult_model.clone());
        let max_tokens = params.max_tokens.filter(|n| *n > 0).unwrap_or(DEFAULT_MAX_TOKENS);
        let requester = params
            .requester
            .filter(|r| !r.trim().is_empty())
            .unwrap_or_else(|| ANONYMOUS.to_string());

        let (req, reply) = self.ask(params.prompt, model, max_tokens).await?;
        self.record(&QueryRecord {
            prompt: req.prompt,
            response: reply.content.clone(),
            model: req.model.clone(),
            tokens: reply.usage,
            requester,
            timestamp: Utc::now(),
            metadata: QueryMetadata {
                kind: QueryKind::Consult,
                client_ip: meta.client_ip,
                user_agent: meta.user_agent,
            },
        })
        .await;

        Ok(ConsultReply {
            success: true,
            response: reply.content,
            model: req.model,
            usage: reply.usage,
        })
    }

    /// Analysis over the 10 latest quotes and indicators and the 5 latest news.
    pub async fn generate_analysis(&self) -> Result<ConsultReply, ChatError> {
        let quotes = self.store.find(Collection::Quotes, &FindOptions::newest(10)).await?;
        let indicators = self
            .store
            .find(Collection::Indicators, &FindOptions::newest(10))
            .await?;
        let news = self
            .store
            .find(Collection::News, &FindOptions::sorted_by("publishedAt", 5))
            .await?;

        let bodies = |docs: Vec<StoredDoc>| docs.into_iter().map(|d| d.body).collect::<Vec<_>>();
        let text = prompt::analysis_prompt(&bodies(quotes), &bodies(indicators), &bodies(news));

        let (req, reply) = self
            .ask(text, self.analysis_model.clone(), ANALYSIS_MAX_TOKENS)
            .await?;
        self.record(&QueryRecord {
            prompt: prompt::ANALYSIS_LABEL.to_string(),
            response: reply.content.clone(),
            model: req.model.clone(),
            tokens: reply.usage,
            requester: SYSTEM_REQUESTER.to_string(),
            timestamp: Utc::now(),
            metadata: QueryMetadata {
                kind: QueryKind::Analysis,
                client_ip: None,
                user_agent: None,
            },
        })
        .await;

        Ok(ConsultReply {
            success: true,
            response: reply.content,
            model: req.model,
            usage: reply.usage,
        })
    }

    /// Query records, newest first.
    pub async fn history(
        &self,
        limit: usize,
        requester: Option<&str>,
    ) -> Result<Vec<Value>, StoreError> {
        let mut opts = FindOptions::newest(limit);
        if let Some(r) = requester.filter(|r| !r.is_empty()) {
            opts = opts.with_filter("requester", json!(r));
        }
        let docs = self.store.find(Collection::Queries, &opts).await?;
        Ok(docs.iter().map(StoredDoc::to_json).collect())
    }

    pub async fn latest_analysis(&self) -> Result<Option<Value>, StoreError> {
        let opts = FindOptions::newest(1).with_filter("metadata.kind", json!("analysis"));
        let docs = self.store.find(Collection::Queries, &opts).await?;
        Ok(docs.first().map(StoredDoc::to_json))
    }
}
