// src/config/ai.rs
use serde::{Deserialize, Serialize};
use std::env;

pub const DEFAULT_OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_CONSULT_MODEL: &str = "gpt-3.5-turbo";
pub const DEFAULT_ANALYSIS_MODEL: &str = "gpt-4";

/// LLM backend settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LlmConfig {
    /// Empty means no real backend; calls fail with `LlmError::Disabled`.
    #[serde(skip_serializing)]
    pub api_key: String,
    pub base_url: String,
    /// `LLM_TEST_MODE=mock` swaps in the deterministic mock backend.
    pub mock: bool,
    pub consult_model: String,
    pub analysis_model: String,
    pub temperature: f32,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            base_url: DEFAULT_OPENAI_BASE_URL.to_string(),
            mock: false,
            consult_model: DEFAULT_CONSULT_MODEL.to_string(),
            analysis_model: DEFAULT_ANALYSIS_MODEL.to_string(),
            temperature: 0.7,
        }
    }
}

impl LlmConfig {
    pub fn from_env() -> Self {
        let d = Self::default();
        Self {
            api_key: env::var("OPENAI_API_KEY").unwrap_or_default().trim().to_string(),
            base_url: super::env_var_or("OPENAI_BASE_URL", &d.base_url),
            mock: env::var("LLM_TEST_MODE")
                .map(|v| v.eq_ignore_ascii_case("mock"))
                .unwrap_or(false),
            consult_model: super::env_var_or("LLM_CONSULT_MODEL", &d.consult_model),
            analysis_model: super::env_var_or("LLM_ANALYSIS_MODEL", &d.analysis_model),
            temperature: super::env_var_parse("LLM_TEMPERATURE", d.temperature).clamp(0.0, 2.0),
        }
    }
}
