// src/config/mod.rs
//! Environment-driven configuration. `.env` is loaded by the binaries
//! (dotenvy) before [`AppConfig::from_env`] runs.

pub mod ai;

use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

pub use ai::LlmConfig;

use crate::ingest::providers::{awesome, brasil, newsapi};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Compact,
    Json,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub store_url: String,
    pub store_connect_timeout: Duration,
    /// Guards `POST /api/coleta`; `None` rejects every caller.
    pub admin_api_key: Option<String>,
    pub port: u16,
    pub scheduler_enabled: bool,
    pub scheduler_reclaim_stale_lock: bool,
    pub log_dir: PathBuf,
    pub frontend_dir: Option<PathBuf>,
    pub log_format: LogFormat,

    pub quotes_base_url: String,
    pub quote_pairs: Vec<String>,
    pub brasil_api_base_url: String,
    pub news_api_base_url: String,
    pub news_api_key: Option<String>,
    pub news_snapshot_dir: Option<PathBuf>,

    pub llm: LlmConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            store_url: "file://data".into(),
            store_connect_timeout: Duration::from_secs(30),
            admin_api_key: None,
            port: 3000,
            scheduler_enabled: false,
            scheduler_reclaim_stale_lock: false,
            log_dir: PathBuf::from("logs"),
            frontend_dir: None,
            log_format: LogFormat::Compact,
            quotes_base_url: awesome::DEFAULT_BASE_URL.into(),
            quote_pairs: awesome::DEFAULT_PAIRS.iter().map(|p| p.to_string()).collect(),
            brasil_api_base_url: brasil::DEFAULT_BASE_URL.into(),
            news_api_base_url: newsapi::DEFAULT_BASE_URL.into(),
            news_api_key: None,
            news_snapshot_dir: None,
            llm: LlmConfig::default(),
        }
    }
}

impl AppConfig {
    pub fn from_env() -> Self {
        let d = Self::default();
        Self {
            store_url: env_var_or("STORE_URL", &d.store_url),
            store_connect_timeout: Duration::from_secs(env_var_parse(
                "STORE_CONNECT_TIMEOUT_SECS",
                d.store_connect_timeout.as_secs(),
            )),
            admin_api_key: env_var_opt("ADMIN_API_KEY"),
            port: env_var_parse("PORT", d.port),
            scheduler_enabled: env_var_bool("SCHEDULER_ENABLED", d.scheduler_enabled),
            scheduler_reclaim_stale_lock: env_var_bool(
                "SCHEDULER_RECLAIM_STALE_LOCK",
                d.scheduler_reclaim_stale_lock,
            ),
            log_dir: env_var_opt("LOG_DIR").map(PathBuf::from).unwrap_or(d.log_dir),
            frontend_dir: env_var_opt("FRONTEND_DIR").map(PathBuf::from),
            log_format: match env_var_opt("LOG_FORMAT").as_deref() {
                Some(f) if f.eq_ignore_ascii_case("json") => LogFormat::Json,
                _ => LogFormat::Compact,
            },
            quotes_base_url: env_var_or("QUOTES_BASE_URL", &d.quotes_base_url),
            quote_pairs: env_var_opt("QUOTE_PAIRS")
                .map(|s| parse_list(&s))
                .filter(|v| !v.is_empty())
                .unwrap_or(d.quote_pairs),
            brasil_api_base_url: env_var_or("BRASIL_API_BASE_URL", &d.brasil_api_base_url),
            news_api_base_url: env_var_or("NEWS_API_BASE_URL", &d.news_api_base_url),
            news_api_key: env_var_opt("NEWS_API_KEY"),
            news_snapshot_dir: env_var_opt("NEWS_SNAPSHOT_DIR").map(PathBuf::from),
            llm: LlmConfig::from_env(),
        }
    }

    /// Scheduler single-instance marker.
    pub fn lock_path(&self) -> PathBuf {
        self.log_dir.join("scheduler.lock")
    }
}

/// Trimmed, non-empty value of `key`.
pub fn env_var_opt(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

pub fn env_var_or(key: &str, default: &str) -> String {
    env_var_opt(key).unwrap_or_else(|| default.to_string())
}

/// Parsed value of `key`, falling back to `default` when unset or unparsable.
pub fn env_var_parse<T: FromStr>(key: &str, default: T) -> T {
    match env_var_opt(key) {
        Some(raw) => raw.parse().unwrap_or_else(|_| {
            tracing::warn!(key, value = %raw, "ignoring unparsable env var");
            default
        }),
        None => default,
    }
}

/// `1/true/yes/on` and `0/false/no/off`, case-insensitive.
pub fn env_var_bool(key: &str, default: bool) -> bool {
    match env_var_opt(key).map(|v| v.to_ascii_lowercase()).as_deref() {
        Some("1" | "true" | "yes" | "on") => true,
        Some("0" | "false" | "no" | "off") => false,
        _ => default,
    }
}

fn parse_list(s: &str) -> Vec<String> {
    s.split(',')
        .map(|p| p.trim().to_ascii_uppercase())
        .filter(|p| !p.is_empty())
        .collect()
}
