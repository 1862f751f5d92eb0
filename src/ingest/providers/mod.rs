// src/ingest/providers/mod.rs
//! Fetch adapters for the upstream data sources.
//!
//! Adapters never panic and never retry (news retries live in
//! [`crate::ingest::retry`]); any failure becomes a [`FetchError`], which
//! serializes to `{ "error": true, "status"?, "message" }`.

pub mod awesome;
pub mod brasil;
pub mod newsapi;

use reqwest::StatusCode;
use serde::ser::{Serialize, SerializeMap, Serializer};
use serde_json::Value;
use std::time::Duration;

pub use awesome::AwesomeQuotes;
pub use brasil::BrasilApi;
pub use newsapi::NewsApi;

const USER_AGENT: &str = concat!("fin-pulse/", env!("CARGO_PKG_VERSION"));

#[derive(Debug, Clone, thiserror::Error)]
pub enum FetchError {
    #[error("request to {endpoint} failed: {message}")]
    Network { endpoint: String, message: String },
    #[error("{endpoint} answered HTTP {status}: {message}")]
    Status {
        endpoint: String,
        status: u16,
        message: String,
    },
    #[error("unexpected payload from {endpoint}: {message}")]
    Schema { endpoint: String, message: String },
    #[error("no API key configured for {0}")]
    MissingKey(&'static str),
}

impl FetchError {
    pub fn status(&self) -> Option<u16> {
        match self {
            FetchError::Status { status, .. } => Some(*status),
            _ => None,
        }
    }

    pub fn is_rate_limited(&self) -> bool {
        self.status() == Some(StatusCode::TOO_MANY_REQUESTS.as_u16())
    }

    /// Worth another attempt: rate limits, network failures and 5xx.
    pub fn is_retryable(&self) -> bool {
        match self {
            FetchError::Network { .. } => true,
            FetchError::Status { status, .. } => *status == 429 || *status >= 500,
            FetchError::Schema { .. } | FetchError::MissingKey(_) => false,
        }
    }

    pub fn message(&self) -> String {
        match self {
            FetchError::Network { message, .. }
            | FetchError::Status { message, .. }
            | FetchError::Schema { message, .. } => message.clone(),
            FetchError::MissingKey(_) => self.to_string(),
        }
    }

    pub(crate) fn schema(endpoint: &str, message: impl Into<String>) -> Self {
        FetchError::Schema {
            endpoint: endpoint.to_string(),
            message: message.into(),
        }
    }
}

impl Serialize for FetchError {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(None)?;
        map.serialize_entry("error", &true)?;
        if let Some(status) = self.status() {
            map.serialize_entry("status", &status)?;
        }
        map.serialize_entry("message", &self.message())?;
        map.end()
    }
}

/// Shared HTTP client for all adapters.
pub fn build_http_client() -> reqwest::Result<reqwest::Client> {
    reqwest::Client::builder()
        .user_agent(USER_AGENT)
        .connect_timeout(Duration::from_secs(10))
        .timeout(Duration::from_secs(30))
        .build()
}

pub(crate) fn join_url(base: &str, path: &str) -> String {
    format!(
        "{}/{}",
        base.trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}

/// GET `endpoint` with query params and parse the JSON body.
/// Query params stay out of error messages (they may carry API keys).
pub(crate) async fn get_json(
    client: &reqwest::Client,
    endpoint: &str,
    query: &[(&str, &str)],
) -> Result<Value, FetchError> {
    let resp = client
        .get(endpoint)
        .query(query)
        .send()
        .await
        .map_err(|e| FetchError::Network {
            endpoint: endpoint.to_string(),
            message: e.without_url().to_string(),
        })?;

    let status = resp.status();
    if !status.is_success() {
        let body = resp.text().await.unwrap_or_default();
        return Err(FetchError::Status {
            endpoint: endpoint.to_string(),
            status: status.as_u16(),
            message: upstream_message(&body).unwrap_or_else(|| {
                status.canonical_reason().unwrap_or("unknown error").to_string()
            }),
        });
    }

    resp.json::<Value>().await.map_err(|e| {
        FetchError::schema(endpoint, format!("invalid JSON body: {}", e.without_url()))
    })
}

/// Pull a human message out of an upstream error body (`message` or `error.message`).
fn upstream_message(body: &str) -> Option<String> {
    let v: Value = serde_json::from_str(body).ok()?;
    v.get("message")
        .or_else(|| v.get("error").and_then(|e| e.get("message")))
        .and_then(Value::as_str)
        .map(str::to_string)
}
