// src/ingest/providers/awesome.rs
//! Currency quotes (AwesomeAPI `json/last/<pairs>`).

use serde_json::Value;
use tracing::debug;

use super::{get_json, join_url, FetchError};

pub const DEFAULT_BASE_URL: &str = "https://economia.awesomeapi.com.br";
pub const DEFAULT_PAIRS: &[&str] = &["USD-BRL", "EUR-BRL", "BTC-BRL"];

pub struct AwesomeQuotes {
    client: reqwest::Client,
    base_url: String,
    pairs: Vec<String>,
}

impl AwesomeQuotes {
    pub fn new(client: reqwest::Client, base_url: &str, pairs: Vec<String>) -> Self {
        Self {
            client,
            base_url: base_url.to_string(),
            pairs,
        }
    }

    pub fn endpoint(&self) -> String {
        join_url(&self.base_url, &format!("json/last/{}", self.pairs.join(",")))
    }

    /// Latest quote per pair. The body is an object keyed by pair ("USDBRL" → quote).
    pub async fn fetch_latest(&self) -> Result<Value, FetchError> {
        let endpoint = self.endpoint();
        let body = get_json(&self.client, &endpoint, &[]).await?;
        match &body {
            Value::Object(map) => {
                debug!(target: "ingest", pairs = map.len(), "quotes fetched");
                Ok(body)
            }
            other => Err(FetchError::schema(
                &endpoint,
                format!("expected an object of quotes, got {}", json_kind(other)),
            )),
        }
    }
}

pub(crate) fn json_kind(v: &Value) -> &'static str {
    match v {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
