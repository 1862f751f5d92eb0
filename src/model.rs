// src/model.rs
//! Canonical records persisted by the collection pipeline and the chat gateway.
//!
//! Every ingested record (quote, indicator, bank, news article) carries an
//! idempotency key computed from a fixed subset of its fields, so the same
//! upstream payload always maps to the same key.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

/// Joins key parts; never appears in upstream text, so ("ab","c") != ("a","bc").
const KEY_SEPARATOR: u8 = 0x1f;

/// Hex-encoded sha256 over the given parts.
pub fn idempotency_key(parts: &[&str]) -> String {
    let mut hasher = Sha256::new();
    for (i, part) in parts.iter().enumerate() {
        if i > 0 {
            hasher.update([KEY_SEPARATOR]);
        }
        hasher.update(part.as_bytes());
    }
    let digest = hasher.finalize();
    let mut out = String::with_capacity(64);
    for b in digest.iter() {
        use std::fmt::Write as _;
        let _ = write!(&mut out, "{:02x}", b);
    }
    out
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Quote {
    pub code: String, // e.g. "USD"
    pub codein: String,
    pub name: String,
    pub high: f64,
    pub low: f64,
    pub var_bid: f64,
    pub pct_change: f64,
    pub bid: f64,
    pub ask: f64,
    /// Upstream unix seconds, kept as received.
    pub timestamp: i64,
    pub create_date: DateTime<Utc>,
}

impl Quote {
    pub fn idempotency_key(&self) -> String {
        idempotency_key(&[
            &self.code,
            &self.timestamp.to_string(),
            &self.bid.to_string(),
            &self.ask.to_string(),
        ])
    }

    /// Pair label like "USD-BRL".
    pub fn pair(&self) -> String {
        format!("{}-{}", self.code, self.codein)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum IndicatorKind {
    Selic,
    Cdi,
    Ipca,
}

impl IndicatorKind {
    pub const ALL: [IndicatorKind; 3] =
        [IndicatorKind::Selic, IndicatorKind::Cdi, IndicatorKind::Ipca];

    pub fn as_str(&self) -> &'static str {
        match self {
            IndicatorKind::Selic => "SELIC",
            IndicatorKind::Cdi => "CDI",
            IndicatorKind::Ipca => "IPCA",
        }
    }

    /// Path segment used by the rates endpoint.
    pub fn slug(&self) -> &'static str {
        match self {
            IndicatorKind::Selic => "selic",
            IndicatorKind::Cdi => "cdi",
            IndicatorKind::Ipca => "ipca",
        }
    }
}

impl fmt::Display for IndicatorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Indicator {
    pub kind: IndicatorKind,
    pub value: f64,
    pub date: NaiveDate,
}

impl Indicator {
    /// Natural key: one row per (kind, date); a revised value refreshes it.
    pub fn idempotency_key(&self) -> String {
        idempotency_key(&[self.kind.as_str(), &self.date.to_string()])
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Bank {
    /// National registry id; the mapper falls back to `code` when absent.
    pub ispb: String,
    pub name: String,
    pub full_name: String,
    pub code: Option<String>,
}

impl Bank {
    pub fn idempotency_key(&self) -> String {
        self.ispb.clone()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewsOutlet {
    pub id: Option<String>,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewsArticle {
    pub title: String,
    pub description: String,
    pub content: String,
    pub url: String,
    pub url_to_image: Option<String>,
    pub author: Option<String>,
    pub published_at: DateTime<Utc>,
    pub source: NewsOutlet,
    /// Search term that surfaced the article.
    pub query: String,
    pub language: String,
}

impl NewsArticle {
    pub fn idempotency_key(&self) -> String {
        idempotency_key(&[&self.title, &self.url, &self.published_at.to_rfc3339()])
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryKind {
    Consult,
    Analysis,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    #[serde(default)]
    pub prompt_tokens: u32,
    #[serde(default)]
    pub completion_tokens: u32,
    #[serde(default)]
    pub total_tokens: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryMetadata {
    pub kind: QueryKind,
    pub client_ip: Option<String>,
    pub user_agent: Option<String>,
}

/// One LLM interaction. Append-only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryRecord {
    pub prompt: String,
    pub response: String,
    pub model: String,
    pub tokens: TokenUsage,
    pub requester: String,
    pub timestamp: DateTime<Utc>,
    pub metadata: QueryMetadata,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_is_stable_and_order_sensitive() {
        let a = idempotency_key(&["USD", "1712345678", "5.1", "5.2"]);
        let b = idempotency_key(&["USD", "1712345678", "5.1", "5.2"]);
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
        assert_ne!(a, idempotency_key(&["1712345678", "USD", "5.1", "5.2"]));
    }

    #[test]
    fn key_separator_prevents_concatenation_collisions() {
        assert_ne!(idempotency_key(&["ab", "c"]), idempotency_key(&["a", "bc"]));
    }

    #[test]
    fn indicator_key_ignores_value() {
        let date = NaiveDate::from_ymd_opt(2025, 3, 1).unwrap();
        let a = Indicator { kind: IndicatorKind::Selic, value: 10.5, date };
        let b = Indicator { kind: IndicatorKind::Selic, value: 10.75, date };
        assert_eq!(a.idempotency_key(), b.idempotency_key());
        let c = Indicator { kind: IndicatorKind::Cdi, value: 10.5, date };
        assert_ne!(a.idempotency_key(), c.idempotency_key());
    }

    #[test]
    fn indicator_kind_serializes_uppercase() {
        let v = serde_json::to_value(IndicatorKind::Ipca).unwrap();
        assert_eq!(v, serde_json::json!("IPCA"));
    }
}
