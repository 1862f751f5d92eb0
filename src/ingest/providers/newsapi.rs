// src/ingest/providers/newsapi.rs
//! News search (NewsAPI `everything`). One request per (term, language).

use serde::Serialize;
use serde_json::Value;

use super::awesome::json_kind;
use super::{get_json, join_url, FetchError};
use crate::ingest::config::NewsQuery;

pub const DEFAULT_BASE_URL: &str = "https://newsapi.org/v2";

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NewsPage {
    pub total_results: u64,
    pub articles: Vec<Value>,
}

pub struct NewsApi {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl NewsApi {
    pub fn new(client: reqwest::Client, base_url: &str, api_key: &str) -> Self {
        Self {
            client,
            base_url: base_url.to_string(),
            api_key: api_key.to_string(),
        }
    }

    pub fn has_key(&self) -> bool {
        !self.api_key.trim().is_empty()
    }

    pub async fn search(&self, query: &NewsQuery) -> Result<NewsPage, FetchError> {
        if !self.has_key() {
            return Err(FetchError::MissingKey("news"));
        }
        let endpoint = join_url(&self.base_url, "everything");
        let body = get_json(
            &self.client,
            &endpoint,
            &[
                ("q", query.term.as_str()),
                ("language", query.language.as_str()),
                ("apiKey", self.api_key.as_str()),
            ],
        )
        .await?;
        parse_page(&endpoint, body)
    }
}

fn parse_page(endpoint: &str, body: Value) -> Result<NewsPage, FetchError> {
    let Value::Object(mut map) = body else {
        return Err(FetchError::schema(endpoint, "expected a JSON object"));
    };
    let articles = match map.remove("articles") {
        Some(Value::Array(items)) => items,
        Some(other) => {
            return Err(FetchError::schema(
                endpoint,
                format!("`articles` should be an array, got {}", json_kind(&other)),
            ))
        }
        None => return Err(FetchError::schema(endpoint, "missing `articles`")),
    };
    let total_results = map
        .get("totalResults")
        .and_then(Value::as_u64)
        .unwrap_or(articles.len() as u64);
    Ok(NewsPage {
        total_results,
        articles,
    })
}
