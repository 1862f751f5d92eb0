// src/store/mod.rs
//! Generic document store used by the collector and the API.
//!
//! Documents are JSON bodies wrapped in a [`StoredDoc`] envelope (id, optional
//! idempotency key, timestamps). Two backends ship: [`MemoryStore`] and the
//! JSON-lines [`FileStore`].

pub mod file;
pub mod memory;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::cmp::Ordering;
use std::sync::Arc;
use uuid::Uuid;

pub use file::FileStore;
pub use memory::MemoryStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Collection {
    Quotes,
    Indicators,
    Banks,
    News,
    Queries,
}

impl Collection {
    pub const ALL: [Collection; 5] = [
        Collection::Quotes,
        Collection::Indicators,
        Collection::Banks,
        Collection::News,
        Collection::Queries,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Collection::Quotes => "quotes",
            Collection::Indicators => "indicators",
            Collection::Banks => "banks",
            Collection::News => "news",
            Collection::Queries => "queries",
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("store unavailable: {0}")]
    Unavailable(String),
    #[error("duplicate key `{key}` in {collection}")]
    DuplicateKey {
        collection: &'static str,
        key: String,
    },
    #[error("no document with key `{key}` in {collection}")]
    NotFound {
        collection: &'static str,
        key: String,
    },
    #[error("unsupported store url `{0}` (expected memory:// or file://<dir>)")]
    UnsupportedUrl(String),
    #[error("store io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("malformed document: {0}")]
    Malformed(#[from] serde_json::Error),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredDoc {
    pub id: Uuid,
    pub key: Option<String>,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
    pub body: Value,
}

impl StoredDoc {
    pub fn new(key: Option<String>, body: Value) -> Self {
        Self {
            id: Uuid::new_v4(),
            key,
            created_at: Utc::now(),
            updated_at: None,
            body,
        }
    }

    /// Body plus `id`/`createdAt`, the shape the API hands out.
    pub fn to_json(&self) -> Value {
        let mut out = self.body.clone();
        if let Value::Object(map) = &mut out {
            map.insert("id".into(), Value::String(self.id.to_string()));
            map.insert(
                "createdAt".into(),
                Value::String(self.created_at.to_rfc3339()),
            );
            if let Some(ts) = self.updated_at {
                map.insert("updatedAt".into(), Value::String(ts.to_rfc3339()));
            }
        }
        out
    }
}

/// Equality filter + ordering + limit.
#[derive(Debug, Clone, Default)]
pub struct FindOptions {
    /// (dotted path, expected value) pairs, all must match.
    pub filter: Vec<(String, Value)>,
    /// Sort descending by this body field; `None` sorts by creation, newest first.
    pub sort_desc_by: Option<String>,
    pub limit: Option<usize>,
}

impl FindOptions {
    pub fn newest(limit: usize) -> Self {
        Self {
            limit: Some(limit),
            ..Self::default()
        }
    }

    pub fn sorted_by(field: &str, limit: usize) -> Self {
        Self {
            sort_desc_by: Some(field.to_string()),
            limit: Some(limit),
            ..Self::default()
        }
    }

    pub fn with_filter(mut self, path: &str, value: Value) -> Self {
        self.filter.push((path.to_string(), value));
        self
    }

    fn matches(&self, doc: &StoredDoc) -> bool {
        self.filter
            .iter()
            .all(|(path, expected)| field_at(&doc.body, path) == Some(expected))
    }
}

#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Establish the connection (load state, create dirs). Idempotent.
    async fn connect(&self) -> Result<(), StoreError>;
    async fn find_by_key(
        &self,
        collection: Collection,
        key: &str,
    ) -> Result<Option<StoredDoc>, StoreError>;
    /// Fails with [`StoreError::DuplicateKey`] when `key` is already present.
    async fn insert(
        &self,
        collection: Collection,
        key: Option<String>,
        body: Value,
    ) -> Result<StoredDoc, StoreError>;
    /// Overwrite the body of the document holding `key`, keeping id and creation time.
    async fn replace(
        &self,
        collection: Collection,
        key: &str,
        body: Value,
    ) -> Result<StoredDoc, StoreError>;
    async fn count(&self, collection: Collection) -> Result<usize, StoreError>;
    async fn find(
        &self,
        collection: Collection,
        opts: &FindOptions,
    ) -> Result<Vec<StoredDoc>, StoreError>;
}

pub type SharedStore = Arc<dyn DocumentStore>;

/// Open a store from a connection url: `memory://` or `file://<dir>`.
pub fn open_store(url: &str) -> Result<SharedStore, StoreError> {
    let url = url.trim();
    if url == "memory://" || url == "memory" {
        return Ok(Arc::new(MemoryStore::new()));
    }
    if let Some(dir) = url.strip_prefix("file://") {
        if dir.is_empty() {
            return Err(StoreError::UnsupportedUrl(url.to_string()));
        }
        return Ok(Arc::new(FileStore::new(dir)));
    }
    Err(StoreError::UnsupportedUrl(url.to_string()))
}

/// Resolve a dotted path ("source.name") inside a JSON body.
pub(crate) fn field_at<'a>(body: &'a Value, path: &str) -> Option<&'a Value> {
    path.split('.').try_fold(body, |cur, seg| cur.get(seg))
}

fn compare_fields(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    match (a, b) {
        (Some(Value::Number(x)), Some(Value::Number(y))) => x
            .as_f64()
            .partial_cmp(&y.as_f64())
            .unwrap_or(Ordering::Equal),
        (Some(Value::String(x)), Some(Value::String(y))) => x.cmp(y),
        (Some(_), None) => Ordering::Greater,
        (None, Some(_)) => Ordering::Less,
        _ => Ordering::Equal,
    }
}

/// Shared query evaluation for the backends: newest insert wins ties.
pub(crate) fn select(rows: &[StoredDoc], opts: &FindOptions) -> Vec<StoredDoc> {
    let mut hits: Vec<&StoredDoc> = rows.iter().rev().filter(|d| opts.matches(d)).collect();
    match &opts.sort_desc_by {
        Some(field) => hits.sort_by(|a, b| {
            compare_fields(field_at(&b.body, field), field_at(&a.body, field))
        }),
        None => hits.sort_by(|a, b| b.created_at.cmp(&a.created_at)),
    }
    let limit = opts.limit.unwrap_or(usize::MAX);
    hits.into_iter().take(limit).cloned().collect()
}
