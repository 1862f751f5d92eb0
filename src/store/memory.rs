// src/store/memory.rs
use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Mutex;

use super::{select, Collection, DocumentStore, FindOptions, StoreError, StoredDoc};

/// In-memory collections. Also the working set of [`super::FileStore`].
#[derive(Debug, Default)]
pub(crate) struct Tables {
    rows: HashMap<Collection, Vec<StoredDoc>>,
}

impl Tables {
    pub(crate) fn rows(&self, collection: Collection) -> &[StoredDoc] {
        self.rows.get(&collection).map(Vec::as_slice).unwrap_or(&[])
    }

    pub(crate) fn load(&mut self, collection: Collection, rows: Vec<StoredDoc>) {
        self.rows.insert(collection, rows);
    }

    pub(crate) fn find_by_key(&self, collection: Collection, key: &str) -> Option<&StoredDoc> {
        self.rows(collection)
            .iter()
            .find(|d| d.key.as_deref() == Some(key))
    }

    /// Build the document an insert would add, without adding it.
    pub(crate) fn prepare_insert(
        &self,
        collection: Collection,
        key: Option<String>,
        body: Value,
    ) -> Result<StoredDoc, StoreError> {
        if let Some(k) = key.as_deref() {
            if self.find_by_key(collection, k).is_some() {
                return Err(StoreError::DuplicateKey {
                    collection: collection.name(),
                    key: k.to_string(),
                });
            }
        }
        Ok(StoredDoc::new(key, body))
    }

    pub(crate) fn push(&mut self, collection: Collection, doc: StoredDoc) {
        self.rows.entry(collection).or_default().push(doc);
    }

    pub(crate) fn insert(
        &mut self,
        collection: Collection,
        key: Option<String>,
        body: Value,
    ) -> Result<StoredDoc, StoreError> {
        let doc = self.prepare_insert(collection, key, body)?;
        self.push(collection, doc.clone());
        Ok(doc)
    }

    pub(crate) fn replace(
        &mut self,
        collection: Collection,
        key: &str,
        body: Value,
    ) -> Result<StoredDoc, StoreError> {
        let rows = self.rows.entry(collection).or_default();
        replace_in(rows, collection, key, body)
    }
}

/// Overwrite the body of the row holding `key` in place.
pub(crate) fn replace_in(
    rows: &mut [StoredDoc],
    collection: Collection,
    key: &str,
    body: Value,
) -> Result<StoredDoc, StoreError> {
    let slot = rows
        .iter_mut()
        .find(|d| d.key.as_deref() == Some(key))
        .ok_or_else(|| StoreError::NotFound {
            collection: collection.name(),
            key: key.to_string(),
        })?;
    slot.body = body;
    slot.updated_at = Some(Utc::now());
    Ok(slot.clone())
}

pub struct MemoryStore {
    tables: Mutex<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            tables: Mutex::new(Tables::default()),
        }
    }

    fn with_tables<T>(&self, f: impl FnOnce(&mut Tables) -> T) -> Result<T, StoreError> {
        let mut guard = self
            .tables
            .lock()
            .map_err(|_| StoreError::Unavailable("memory store lock poisoned".into()))?;
        Ok(f(&mut guard))
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn connect(&self) -> Result<(), StoreError> {
        Ok(())
    }

    async fn find_by_key(
        &self,
        collection: Collection,
        key: &str,
    ) -> Result<Option<StoredDoc>, StoreError> {
        self.with_tables(|t| t.find_by_key(collection, key).cloned())
    }

    async fn insert(
        &self,
        collection: Collection,
        key: Option<String>,
        body: Value,
    ) -> Result<StoredDoc, StoreError> {
        self.with_tables(|t| t.insert(collection, key, body))?
    }

    async fn replace(
        &self,
        collection: Collection,
        key: &str,
        body: Value,
    ) -> Result<StoredDoc, StoreError> {
        self.with_tables(|t| t.replace(collection, key, body))?
    }

    async fn count(&self, collection: Collection) -> Result<usize, StoreError> {
        self.with_tables(|t| t.rows(collection).len())
    }

    async fn find(
        &self,
        collection: Collection,
        opts: &FindOptions,
    ) -> Result<Vec<StoredDoc>, StoreError> {
        self.with_tables(|t| select(t.rows(collection), opts))
    }
}
