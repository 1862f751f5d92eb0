// src/store/file.rs
//! JSON-lines backend: one `<collection>.jsonl` file per collection.
//! Inserts append a line; replacements rewrite the file through a temp file + rename.
//! The in-memory working set only changes once the disk write succeeded.

use async_trait::async_trait;
use serde_json::Value;
use std::fs::{self, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::{debug, warn};

use super::memory::{replace_in, Tables};
use super::{select, Collection, DocumentStore, FindOptions, StoreError, StoredDoc};

pub struct FileStore {
    dir: PathBuf,
    tables: Mutex<Option<Tables>>,
}

impl FileStore {
    pub fn new<P: AsRef<Path>>(dir: P) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
            tables: Mutex::new(None),
        }
    }

    fn path_for(&self, collection: Collection) -> PathBuf {
        self.dir.join(format!("{}.jsonl", collection.name()))
    }

    fn load_collection(&self, collection: Collection) -> Result<Vec<StoredDoc>, StoreError> {
        let path = self.path_for(collection);
        if !path.exists() {
            return Ok(Vec::new());
        }
        let reader = BufReader::new(fs::File::open(&path)?);
        let mut rows = Vec::new();
        for (n, line) in reader.lines().enumerate() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<StoredDoc>(&line) {
                Ok(doc) => rows.push(doc),
                Err(e) => warn!(
                    target: "store",
                    file = %path.display(),
                    line = n + 1,
                    error = %e,
                    "skipping malformed document"
                ),
            }
        }
        Ok(rows)
    }

    fn append(&self, collection: Collection, doc: &StoredDoc) -> Result<(), StoreError> {
        let mut line = serde_json::to_string(doc)?;
        line.push('\n');
        let mut f = OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.path_for(collection))?;
        f.write_all(line.as_bytes())?;
        Ok(())
    }

    fn rewrite(&self, collection: Collection, rows: &[StoredDoc]) -> Result<(), StoreError> {
        let path = self.path_for(collection);
        let tmp = path.with_extension("jsonl.tmp");
        let mut buf = String::new();
        for doc in rows {
            buf.push_str(&serde_json::to_string(doc)?);
            buf.push('\n');
        }
        let mut f = fs::File::create(&tmp)?;
        f.write_all(buf.as_bytes())?;
        fs::rename(tmp, path)?;
        Ok(())
    }

    fn with_tables<T>(
        &self,
        f: impl FnOnce(&mut Tables) -> Result<T, StoreError>,
    ) -> Result<T, StoreError> {
        let mut guard = self
            .tables
            .lock()
            .map_err(|_| StoreError::Unavailable("file store lock poisoned".into()))?;
        match guard.as_mut() {
            Some(tables) => f(tables),
            None => Err(StoreError::Unavailable(format!(
                "file store at {} is not connected",
                self.dir.display()
            ))),
        }
    }
}

#[async_trait]
impl DocumentStore for FileStore {
    async fn connect(&self) -> Result<(), StoreError> {
        let mut guard = self
            .tables
            .lock()
            .map_err(|_| StoreError::Unavailable("file store lock poisoned".into()))?;
        if guard.is_some() {
            return Ok(());
        }
        fs::create_dir_all(&self.dir).map_err(|e| {
            StoreError::Unavailable(format!("cannot open {}: {e}", self.dir.display()))
        })?;
        let mut tables = Tables::default();
        for c in Collection::ALL {
            let rows = self.load_collection(c)?;
            debug!(target: "store", collection = c.name(), rows = rows.len(), "loaded");
            tables.load(c, rows);
        }
        *guard = Some(tables);
        Ok(())
    }

    async fn find_by_key(
        &self,
        collection: Collection,
        key: &str,
    ) -> Result<Option<StoredDoc>, StoreError> {
        self.with_tables(|t| Ok(t.find_by_key(collection, key).cloned()))
    }

    async fn insert(
        &self,
        collection: Collection,
        key: Option<String>,
        body: Value,
    ) -> Result<StoredDoc, StoreError> {
        self.with_tables(|t| {
            let doc = t.prepare_insert(collection, key, body)?;
            self.append(collection, &doc)?;
            t.push(collection, doc.clone());
            Ok(doc)
        })
    }

    async fn replace(
        &self,
        collection: Collection,
        key: &str,
        body: Value,
    ) -> Result<StoredDoc, StoreError> {
        self.with_tables(|t| {
            let mut rows = t.rows(collection).to_vec();
            let doc = replace_in(&mut rows, collection, key, body)?;
            self.rewrite(collection, &rows)?;
            t.load(collection, rows);
            Ok(doc)
        })
    }

    async fn count(&self, collection: Collection) -> Result<usize, StoreError> {
        self.with_tables(|t| Ok(t.rows(collection).len()))
    }

    async fn find(
        &self,
        collection: Collection,
        opts: &FindOptions,
    ) -> Result<Vec<StoredDoc>, StoreError> {
        self.with_tables(|t| Ok(select(t.rows(collection), opts)))
    }
}
