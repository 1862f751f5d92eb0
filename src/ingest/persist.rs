// src/ingest/persist.rs
//! Map raw upstream rows and write them idempotently.
//!
//! Quotes and news are insert-or-skip. Indicators and banks are keyed by
//! their natural key and refreshed in place when the key already exists.
//! One bad row only bumps `errors`; the rest of the payload is still saved.

use chrono::NaiveDate;
use metrics::counter;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use crate::ingest::mapping::{bank_from, indicator_from, news_from, quote_from, Rejection};
use crate::model::IndicatorKind;
use crate::store::{Collection, DocumentStore, StoreError};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SaveCounts {
    pub added: u64,
    pub skipped: u64,
    pub updated: u64,
    pub errors: u64,
}

impl SaveCounts {
    pub fn failed() -> Self {
        Self {
            errors: 1,
            ..Self::default()
        }
    }

    pub fn merge(&mut self, other: SaveCounts) {
        self.added += other.added;
        self.skipped += other.skipped;
        self.updated += other.updated;
        self.errors += other.errors;
    }

    fn record(&mut self, entity: &'static str, outcome: Outcome) {
        let label = match outcome {
            Outcome::Added => {
                self.added += 1;
                "added"
            }
            Outcome::Skipped => {
                self.skipped += 1;
                "skipped"
            }
            Outcome::Updated => {
                self.updated += 1;
                "updated"
            }
        };
        counter!("collect_records_total", "entity" => entity, "outcome" => label).increment(1);
    }

    fn error(&mut self, entity: &'static str) {
        self.errors += 1;
        counter!("collect_records_total", "entity" => entity, "outcome" => "error").increment(1);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Outcome {
    Added,
    Skipped,
    Updated,
}

#[derive(Debug, thiserror::Error)]
enum RowError {
    #[error(transparent)]
    Rejected(#[from] Rejection),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("encode failed: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Insert unless the key is present. A concurrent insert of the same key
/// surfaces as `DuplicateKey` and is counted as a skip.
async fn insert_or_skip(
    store: &dyn DocumentStore,
    collection: Collection,
    key: String,
    body: Value,
) -> Result<Outcome, StoreError> {
    if store.find_by_key(collection, &key).await?.is_some() {
        return Ok(Outcome::Skipped);
    }
    match store.insert(collection, Some(key), body).await {
        Ok(_) => Ok(Outcome::Added),
        Err(StoreError::DuplicateKey { .. }) => Ok(Outcome::Skipped),
        Err(e) => Err(e),
    }
}

async fn insert_or_refresh(
    store: &dyn DocumentStore,
    collection: Collection,
    key: String,
    body: Value,
) -> Result<Outcome, StoreError> {
    match store.find_by_key(collection, &key).await? {
        Some(existing) if existing.body == body => Ok(Outcome::Skipped),
        Some(_) => {
            store.replace(collection, &key, body).await?;
            Ok(Outcome::Updated)
        }
        None => match store.insert(collection, Some(key.clone()), body.clone()).await {
            Ok(_) => Ok(Outcome::Added),
            Err(StoreError::DuplicateKey { .. }) => {
                store.replace(collection, &key, body).await?;
                Ok(Outcome::Updated)
            }
            Err(e) => Err(e),
        },
    }
}

fn tally(counts: &mut SaveCounts, entity: &'static str, res: Result<Outcome, RowError>) {
    match res {
        Ok(outcome) => counts.record(entity, outcome),
        Err(e) => {
            warn!(target: "collect", entity, error = %e, "record not saved");
            counts.error(entity);
        }
    }
}

/// `payload` is the quotes body: an object of pair → quote.
pub async fn save_quotes(store: &dyn DocumentStore, payload: &Value) -> SaveCounts {
    let mut counts = SaveCounts::default();
    let Some(map) = payload.as_object() else {
        warn!(target: "collect", "quotes payload is not an object");
        counts.error("quote");
        return counts;
    };
    for (pair, raw) in map {
        let res = async {
            let quote = quote_from(raw)?;
            let body = serde_json::to_value(&quote)?;
            Ok::<_, RowError>(
                insert_or_skip(store, Collection::Quotes, quote.idempotency_key(), body).await?,
            )
        }
        .await;
        if res.is_err() {
            debug!(target: "collect", pair = %pair, "quote row failed");
        }
        tally(&mut counts, "quote", res);
    }
    counts
}

/// Rows per indicator kind, as returned by the rates endpoint.
pub async fn save_indicators(
    store: &dyn DocumentStore,
    rows: &[(IndicatorKind, Vec<Value>)],
    today: NaiveDate,
) -> SaveCounts {
    let mut counts = SaveCounts::default();
    for (kind, items) in rows {
        for raw in items {
            let res = async {
                let ind = indicator_from(raw, *kind, today)?;
                let body = serde_json::to_value(&ind)?;
                let key = ind.idempotency_key();
                Ok::<_, RowError>(
                    insert_or_refresh(store, Collection::Indicators, key, body).await?,
                )
            }
            .await;
            tally(&mut counts, "indicator", res);
        }
    }
    counts
}

pub async fn save_banks(store: &dyn DocumentStore, rows: &[Value]) -> SaveCounts {
    let mut counts = SaveCounts::default();
    for raw in rows {
        let res = async {
            let bank = bank_from(raw)?;
            let body = serde_json::to_value(&bank)?;
            Ok::<_, RowError>(
                insert_or_refresh(store, Collection::Banks, bank.idempotency_key(), body).await?,
            )
        }
        .await;
        tally(&mut counts, "bank", res);
    }
    counts
}

/// `(raw article, search term, language)` triples.
pub async fn save_news<'a, I>(store: &dyn DocumentStore, articles: I) -> SaveCounts
where
    I: IntoIterator<Item = (&'a Value, &'a str, &'a str)>,
{
    let mut counts = SaveCounts::default();
    for (raw, query, language) in articles {
        let res = async {
            let article = news_from(raw, query, language)?;
            let body = serde_json::to_value(&article)?;
            Ok::<_, RowError>(
                insert_or_skip(store, Collection::News, article.idempotency_key(), body).await?,
            )
        }
        .await;
        tally(&mut counts, "news", res);
    }
    counts
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use serde_json::json;

    fn usd(bid: &str) -> Value {
        json!({"USDBRL": {
            "code": "USD", "codein": "BRL", "name": "Dólar",
            "bid": bid, "ask": "5.10", "timestamp": "1712345678"
        }})
    }

    #[tokio::test]
    async fn wrong_payload_shape_counts_one_error() {
        let store = MemoryStore::new();
        let c = save_quotes(&store, &json!([1, 2, 3])).await;
        assert_eq!(c, SaveCounts::failed());
    }

    #[tokio::test]
    async fn bad_row_does_not_stop_the_rest() {
        let store = MemoryStore::new();
        let payload = json!({
            "USDBRL": {
                "code": "USD", "codein": "BRL", "bid": "5.0", "ask": "5.1", "timestamp": "1"
            },
            "EURBRL": {"code": "EUR", "codein": "BRL", "ask": "6.1", "timestamp": "1"},
        });
        let c = save_quotes(&store, &payload).await;
        assert_eq!(c.added, 1);
        assert_eq!(c.errors, 1);
    }

    #[tokio::test]
    async fn changed_bid_is_a_new_quote() {
        let store = MemoryStore::new();
        assert_eq!(save_quotes(&store, &usd("5.00")).await.added, 1);
        assert_eq!(save_quotes(&store, &usd("5.01")).await.added, 1);
        assert_eq!(store.count(Collection::Quotes).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn indicator_revision_updates_in_place() {
        let store = MemoryStore::new();
        let today = NaiveDate::from_ymd_opt(2025, 4, 10).unwrap();
        let selic = |valor: &str| {
            vec![(IndicatorKind::Selic, vec![json!({"data": "01/04/2025", "valor": valor})])]
        };
        let first = selic("10.50");
        let revised = selic("10.75");

        assert_eq!(save_indicators(&store, &first, today).await.added, 1);
        assert_eq!(save_indicators(&store, &first, today).await.skipped, 1);
        let c = save_indicators(&store, &revised, today).await;
        assert_eq!(c.updated, 1);
        assert_eq!(c.added, 0);

        let rows = store
            .find(Collection::Indicators, &crate::store::FindOptions::newest(10))
            .await
            .unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].body["value"], json!(10.75));
    }
}
