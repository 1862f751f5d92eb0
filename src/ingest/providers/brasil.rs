// src/ingest/providers/brasil.rs
//! Economic rates and the bank registry (BrasilAPI).

use serde_json::Value;
use tracing::{info, warn};

use super::awesome::json_kind;
use super::{get_json, join_url, FetchError};
use crate::model::IndicatorKind;

pub const DEFAULT_BASE_URL: &str = "https://brasilapi.com.br/api";

pub struct BrasilApi {
    client: reqwest::Client,
    base_url: String,
}

/// Everything one BrasilAPI pass returns; each endpoint fails on its own.
#[derive(Debug)]
pub struct BrasilSnapshot {
    pub rates: Vec<(IndicatorKind, Result<Vec<Value>, FetchError>)>,
    pub banks: Result<Vec<Value>, FetchError>,
}

impl BrasilApi {
    pub fn new(client: reqwest::Client, base_url: &str) -> Self {
        Self {
            client,
            base_url: base_url.to_string(),
        }
    }

    /// Rate rows for one indicator. The endpoint answers either a single
    /// `{nome, valor}` object (current rate) or an array of dated rows.
    pub async fn fetch_rate(&self, kind: IndicatorKind) -> Result<Vec<Value>, FetchError> {
        let endpoint = join_url(&self.base_url, &format!("taxas/v1/{}", kind.slug()));
        match get_json(&self.client, &endpoint, &[]).await? {
            Value::Array(rows) => Ok(rows),
            obj @ Value::Object(_) => Ok(vec![obj]),
            other => Err(FetchError::schema(
                &endpoint,
                format!("expected rate object or array, got {}", json_kind(&other)),
            )),
        }
    }

    pub async fn fetch_banks(&self) -> Result<Vec<Value>, FetchError> {
        let endpoint = join_url(&self.base_url, "banks/v1");
        match get_json(&self.client, &endpoint, &[]).await? {
            Value::Array(rows) => Ok(rows),
            other => Err(FetchError::schema(
                &endpoint,
                format!("expected an array of banks, got {}", json_kind(&other)),
            )),
        }
    }

    /// Sequential pass over SELIC, CDI, IPCA and the bank list.
    pub async fn fetch_all(&self) -> BrasilSnapshot {
        let mut rates = Vec::with_capacity(IndicatorKind::ALL.len());
        for kind in IndicatorKind::ALL {
            let res = self.fetch_rate(kind).await;
            match &res {
                Ok(rows) => {
                    info!(target: "ingest", indicator = %kind, rows = rows.len(), "rate fetched")
                }
                Err(e) => {
                    warn!(target: "ingest", indicator = %kind, error = %e, "rate fetch failed")
                }
            }
            rates.push((kind, res));
        }

        let banks = self.fetch_banks().await;
        match &banks {
            Ok(rows) => info!(target: "ingest", banks = rows.len(), "bank registry fetched"),
            Err(e) => warn!(target: "ingest", error = %e, "bank registry fetch failed"),
        }

        BrasilSnapshot { rates, banks }
    }
}
