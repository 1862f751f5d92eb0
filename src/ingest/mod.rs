// src/ingest/mod.rs
//! Collection pipeline: fetch every upstream source, map, persist, summarize.

pub mod config;
pub mod mapping;
pub mod persist;
pub mod providers;
pub mod retry;
pub mod snapshot;
pub mod types;

use anyhow::Context;
use chrono::{Local, Utc};
use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use once_cell::sync::OnceCell;
use std::path::PathBuf;
use std::time::{Duration, Instant};
use tracing::{error, info, warn};

use crate::config::AppConfig;
use crate::ingest::config::NewsQuery;
use crate::ingest::persist::SaveCounts;
use crate::ingest::providers::{AwesomeQuotes, BrasilApi, NewsApi};
use crate::ingest::retry::RetryPolicy;
use crate::ingest::types::{CollectionRunner, CollectionSummary, RunResults};
use crate::store::SharedStore;

/// One-time metrics registration (so series show up on /metrics).
pub(crate) fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!("collect_runs_total", "Collection runs, labelled by outcome.");
        describe_counter!(
            "collect_records_total",
            "Records processed per entity and outcome (added/skipped/updated/error)."
        );
        describe_counter!(
            "news_fetch_attempts_total",
            "News API requests issued, retries included."
        );
        describe_counter!(
            "news_fetch_failures_total",
            "News queries that gave up after retries."
        );
        describe_counter!("llm_calls_total", "LLM completions, labelled by outcome.");
        describe_gauge!("collect_last_run_ts", "Unix ts of the last collection run.");
        describe_histogram!("collect_duration_ms", "Collection run wall time in milliseconds.");
    });
}

/// Clean upstream text: decode entities, strip tags, ASCII quotes, collapse
/// whitespace, cap at `max_chars`.
pub fn normalize_text(s: &str, max_chars: usize) -> String {
    let mut out = html_escape::decode_html_entities(s).to_string();

    static RE_TAGS: OnceCell<regex::Regex> = OnceCell::new();
    if let Some(re) = RE_TAGS
        .get_or_try_init(|| regex::Regex::new(r"(?is)</?[a-z][^>]*>"))
        .ok()
    {
        out = re.replace_all(&out, "").into_owned();
    }

    out = out
        .replace(['\u{201C}', '\u{201D}', '\u{00AB}', '\u{00BB}'], "\"")
        .replace(['\u{2018}', '\u{2019}'], "'");

    // NewsAPI truncation marker: "... [+1234 chars]"
    static RE_TRUNC: OnceCell<regex::Regex> = OnceCell::new();
    if let Some(re) = RE_TRUNC
        .get_or_try_init(|| regex::Regex::new(r"\s*\[\+\d+ chars\]\s*$"))
        .ok()
    {
        out = re.replace(&out, "").into_owned();
    }

    out = out.split_whitespace().collect::<Vec<_>>().join(" ");

    if out.chars().count() > max_chars {
        out = out.chars().take(max_chars).collect();
    }
    out
}

/// Runs the three fetch+persist flows against one store.
pub struct Collector {
    store: SharedStore,
    quotes: AwesomeQuotes,
    brasil: BrasilApi,
    news: NewsApi,
    queries: Vec<NewsQuery>,
    policy: RetryPolicy,
    connect_timeout: Duration,
    snapshot_dir: Option<PathBuf>,
}

impl Collector {
    pub fn new(
        store: SharedStore,
        quotes: AwesomeQuotes,
        brasil: BrasilApi,
        news: NewsApi,
        queries: Vec<NewsQuery>,
    ) -> Self {
        Self {
            store,
            quotes,
            brasil,
            news,
            queries,
            policy: RetryPolicy::default(),
            connect_timeout: Duration::from_secs(30),
            snapshot_dir: None,
        }
    }

    /// Wire adapters from config; news queries come from
    /// `NEWS_QUERIES_PATH` / `config/news_queries.*` / built-ins.
    pub fn from_config(cfg: &AppConfig, store: SharedStore) -> anyhow::Result<Self> {
        let client = providers::build_http_client().context("building HTTP client")?;
        let queries = config::load_queries_default().context("loading news queries")?;
        let news_key = cfg.news_api_key.clone().unwrap_or_default();
        Ok(Self::new(
            store,
            AwesomeQuotes::new(client.clone(), &cfg.quotes_base_url, cfg.quote_pairs.clone()),
            BrasilApi::new(client.clone(), &cfg.brasil_api_base_url),
            NewsApi::new(client, &cfg.news_api_base_url, &news_key),
            queries,
        )
        .with_connect_timeout(cfg.store_connect_timeout)
        .with_snapshot_dir(cfg.news_snapshot_dir.clone()))
    }

    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn with_snapshot_dir(mut self, dir: Option<PathBuf>) -> Self {
        self.snapshot_dir = dir;
        self
    }

    async fn collect_quotes(&self) -> SaveCounts {
        match self.quotes.fetch_latest().await {
            Ok(body) => persist::save_quotes(self.store.as_ref(), &body).await,
            Err(e) => {
                error!(target: "collect", error = %e, "quote fetch failed");
                SaveCounts::failed()
            }
        }
    }

    /// (indicators, banks)
    async fn collect_brasil(&self) -> (SaveCounts, SaveCounts) {
        let snap = self.brasil.fetch_all().await;
        let today = Local::now().date_naive();

        let mut indicators = SaveCounts::default();
        let mut rows = Vec::with_capacity(snap.rates.len());
        for (kind, res) in snap.rates {
            match res {
                Ok(items) => rows.push((kind, items)),
                Err(e) => {
                    error!(
                        target: "collect",
                        indicator = %kind,
                        error = %e,
                        "indicator fetch failed"
                    );
                    indicators.merge(SaveCounts::failed());
                }
            }
        }
        indicators.merge(persist::save_indicators(self.store.as_ref(), &rows, today).await);

        let banks = match snap.banks {
            Ok(items) => persist::save_banks(self.store.as_ref(), &items).await,
            Err(e) => {
                error!(target: "collect", error = %e, "bank registry fetch failed");
                SaveCounts::failed()
            }
        };
        (indicators, banks)
    }

    async fn collect_news(&self) -> SaveCounts {
        if !self.news.has_key() {
            error!(target: "collect", "NEWS_API_KEY not configured; skipping news");
            return SaveCounts::failed();
        }
        let report = retry::run_batches(&self.news, &self.queries, &self.policy).await;

        if let Some(dir) = &self.snapshot_dir {
            match snapshot::write_news_snapshot(dir, &report, Utc::now()).await {
                Ok(path) => {
                    info!(target: "collect", path = %path.display(), "news snapshot written")
                }
                Err(e) => warn!(target: "collect", error = %e, "news snapshot failed"),
            }
        }

        let mut counts = persist::save_news(self.store.as_ref(), report.articles()).await;
        // Each query that gave up counts once.
        counts.errors += report.summary().failed_queries as u64;
        counts
    }

    /// One end-to-end collection run.
    pub async fn run(&self) -> CollectionSummary {
        ensure_metrics_described();
        let started = Instant::now();
        let timestamp = Utc::now();

        let connected = tokio::time::timeout(self.connect_timeout, self.store.connect()).await;
        let connect_err = match connected {
            Ok(Ok(())) => None,
            Ok(Err(e)) => Some(format!("store connection failed: {e}")),
            Err(_) => Some(format!(
                "store connection timed out after {}s",
                self.connect_timeout.as_secs()
            )),
        };
        if let Some(err) = connect_err {
            error!(target: "collect", error = %err, "collection aborted");
            counter!("collect_runs_total", "outcome" => "aborted").increment(1);
            return CollectionSummary {
                success: false,
                timestamp: timestamp.to_rfc3339(),
                results: RunResults::default(),
                error: Some(err),
            };
        }

        info!(target: "collect", "collection started");
        let (quotes, (indicators, banks), news) = tokio::join!(
            self.collect_quotes(),
            self.collect_brasil(),
            self.collect_news()
        );
        let results = RunResults {
            quotes,
            indicators,
            banks,
            news,
        };

        let elapsed_ms = started.elapsed().as_millis() as f64;
        counter!("collect_runs_total", "outcome" => "success").increment(1);
        gauge!("collect_last_run_ts").set(timestamp.timestamp() as f64);
        histogram!("collect_duration_ms").record(elapsed_ms);
        info!(
            target: "collect",
            quotes = results.quotes.added,
            indicators = results.indicators.added,
            banks = results.banks.added,
            news = results.news.added,
            elapsed_ms,
            "collection finished"
        );

        CollectionSummary {
            success: true,
            timestamp: timestamp.to_rfc3339(),
            results,
            error: None,
        }
    }
}

#[async_trait::async_trait]
impl CollectionRunner for Collector {
    async fn run_collection(&self) -> CollectionSummary {
        self.run().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_text_collapses_ws_and_decodes() {
        let s = "  Dólar&nbsp;&nbsp; sobe  <b>1%</b>  ";
        assert_eq!(normalize_text(s, 1500), "Dólar sobe 1%");
    }

    #[test]
    fn normalize_text_keeps_comparisons_and_punctuation() {
        assert_eq!(normalize_text("Selic > 10% e IPCA < 5%.", 100), "Selic > 10% e IPCA < 5%.");
    }

    #[test]
    fn normalize_text_drops_truncation_marker_and_caps() {
        assert_eq!(
            normalize_text("Mercado abre em alta… [+2310 chars]", 1500),
            "Mercado abre em alta…"
        );
        assert_eq!(normalize_text("abcdef", 3), "abc");
    }
}
