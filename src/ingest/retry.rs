// src/ingest/retry.rs
//! Batched news collection with per-query retry and backoff.
//!
//! Queries run in fixed-size batches (all requests of a batch in flight at
//! once) with a pause between batches. A query that keeps failing ends up as
//! a [`QueryOutcome::Failed`] entry; it never aborts the rest of the run.

use futures::future::join_all;
use metrics::counter;
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::future::Future;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{info, warn};

use crate::ingest::config::NewsQuery;
use crate::ingest::providers::{FetchError, NewsApi};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts per query, first one included.
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub batch_size: usize,
    pub batch_pause: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff: Duration::from_millis(1_000),
            batch_size: 5,
            batch_pause: Duration::from_secs(1),
        }
    }
}

/// Run `op` until it succeeds, fails with a non-retryable error, or
/// `max_attempts` is reached. Returns the value or the last error, plus the
/// number of attempts made.
///
/// Rate limits (429) wait twice the current backoff and carry that wait
/// forward; other retryable failures wait the current backoff, then double it.
pub async fn retry_with_backoff<T, F, Fut>(
    policy: &RetryPolicy,
    label: &str,
    mut op: F,
) -> Result<(T, u32), (FetchError, u32)>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, FetchError>>,
{
    let mut backoff = policy.initial_backoff;
    let mut attempt = 0u32;
    loop {
        attempt += 1;
        counter!("news_fetch_attempts_total").increment(1);
        let err = match op().await {
            Ok(v) => return Ok((v, attempt)),
            Err(e) => e,
        };

        if attempt >= policy.max_attempts.max(1) || !err.is_retryable() {
            return Err((err, attempt));
        }

        let rate_limited = err.is_rate_limited();
        let wait = if rate_limited { backoff * 2 } else { backoff };
        warn!(
            target: "news",
            query = label,
            attempt,
            rate_limited,
            wait_ms = wait.as_millis() as u64,
            error = %err,
            "news request failed, retrying"
        );
        tokio::time::sleep(wait).await;
        backoff = if rate_limited { wait } else { backoff * 2 };
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum QueryOutcome {
    #[serde(rename_all = "camelCase")]
    Fetched {
        query: String,
        language: String,
        total_results: u64,
        articles: Vec<Value>,
        attempts: u32,
    },
    Failed {
        query: String,
        language: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        status: Option<u16>,
        message: String,
        attempts: u32,
    },
}

impl QueryOutcome {
    pub fn attempts(&self) -> u32 {
        match self {
            QueryOutcome::Fetched { attempts, .. } | QueryOutcome::Failed { attempts, .. } => {
                *attempts
            }
        }
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, QueryOutcome::Failed { .. })
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NewsRunSummary {
    pub total_queries: usize,
    pub failed_queries: usize,
    pub total_articles: usize,
    pub execution_time_seconds: f64,
}

/// Outcome of one batch run, keyed by `"<term>_<language>"`.
#[derive(Debug, Clone, Serialize)]
pub struct NewsBatchReport {
    pub results: BTreeMap<String, QueryOutcome>,
    #[serde(skip)]
    pub elapsed: Duration,
}

impl NewsBatchReport {
    pub fn summary(&self) -> NewsRunSummary {
        NewsRunSummary {
            total_queries: self.results.len(),
            failed_queries: self.results.values().filter(|o| o.is_failed()).count(),
            total_articles: self.articles().count(),
            execution_time_seconds: (self.elapsed.as_secs_f64() * 100.0).round() / 100.0,
        }
    }

    /// (raw article, search term, language) for every fetched article.
    pub fn articles(&self) -> impl Iterator<Item = (&Value, &str, &str)> {
        self.results.values().flat_map(|o| match o {
            QueryOutcome::Fetched {
                query,
                language,
                articles,
                ..
            } => articles
                .iter()
                .map(|a| (a, query.as_str(), language.as_str()))
                .collect::<Vec<_>>(),
            QueryOutcome::Failed { .. } => Vec::new(),
        })
    }
}

async fn fetch_one(api: &NewsApi, q: &NewsQuery, policy: &RetryPolicy) -> QueryOutcome {
    let label = q.key();
    match retry_with_backoff(policy, &label, || api.search(q)).await {
        Ok((page, attempts)) => {
            info!(
                target: "news",
                query = %q.term,
                language = %q.language,
                total = page.total_results,
                attempts,
                "news query fetched"
            );
            QueryOutcome::Fetched {
                query: q.term.clone(),
                language: q.language.clone(),
                total_results: page.total_results,
                articles: page.articles,
                attempts,
            }
        }
        Err((err, attempts)) => {
            counter!("news_fetch_failures_total").increment(1);
            warn!(
                target: "news",
                query = %q.term,
                language = %q.language,
                attempts,
                error = %err,
                "news query gave up"
            );
            QueryOutcome::Failed {
                query: q.term.clone(),
                language: q.language.clone(),
                status: err.status(),
                message: err.message(),
                attempts,
            }
        }
    }
}

/// Map `items` through `op` in batches of `policy.batch_size`. A batch is
/// in flight together; `policy.batch_pause` separates batches, none after
/// the last. Outputs keep the input order.
pub async fn for_each_batch<'a, I, O, F, Fut>(
    items: &'a [I],
    policy: &RetryPolicy,
    mut op: F,
) -> Vec<O>
where
    F: FnMut(&'a I) -> Fut,
    Fut: Future<Output = O>,
{
    let batch_size = policy.batch_size.max(1);
    let batches = items.len().div_ceil(batch_size);
    let mut out = Vec::with_capacity(items.len());
    for (i, batch) in items.chunks(batch_size).enumerate() {
        out.extend(join_all(batch.iter().map(&mut op)).await);
        if i + 1 < batches {
            tokio::time::sleep(policy.batch_pause).await;
        }
    }
    out
}

/// Run every news query through [`for_each_batch`] with per-query retry.
pub async fn run_batches(
    api: &NewsApi,
    queries: &[NewsQuery],
    policy: &RetryPolicy,
) -> NewsBatchReport {
    let started = Instant::now();
    let outcomes = for_each_batch(queries, policy, |q| fetch_one(api, q, policy)).await;
    let results: BTreeMap<String, QueryOutcome> = queries
        .iter()
        .zip(outcomes)
        .map(|(q, outcome)| (q.key(), outcome))
        .collect();

    let report = NewsBatchReport {
        results,
        elapsed: started.elapsed(),
    };
    let s = report.summary();
    info!(
        target: "news",
        queries = s.total_queries,
        failed = s.failed_queries,
        articles = s.total_articles,
        secs = s.execution_time_seconds,
        "news batch run finished"
    );
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn status(code: u16) -> FetchError {
        FetchError::Status {
            endpoint: "https://newsapi.org/v2/everything".into(),
            status: code,
            message: "scripted".into(),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn rate_limit_waits_double_backoff_and_stops_after_three() {
        let policy = RetryPolicy::default();
        let calls = AtomicU32::new(0);
        let started = Instant::now();

        let res: Result<((), u32), _> = retry_with_backoff(&policy, "Selic_pt", || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(status(429)) }
        })
        .await;

        let (err, attempts) = res.unwrap_err();
        assert_eq!(attempts, 3);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert!(err.is_rate_limited());
        // 2s before attempt 2, 4s before attempt 3.
        assert!(started.elapsed() >= Duration::from_millis(6_000));
    }

    #[tokio::test(start_paused = true)]
    async fn first_wait_after_429_is_twice_initial_backoff() {
        let policy = RetryPolicy::default();
        let calls = AtomicU32::new(0);
        let started = Instant::now();
        let mut second_attempt_at = None;

        let res = retry_with_backoff(&policy, "PIB_pt", || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            if n == 1 {
                second_attempt_at = Some(started.elapsed());
            }
            async move {
                if n == 0 {
                    Err(status(429))
                } else {
                    Ok("page")
                }
            }
        })
        .await;

        assert_eq!(res.unwrap(), ("page", 2));
        assert!(second_attempt_at.unwrap() >= policy.initial_backoff * 2);
    }

    #[tokio::test(start_paused = true)]
    async fn network_errors_back_off_exponentially() {
        let policy = RetryPolicy::default();
        let started = Instant::now();
        let res: Result<((), u32), _> = retry_with_backoff(&policy, "q", || async {
            Err(FetchError::Network {
                endpoint: "x".into(),
                message: "reset".into(),
            })
        })
        .await;
        assert_eq!(res.unwrap_err().1, 3);
        // 1s + 2s
        let e = started.elapsed();
        assert!(e >= Duration::from_millis(3_000) && e < Duration::from_millis(4_000));
    }

    #[tokio::test(start_paused = true)]
    async fn client_errors_are_not_retried() {
        let policy = RetryPolicy::default();
        let calls = AtomicU32::new(0);
        let res: Result<((), u32), _> = retry_with_backoff(&policy, "q", || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(status(401)) }
        })
        .await;
        assert_eq!(res.unwrap_err().1, 1);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn batches_cap_in_flight_and_pause_only_between_batches() {
        let policy = RetryPolicy::default();
        let op_time = Duration::from_millis(300);
        let in_flight = AtomicU32::new(0);
        let peak = AtomicU32::new(0);
        let started = Instant::now();
        let items: Vec<u32> = (0..12).collect();

        let out = for_each_batch(&items, &policy, |n| {
            let (in_flight, peak) = (&in_flight, &peak);
            async move {
                let now = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                let began = started.elapsed();
                tokio::time::sleep(op_time).await;
                in_flight.fetch_sub(1, Ordering::SeqCst);
                (*n, began)
            }
        })
        .await;

        assert_eq!(peak.load(Ordering::SeqCst), 5);
        // 12 items → batches of 5, 5, 2: two pauses, none trailing
        assert_eq!(started.elapsed(), op_time * 3 + policy.batch_pause * 2);
        assert_eq!(out.iter().map(|(n, _)| *n).collect::<Vec<_>>(), items);
        let second_batch = op_time + policy.batch_pause;
        assert_eq!(out[4].1, Duration::ZERO);
        assert_eq!(out[5].1, second_batch);
        assert_eq!(out[11].1, second_batch * 2);
    }

    #[tokio::test(start_paused = true)]
    async fn single_batch_has_no_pause() {
        let policy = RetryPolicy::default();
        let started = Instant::now();
        let out = for_each_batch(&[1, 2, 3], &policy, |n| async move { n * 2 }).await;
        assert_eq!(out, vec![2, 4, 6]);
        assert_eq!(started.elapsed(), Duration::ZERO);
    }

    #[test]
    fn report_counts_articles_and_failures() {
        let mut results = BTreeMap::new();
        results.insert(
            "Selic_pt".to_string(),
            QueryOutcome::Fetched {
                query: "Selic".into(),
                language: "pt".into(),
                total_results: 40,
                articles: vec![serde_json::json!({}), serde_json::json!({})],
                attempts: 1,
            },
        );
        results.insert(
            "PIB_pt".to_string(),
            QueryOutcome::Failed {
                query: "PIB".into(),
                language: "pt".into(),
                status: Some(429),
                message: "rateLimited".into(),
                attempts: 3,
            },
        );
        let report = NewsBatchReport {
            results,
            elapsed: Duration::from_millis(1_234),
        };
        let s = report.summary();
        assert_eq!(s.total_queries, 2);
        assert_eq!(s.failed_queries, 1);
        assert_eq!(s.total_articles, 2);
        assert_eq!(s.execution_time_seconds, 1.23);

        let v = serde_json::to_value(&report).unwrap();
        assert_eq!(v["results"]["PIB_pt"]["outcome"], "failed");
        assert_eq!(v["results"]["Selic_pt"]["totalResults"], 40);
    }
}
