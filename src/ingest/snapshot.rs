// src/ingest/snapshot.rs
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde_json::json;
use std::path::{Path, PathBuf};

use crate::ingest::retry::NewsBatchReport;

/// `news_data_2025-04-10T08-00-00Z.json`; colons are not portable in file names.
pub fn snapshot_file_name(at: DateTime<Utc>) -> String {
    format!("news_data_{}.json", at.format("%Y-%m-%dT%H-%M-%SZ"))
}

/// Dump the raw batch report (results + summary) as pretty JSON.
pub async fn write_news_snapshot(
    dir: &Path,
    report: &NewsBatchReport,
    at: DateTime<Utc>,
) -> Result<PathBuf> {
    tokio::fs::create_dir_all(dir)
        .await
        .with_context(|| format!("creating snapshot dir {}", dir.display()))?;
    let path = dir.join(snapshot_file_name(at));
    let doc = json!({
        "timestamp": at.to_rfc3339(),
        "summary": report.summary(),
        "results": report.results,
    });
    let bytes = serde_json::to_vec_pretty(&doc)?;
    tokio::fs::write(&path, bytes)
        .await
        .with_context(|| format!("writing {}", path.display()))?;
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingest::retry::QueryOutcome;
    use chrono::TimeZone;
    use std::collections::BTreeMap;
    use std::time::Duration;

    #[tokio::test]
    async fn writes_report_with_summary() {
        let dir = tempfile::tempdir().unwrap();
        let at = Utc.with_ymd_and_hms(2025, 4, 10, 8, 0, 0).unwrap();
        let mut results = BTreeMap::new();
        results.insert(
            "Selic_pt".to_string(),
            QueryOutcome::Failed {
                query: "Selic".into(),
                language: "pt".into(),
                status: Some(429),
                message: "rate limited".into(),
                attempts: 3,
            },
        );
        let report = NewsBatchReport {
            results,
            elapsed: Duration::from_secs(2),
        };

        let path = write_news_snapshot(dir.path(), &report, at).await.unwrap();
        assert!(path.ends_with("news_data_2025-04-10T08-00-00Z.json"));
        let v: serde_json::Value =
            serde_json::from_slice(&std::fs::read(&path).unwrap()).unwrap();
        assert_eq!(v["summary"]["failedQueries"], 1);
        assert_eq!(v["results"]["Selic_pt"]["attempts"], 3);
    }
}
