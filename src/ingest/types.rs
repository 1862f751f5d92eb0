// src/ingest/types.rs
use serde::{Deserialize, Serialize};

use crate::ingest::persist::SaveCounts;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunResults {
    pub quotes: SaveCounts,
    pub indicators: SaveCounts,
    pub banks: SaveCounts,
    pub news: SaveCounts,
}

impl RunResults {
    pub fn total_added(&self) -> u64 {
        self.quotes.added + self.indicators.added + self.banks.added + self.news.added
    }
}

/// Outcome of one collection run, as logged and returned by `/api/coleta`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollectionSummary {
    pub success: bool,
    pub timestamp: String, // RFC 3339
    pub results: RunResults,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Anything that can perform a collection run (the real collector, or a stub in tests).
#[async_trait::async_trait]
pub trait CollectionRunner: Send + Sync {
    async fn run_collection(&self) -> CollectionSummary;
}
