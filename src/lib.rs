// src/lib.rs
// Public library surface for the binaries and integration tests.

pub mod api;
pub mod chat;
pub mod config;
pub mod ingest;
pub mod logging;
pub mod metrics;
pub mod model;
pub mod scheduler;
pub mod store;

pub use crate::api::router;

use std::sync::Arc;

use crate::api::AppState;
use crate::chat::ChatGateway;
use crate::config::AppConfig;
use crate::ingest::Collector;
use crate::store::SharedStore;

/// Wire store, chat gateway and collector from config.
pub fn build_state(cfg: &AppConfig, store: SharedStore) -> anyhow::Result<AppState> {
    let collector = Collector::from_config(cfg, store.clone())?;
    Ok(AppState {
        chat: Arc::new(ChatGateway::from_config(&cfg.llm, store.clone())),
        store,
        collector: Arc::new(collector),
        admin_api_key: cfg.admin_api_key.clone(),
        frontend_dir: cfg.frontend_dir.clone(),
    })
}
