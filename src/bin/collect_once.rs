//! One collection run; prints the summary as JSON.
//! Exit code 0 on success, 1 when the run failed.

use anyhow::Context;
use std::process::ExitCode;

use fin_pulse::config::AppConfig;
use fin_pulse::ingest::Collector;
use fin_pulse::{logging, store};

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let _ = dotenvy::dotenv();
    let cfg = AppConfig::from_env();
    logging::init_tracing(cfg.log_format);

    let store = store::open_store(&cfg.store_url).context("opening document store")?;
    let summary = Collector::from_config(&cfg, store)?.run().await;

    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(if summary.success {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}
