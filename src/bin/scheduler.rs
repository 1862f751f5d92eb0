//! Standalone collection scheduler.
//! Exits 0 when another instance already holds the lock.

use anyhow::Context;
use std::sync::Arc;
use tracing::{info, warn};

use fin_pulse::config::AppConfig;
use fin_pulse::ingest::Collector;
use fin_pulse::scheduler::{InstanceLock, RunLog, Scheduler, SchedulerOutcome};
use fin_pulse::{logging, store};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();
    let cfg = AppConfig::from_env();
    logging::init_tracing(cfg.log_format);

    let store = store::open_store(&cfg.store_url).context("opening document store")?;
    let collector = Collector::from_config(&cfg, store)?;

    let sched = Scheduler::new(
        Arc::new(collector),
        InstanceLock::new(cfg.lock_path()).reclaim_stale(cfg.scheduler_reclaim_stale_lock),
        RunLog::new(&cfg.log_dir),
    );

    match sched.run().await.context("scheduler lock")? {
        SchedulerOutcome::Aborted { holder } => {
            warn!(holder = ?holder, "another scheduler is running; exiting");
        }
        SchedulerOutcome::Stopped { runs } => info!(runs, "scheduler stopped"),
    }
    Ok(())
}
