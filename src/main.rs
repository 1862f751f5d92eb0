//! fin-pulse HTTP server.
//! Serves the API (and `/metrics`); with `SCHEDULER_ENABLED=true` the
//! collection scheduler runs in the same process.

use anyhow::Context;
use std::net::SocketAddr;
use tokio::sync::watch;
use tracing::{error, info, warn};

use fin_pulse::config::AppConfig;
use fin_pulse::metrics::Metrics;
use fin_pulse::scheduler::{shutdown_signal, InstanceLock, RunLog, Scheduler, SchedulerOutcome};
use fin_pulse::{build_state, logging, router, store};

async fn wait_for(mut rx: watch::Receiver<bool>) {
    // A dropped sender also means "stop".
    let _ = rx.wait_for(|stop| *stop).await;
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env in local/dev; no-op when absent.
    let _ = dotenvy::dotenv();
    let cfg = AppConfig::from_env();
    logging::init_tracing(cfg.log_format);

    let store = store::open_store(&cfg.store_url).context("opening document store")?;
    if let Err(e) = store.connect().await {
        // Reads fail until the store comes back; collection runs retry the connect.
        warn!(error = %e, url = %cfg.store_url, "store not reachable at startup");
    }

    let state = build_state(&cfg, store)?;
    info!(backend = state.chat.backend_name(), "chat backend ready");

    let mut app = router(state.clone());
    match Metrics::install() {
        Ok(m) => app = app.merge(m.router()),
        Err(e) => warn!(error = %e, "metrics recorder not installed"),
    }

    let (stop_tx, stop_rx) = watch::channel(false);
    tokio::spawn(async move {
        shutdown_signal().await;
        let _ = stop_tx.send(true);
    });

    let scheduler_task = cfg.scheduler_enabled.then(|| {
        let sched = Scheduler::new(
            state.collector.clone(),
            InstanceLock::new(cfg.lock_path()).reclaim_stale(cfg.scheduler_reclaim_stale_lock),
            RunLog::new(&cfg.log_dir),
        );
        let rx = stop_rx.clone();
        tokio::spawn(async move {
            match sched.run_until(wait_for(rx)).await {
                Ok(SchedulerOutcome::Aborted { holder }) => {
                    warn!(holder = ?holder, "in-process scheduler not started: lock held")
                }
                Ok(SchedulerOutcome::Stopped { runs }) => info!(runs, "scheduler stopped"),
                Err(e) => error!(error = %e, "scheduler failed"),
            }
        })
    });

    let addr = SocketAddr::from(([0, 0, 0, 0], cfg.port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("binding {addr}"))?;
    info!(%addr, "fin-pulse listening");
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(wait_for(stop_rx))
    .await
    .context("http server")?;

    if let Some(task) = scheduler_task {
        let _ = task.await;
    }
    info!("fin-pulse stopped");
    Ok(())
}
