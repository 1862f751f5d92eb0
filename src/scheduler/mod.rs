// src/scheduler/mod.rs
//! Periodic collection: lock → startup run → trigger loops → shutdown.
//!
//! Runs never overlap; a trigger that fires during an active run waits for
//! it. Shutdown stops the loops, lets an in-flight run finish, then releases
//! the lock.

pub mod lock;
pub mod runlog;
pub mod trigger;

use chrono::Local;
use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::ingest::types::{CollectionRunner, CollectionSummary};
pub use lock::{InstanceLock, LockError, LockGuard};
pub use runlog::RunLog;
pub use trigger::Trigger;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    Idle,
    Locked,
    Running,
    Aborted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerOutcome {
    /// Another instance holds the lock; nothing ran.
    Aborted { holder: Option<u32> },
    Stopped { runs: u64 },
}

/// What the spawned tasks share.
struct RunCtx {
    runner: Arc<dyn CollectionRunner>,
    log: RunLog,
    gate: Mutex<()>,
    state: watch::Sender<SchedulerState>,
    runs: AtomicU64,
    /// Set before shutdown queues on `gate`; runs queued ahead of it bail out.
    stopping: AtomicBool,
}

impl RunCtx {
    /// `None` when shutdown began while this run waited for its turn.
    async fn run_once(&self, reason: &str) -> Option<CollectionSummary> {
        let _turn = self.gate.lock().await;
        if self.stopping.load(Ordering::SeqCst) {
            info!(target: "scheduler", reason, "shutdown in progress; skipping collection");
            return None;
        }
        self.state.send_replace(SchedulerState::Running);
        self.log.info(&format!("starting scheduled collection ({reason})"));

        let summary = self.runner.run_collection().await;
        if summary.success {
            let r = &summary.results;
            self.log.info(&format!(
                "collection finished: quotes {}, indicators {}, banks {}, news {} added",
                r.quotes.added, r.indicators.added, r.banks.added, r.news.added
            ));
        } else {
            self.log.error(&format!(
                "collection failed: {}",
                summary.error.as_deref().unwrap_or("unknown error")
            ));
        }

        self.runs.fetch_add(1, Ordering::SeqCst);
        self.state.send_replace(SchedulerState::Locked);
        Some(summary)
    }
}

pub struct Scheduler {
    ctx: Arc<RunCtx>,
    lock: InstanceLock,
    triggers: Vec<Trigger>,
    state_rx: watch::Receiver<SchedulerState>,
}

impl Scheduler {
    pub fn new(runner: Arc<dyn CollectionRunner>, lock: InstanceLock, log: RunLog) -> Self {
        let (state, state_rx) = watch::channel(SchedulerState::Idle);
        Self {
            ctx: Arc::new(RunCtx {
                runner,
                log,
                gate: Mutex::new(()),
                state,
                runs: AtomicU64::new(0),
                stopping: AtomicBool::new(false),
            }),
            lock,
            triggers: Trigger::defaults(),
            state_rx,
        }
    }

    pub fn with_triggers(mut self, triggers: Vec<Trigger>) -> Self {
        self.triggers = triggers;
        self
    }

    pub fn state(&self) -> SchedulerState {
        *self.state_rx.borrow()
    }

    /// Run until `shutdown` resolves. A held lock returns `Aborted` at once.
    pub async fn run_until<F>(&self, shutdown: F) -> Result<SchedulerOutcome, LockError>
    where
        F: Future<Output = ()>,
    {
        let guard = match self.lock.acquire() {
            Ok(g) => g,
            Err(LockError::Held { pid, .. }) => {
                self.ctx.state.send_replace(SchedulerState::Aborted);
                let who = pid.map_or_else(|| "unknown pid".to_string(), |p| format!("pid {p}"));
                warn!(
                    target: "scheduler",
                    holder = ?pid,
                    "another scheduler holds the lock; exiting"
                );
                let msg = format!("scheduler already running ({who}); exiting");
                self.ctx.log.write(Local::now(), &msg, false);
                return Ok(SchedulerOutcome::Aborted { holder: pid });
            }
            Err(e) => {
                self.ctx.state.send_replace(SchedulerState::Aborted);
                return Err(e);
            }
        };
        self.ctx.stopping.store(false, Ordering::SeqCst);
        self.ctx.state.send_replace(SchedulerState::Locked);
        self.ctx.log.info("scheduler started");
        for t in &self.triggers {
            info!(target: "scheduler", trigger = %t, "trigger armed");
        }

        let mut tasks: Vec<JoinHandle<()>> = Vec::with_capacity(self.triggers.len() + 1);
        let ctx = self.ctx.clone();
        tasks.push(tokio::spawn(async move {
            ctx.run_once("startup").await;
        }));
        for trigger in self.triggers.clone() {
            tasks.push(tokio::spawn(trigger_loop(self.ctx.clone(), trigger)));
        }

        shutdown.await;
        self.ctx.stopping.store(true, Ordering::SeqCst);

        if self.state() == SchedulerState::Running {
            info!(target: "scheduler", "shutdown requested; waiting for the active run");
        }
        let _turn = self.ctx.gate.lock().await;
        for t in &tasks {
            t.abort();
        }
        for t in tasks {
            let _ = t.await;
        }

        let runs = self.ctx.runs.load(Ordering::SeqCst);
        self.ctx
            .log
            .info(&format!("scheduler stopped after {runs} run(s)"));
        guard.release();
        self.ctx.state.send_replace(SchedulerState::Idle);
        Ok(SchedulerOutcome::Stopped { runs })
    }

    /// Run until Ctrl-C or SIGTERM.
    pub async fn run(&self) -> Result<SchedulerOutcome, LockError> {
        self.run_until(shutdown_signal()).await
    }
}

async fn trigger_loop(ctx: Arc<RunCtx>, trigger: Trigger) {
    loop {
        let now = Local::now().naive_local();
        let Some(next) = trigger.next_after(now) else {
            warn!(
                target: "scheduler",
                trigger = %trigger,
                "trigger has no next fire time; stopping it"
            );
            return;
        };
        let wait = (next - now).to_std().unwrap_or_default();
        info!(
            target: "scheduler",
            trigger = trigger.label(),
            next = %next,
            "next collection scheduled"
        );
        tokio::time::sleep(wait).await;
        if ctx.run_once(trigger.label()).await.is_none() {
            return;
        }
    }
}

/// Resolves on Ctrl-C or (unix) SIGTERM.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(target: "scheduler", error = %e, "ctrl-c handler unavailable");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut s) => {
                s.recv().await;
            }
            Err(e) => {
                warn!(target: "scheduler", error = %e, "SIGTERM handler unavailable");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!(target: "scheduler", "ctrl-c received"),
        _ = terminate => info!(target: "scheduler", "SIGTERM received"),
    }
}
