// tests/scheduler_lock.rs
//
// Scheduler lifecycle with a stub runner: single-instance lock, startup run,
// graceful stop.

use std::fs;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{Local, Utc};
use tokio::sync::Notify;

use fin_pulse::ingest::persist::SaveCounts;
use fin_pulse::ingest::types::{CollectionRunner, CollectionSummary, RunResults};
use fin_pulse::scheduler::{
    InstanceLock, RunLog, Scheduler, SchedulerOutcome, SchedulerState, Trigger,
};

#[derive(Default)]
struct StubRunner {
    calls: AtomicUsize,
    done: Notify,
}

#[async_trait::async_trait]
impl CollectionRunner for StubRunner {
    async fn run_collection(&self) -> CollectionSummary {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.done.notify_one();
        CollectionSummary {
            success: true,
            timestamp: Utc::now().to_rfc3339(),
            results: RunResults {
                quotes: SaveCounts {
                    added: 3,
                    ..SaveCounts::default()
                },
                ..RunResults::default()
            },
            error: None,
        }
    }
}

#[tokio::test]
async fn held_lock_aborts_without_running() {
    let dir = tempfile::tempdir().unwrap();
    let lock_path = dir.path().join("scheduler.lock");
    fs::write(&lock_path, std::process::id().to_string()).unwrap();

    let runner = Arc::new(StubRunner::default());
    let scheduler = Scheduler::new(
        runner.clone(),
        InstanceLock::new(&lock_path).reclaim_stale(true),
        RunLog::new(dir.path()),
    )
    .with_triggers(vec![]);

    let outcome = scheduler.run_until(async {}).await.unwrap();
    assert_eq!(
        outcome,
        SchedulerOutcome::Aborted {
            holder: Some(std::process::id())
        }
    );
    assert_eq!(scheduler.state(), SchedulerState::Aborted);
    assert_eq!(runner.calls.load(Ordering::SeqCst), 0);
    // the other instance's lock is left alone
    assert!(lock_path.exists());
}

#[tokio::test]
async fn startup_run_then_clean_stop() {
    let dir = tempfile::tempdir().unwrap();
    let lock = InstanceLock::new(dir.path().join("scheduler.lock"));
    let lock_path = lock.path().to_path_buf();
    let log = RunLog::new(dir.path());
    let log_file = log.file_for(Local::now());

    let runner = Arc::new(StubRunner::default());
    let scheduler = Scheduler::new(runner.clone(), lock, log).with_triggers(vec![]);

    let waiter = runner.clone();
    let outcome = scheduler
        .run_until(async move { waiter.done.notified().await })
        .await
        .unwrap();

    assert_eq!(outcome, SchedulerOutcome::Stopped { runs: 1 });
    assert_eq!(runner.calls.load(Ordering::SeqCst), 1);
    assert_eq!(scheduler.state(), SchedulerState::Idle);
    assert!(!lock_path.exists(), "lock must be released on stop");

    let text = fs::read_to_string(&log_file).unwrap();
    let lines: Vec<&str> = text.lines().collect();
    assert!(lines[0].ends_with("scheduler started"));
    assert!(text.contains("starting scheduled collection (startup)"));
    assert!(text.contains("collection finished: quotes 3, indicators 0, banks 0, news 0 added"));
    assert!(lines.last().unwrap().ends_with("scheduler stopped after 1 run(s)"));
    assert!(!text.contains("ERROR:"));
}

#[tokio::test]
async fn lock_can_be_taken_again_after_stop() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("run").join("scheduler.lock");

    for _ in 0..2 {
        let runner = Arc::new(StubRunner::default());
        let waiter = runner.clone();
        let scheduler = Scheduler::new(runner, InstanceLock::new(&path), RunLog::new(dir.path()))
            .with_triggers(vec![]);
        let outcome = scheduler
            .run_until(async move { waiter.done.notified().await })
            .await
            .unwrap();
        assert_eq!(outcome, SchedulerOutcome::Stopped { runs: 1 });
    }
}

/// First run blocks until released; later runs return at once.
#[derive(Default)]
struct SlowFirstRun {
    calls: AtomicUsize,
    started: Notify,
    release: Notify,
}

#[async_trait::async_trait]
impl CollectionRunner for SlowFirstRun {
    async fn run_collection(&self) -> CollectionSummary {
        if self.calls.fetch_add(1, Ordering::SeqCst) == 0 {
            self.started.notify_one();
            self.release.notified().await;
        }
        CollectionSummary {
            success: true,
            timestamp: Utc::now().to_rfc3339(),
            results: RunResults::default(),
            error: None,
        }
    }
}

#[tokio::test(start_paused = true)]
async fn trigger_queued_behind_the_active_run_does_not_start_after_shutdown() {
    let dir = tempfile::tempdir().unwrap();
    let runner = Arc::new(SlowFirstRun::default());
    // fires on the next hour boundary, while the startup run is still going
    let hourly = Trigger::Daily {
        hours: (0..24).collect(),
    };
    let scheduler = Scheduler::new(
        runner.clone(),
        InstanceLock::new(dir.path().join("scheduler.lock")),
        RunLog::new(dir.path()),
    )
    .with_triggers(vec![hourly]);

    let ctl = runner.clone();
    let outcome = scheduler
        .run_until(async move {
            ctl.started.notified().await;
            tokio::time::sleep(Duration::from_secs(2 * 3600)).await;
            ctl.release.notify_one();
        })
        .await
        .unwrap();

    assert_eq!(outcome, SchedulerOutcome::Stopped { runs: 1 });
    assert_eq!(runner.calls.load(Ordering::SeqCst), 1);
    let text = fs::read_to_string(RunLog::new(dir.path()).file_for(Local::now())).unwrap();
    assert_eq!(text.matches("starting scheduled collection").count(), 1);
}
