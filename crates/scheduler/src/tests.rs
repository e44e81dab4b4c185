use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use daybreak_core::{SchedulerConfig, TaskConfig};
use daybreak_tasks::{Computations, TaskRunner};
use uuid::Uuid;

use super::core::{read_lock, Scheduler};
use super::job::{JobAction, JobKind, JobSpec, RunningGuard, STARTUP_HOOK_JOB_ID};
use super::paper::{PaperDesk, PaperPatternStrategy, PaperReviewer};
use super::{JobCollaborators, SchedulerError, StartupHook, Trigger};

#[derive(Default)]
struct CountingHook(AtomicUsize);

#[async_trait]
impl StartupHook for CountingHook {
    async fn run(&self) -> anyhow::Result<()> {
        self.0.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

fn scheduler_with(config: SchedulerConfig, hook: Option<Arc<CountingHook>>) -> Arc<Scheduler> {
    let runner = TaskRunner::new(&TaskConfig::default(), Computations::new());
    let collaborators = JobCollaborators {
        signal_desk: Arc::new(PaperDesk::new(10.0)),
        pattern_strategy: Arc::new(PaperPatternStrategy),
        reviewer: Arc::new(PaperReviewer),
        startup_hook: hook.map(|h| h as Arc<dyn StartupHook>),
    };
    Scheduler::new(config, runner, collaborators)
}

async fn wait_until<F: Fn() -> bool>(pred: F) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while !pred() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("condition not reached in time");
}

#[test]
fn add_job_replaces_existing_id() {
    let scheduler = scheduler_with(SchedulerConfig::default(), None);
    let first = Utc::now() + chrono::Duration::hours(1);
    let second = Utc::now() + chrono::Duration::hours(2);

    scheduler.add_job(JobSpec::new("manual", "first", Trigger::once(first), JobAction::DailySequence));
    scheduler.add_job(JobSpec::new("manual", "second", Trigger::once(second), JobAction::DailySequence));

    assert_eq!(scheduler.job_ids(), ["manual"]);
    assert_eq!(scheduler.next_run("manual"), Some(second));
    assert!(scheduler.remove_job("manual"));
    assert!(scheduler.next_run("manual").is_none());
}

#[tokio::test]
async fn due_one_shot_fires_once_and_is_dropped() {
    let hook = Arc::new(CountingHook::default());
    let scheduler = scheduler_with(SchedulerConfig::default(), Some(hook.clone()));
    let now = Utc::now();
    scheduler.add_job(JobSpec::new(
        STARTUP_HOOK_JOB_ID,
        "hook",
        Trigger::once(now),
        JobAction::StartupHook,
    ));

    scheduler.fire_due(now);
    wait_until(|| hook.0.load(Ordering::SeqCst) == 1).await;
    assert!(scheduler.job_ids().is_empty());

    scheduler.fire_due(now + chrono::Duration::seconds(5));
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(hook.0.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn job_still_running_is_skipped() {
    let hook = Arc::new(CountingHook::default());
    let scheduler = scheduler_with(SchedulerConfig::default(), Some(hook.clone()));
    let now = Utc::now();
    scheduler.add_job(JobSpec::new(
        "hook",
        "hook",
        Trigger::interval(Duration::from_secs(60)),
        JobAction::StartupHook,
    ));

    let flag = {
        let jobs = read_lock(&scheduler.jobs);
        Arc::clone(&jobs["hook"].running)
    };
    let held = RunningGuard::claim(&flag).unwrap();

    scheduler.fire_due(now + chrono::Duration::seconds(61));
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(hook.0.load(Ordering::SeqCst), 0);
    // The trigger still advanced past the skipped slot.
    assert!(scheduler.next_run("hook").unwrap() > now + chrono::Duration::seconds(61));

    drop(held);
    scheduler.fire_due(now + chrono::Duration::seconds(200));
    wait_until(|| hook.0.load(Ordering::SeqCst) == 1).await;
}

#[test]
fn synthetic_slots_report_no_task_state() {
    let scheduler = scheduler_with(SchedulerConfig::default(), None);
    let synthetic = Uuid::new_v4();
    scheduler.set_slot(JobKind::PatternStrategy, synthetic);

    let status = scheduler.status();
    let summary = status.current_pattern_strategy_task.unwrap();
    assert_eq!(summary.task_id, synthetic);
    assert!(summary.status.is_none() && summary.progress.is_none() && summary.message.is_none());
    assert!(status.current_analysis_task.is_none());
    assert!(!status.scheduler_running);

    // Nothing cancellable behind a synthetic ID.
    assert!(!scheduler.stop_current());

    scheduler.clear_slot(JobKind::PatternStrategy);
    assert!(scheduler.current_task(JobKind::PatternStrategy).is_none());
}

#[tokio::test]
async fn start_rejects_invalid_cron() {
    let config = SchedulerConfig {
        daily_cron: "not a cron".to_string(),
        ..SchedulerConfig::default()
    };
    let scheduler = scheduler_with(config, None);
    let err = scheduler.start().unwrap_err();
    assert!(matches!(err, SchedulerError::InvalidCron { .. }));
    assert!(!scheduler.is_running());
    assert!(scheduler.job_ids().is_empty());
}

#[tokio::test]
async fn start_is_idempotent_and_registers_default_jobs() {
    let hook = Arc::new(CountingHook::default());
    let config = SchedulerConfig {
        startup_delay_secs: 3600,
        ..SchedulerConfig::default()
    };
    let scheduler = scheduler_with(config, Some(hook));
    scheduler.start().unwrap();
    scheduler.start().unwrap();

    assert_eq!(
        scheduler.job_ids(),
        [
            "daily_crypto_analysis",
            "pattern_strategy",
            "daily_timeframe_review",
            "startup_hook"
        ]
    );
    let status = scheduler.status();
    assert!(status.scheduler_running);
    assert!(status.next_run.is_some());
    assert_eq!(status.next_run, scheduler.next_run("daily_crypto_analysis"));

    scheduler.shutdown().await;
    assert!(!scheduler.is_running());
    // The job table keeps its schedule, but a stopped scheduler reports none.
    assert!(scheduler.next_run("daily_crypto_analysis").is_some());
    assert!(scheduler.status().next_run.is_none());
}
