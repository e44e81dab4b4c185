//! [`Scheduler`]: job table, tick loop and lifecycle.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;

use chrono::{DateTime, Utc};
use daybreak_core::SchedulerConfig;
use daybreak_tasks::TaskRunner;
use indexmap::IndexMap;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::collaborators::JobCollaborators;
use crate::error::SchedulerError;
use crate::job::{
    JobAction, JobEntry, JobKind, JobSpec, RunningGuard, DAILY_JOB_ID, PATTERN_STRATEGY_JOB_ID,
    STARTUP_HOOK_JOB_ID, TIMEFRAME_REVIEW_JOB_ID,
};
use crate::trigger::Trigger;

pub(crate) fn read_lock<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(PoisonError::into_inner)
}

pub(crate) fn write_lock<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(PoisonError::into_inner)
}

/// Cron/interval/one-shot scheduler for the recurring trading jobs.
///
/// Jobs only ever reach tasks through the public [`TaskRunner`] operations.
/// Each fired job runs on its own tokio task; a job whose previous
/// invocation is still executing is skipped for that tick.
pub struct Scheduler {
    pub(crate) config: SchedulerConfig,
    pub(crate) runner: TaskRunner,
    pub(crate) collaborators: JobCollaborators,
    pub(crate) enabled: AtomicBool,
    pub(crate) last_run: RwLock<Option<DateTime<Utc>>>,
    /// Current task per job kind.
    pub(crate) slots: RwLock<HashMap<JobKind, Uuid>>,
    pub(crate) jobs: RwLock<IndexMap<String, JobEntry>>,
    running: AtomicBool,
    shutdown: Notify,
    loop_handle: Mutex<Option<JoinHandle<()>>>,
}

impl Scheduler {
    pub fn new(
        config: SchedulerConfig,
        runner: TaskRunner,
        collaborators: JobCollaborators,
    ) -> Arc<Self> {
        let enabled = config.enabled;
        Arc::new(Self {
            config,
            runner,
            collaborators,
            enabled: AtomicBool::new(enabled),
            last_run: RwLock::new(None),
            slots: RwLock::new(HashMap::new()),
            jobs: RwLock::new(IndexMap::new()),
            running: AtomicBool::new(false),
            shutdown: Notify::new(),
            loop_handle: Mutex::new(None),
        })
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    pub fn runner(&self) -> &TaskRunner {
        &self.runner
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    // ── Lifecycle ────────────────────────────────────────────────────

    /// Register the default jobs and spawn the tick loop. Idempotent.
    pub fn start(self: &Arc<Self>) -> Result<(), SchedulerError> {
        if self.running.load(Ordering::SeqCst) {
            debug!("scheduler already running");
            return Ok(());
        }

        let daily = Trigger::cron(&self.config.daily_cron)?;
        let review = Trigger::cron(&self.config.review_cron)?;

        if self.running.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        self.add_job(JobSpec::new(
            DAILY_JOB_ID,
            "Daily crypto analysis",
            daily,
            JobAction::DailySequence,
        ));
        self.add_job(JobSpec::new(
            PATTERN_STRATEGY_JOB_ID,
            "Pattern strategy",
            Trigger::interval(self.config.strategy_interval()),
            JobAction::PatternStrategy,
        ));
        self.add_job(JobSpec::new(
            TIMEFRAME_REVIEW_JOB_ID,
            "Daily timeframe review",
            review,
            JobAction::TimeframeReview,
        ));
        if self.collaborators.startup_hook.is_some() {
            let at = Utc::now()
                + chrono::Duration::from_std(self.config.startup_delay())
                    .unwrap_or_else(|_| chrono::Duration::zero());
            self.add_job(JobSpec::new(
                STARTUP_HOOK_JOB_ID,
                "Startup hook",
                Trigger::once(at),
                JobAction::StartupHook,
            ));
        }

        let scheduler = Arc::clone(self);
        let handle = tokio::spawn(async move { scheduler.tick_loop().await });
        *self
            .loop_handle
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(handle);

        info!(
            enabled = self.is_enabled(),
            daily_cron = %self.config.daily_cron,
            review_cron = %self.config.review_cron,
            strategy_interval_secs = self.config.strategy_interval_secs,
            "scheduler started"
        );
        Ok(())
    }

    /// Stop the tick loop and wait for it. In-flight jobs finish on their own.
    pub async fn shutdown(&self) {
        if !self.running.swap(false, Ordering::SeqCst) {
            return;
        }
        info!("scheduler shutdown requested");
        self.shutdown.notify_one();

        let handle = self
            .loop_handle
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                warn!(error = %e, "scheduler loop ended abnormally");
            }
        }
        info!("scheduler stopped");
    }

    // ── Job table ────────────────────────────────────────────────────

    /// Insert a job, replacing any job with the same ID.
    pub fn add_job(&self, spec: JobSpec) {
        let now = Utc::now();
        let next_run = spec.trigger.first_fire(now);
        info!(
            job = %spec.id,
            trigger = %spec.trigger.describe(),
            next_run = ?next_run,
            "job scheduled"
        );

        let mut jobs = write_lock(&self.jobs);
        // Keep the running flag so a replaced job still counts as one instance.
        let running = jobs
            .get(&spec.id)
            .map(|existing| Arc::clone(&existing.running))
            .unwrap_or_default();
        jobs.insert(
            spec.id.clone(),
            JobEntry {
                spec,
                next_run,
                running,
            },
        );
    }

    pub fn remove_job(&self, id: &str) -> bool {
        write_lock(&self.jobs).shift_remove(id).is_some()
    }

    pub fn next_run(&self, id: &str) -> Option<DateTime<Utc>> {
        read_lock(&self.jobs).get(id).and_then(|e| e.next_run)
    }

    pub fn job_ids(&self) -> Vec<String> {
        read_lock(&self.jobs).keys().cloned().collect()
    }

    // ── Tick loop ────────────────────────────────────────────────────

    async fn tick_loop(self: Arc<Self>) {
        // tokio intervals reject a zero period.
        let period = self.config.tick_interval().max(Duration::from_millis(1));
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                _ = self.shutdown.notified() => break,
            }
            if !self.is_running() {
                break;
            }
            self.fire_due(Utc::now());
        }
        debug!("scheduler tick loop exited");
    }

    /// Spawn every job whose next run is due at `now` and advance its trigger.
    pub(crate) fn fire_due(self: &Arc<Self>, now: DateTime<Utc>) {
        let mut due = Vec::new();
        {
            let mut jobs = write_lock(&self.jobs);
            let mut exhausted = Vec::new();
            for (id, entry) in jobs.iter_mut() {
                let Some(scheduled) = entry.next_run else {
                    continue;
                };
                if scheduled > now {
                    continue;
                }
                entry.next_run = entry.spec.trigger.next_fire(scheduled, now);
                if entry.next_run.is_none() {
                    exhausted.push(id.clone());
                }
                due.push((id.clone(), entry.spec.action, Arc::clone(&entry.running)));
            }
            for id in exhausted {
                jobs.shift_remove(&id);
            }
        }

        for (id, action, flag) in due {
            let Some(guard) = RunningGuard::claim(&flag) else {
                warn!(job = %id, "previous run still executing, skipping");
                continue;
            };
            let scheduler = Arc::clone(self);
            tokio::spawn(async move {
                let _guard = guard;
                debug!(job = %id, "job fired");
                scheduler.dispatch(&id, action).await;
            });
        }
    }

    async fn dispatch(&self, job: &str, action: JobAction) {
        match action {
            JobAction::DailySequence => {
                let outcome = self.run_daily_sequence().await;
                info!(job = %job, outcome = ?outcome, "daily sequence finished");
            }
            JobAction::PatternStrategy => {
                self.run_pattern_strategy().await;
            }
            JobAction::TimeframeReview => {
                if let Err(e) = self.run_timeframe_review().await {
                    warn!(job = %job, error = %e, "timeframe review failed");
                }
            }
            JobAction::StartupHook => self.run_startup_hook().await,
        }
    }

    // ── Slots ────────────────────────────────────────────────────────

    pub(crate) fn set_slot(&self, kind: JobKind, id: Uuid) {
        write_lock(&self.slots).insert(kind, id);
    }

    pub(crate) fn clear_slot(&self, kind: JobKind) {
        write_lock(&self.slots).remove(&kind);
    }

    /// Task ID currently held in a slot.
    pub fn current_task(&self, kind: JobKind) -> Option<Uuid> {
        read_lock(&self.slots).get(&kind).copied()
    }

    /// Clears `kinds` when dropped, including when a job unwinds.
    pub(crate) fn slot_guard(&self, kinds: &'static [JobKind]) -> SlotGuard<'_> {
        SlotGuard {
            scheduler: self,
            kinds,
        }
    }
}

pub(crate) struct SlotGuard<'a> {
    scheduler: &'a Scheduler,
    kinds: &'static [JobKind],
}

impl Drop for SlotGuard<'_> {
    fn drop(&mut self) {
        for kind in self.kinds {
            self.scheduler.clear_slot(*kind);
        }
    }
}

impl std::fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scheduler")
            .field("running", &self.is_running())
            .field("enabled", &self.is_enabled())
            .field("jobs", &self.job_ids())
            .finish()
    }
}
