//! Manual controls and status reporting.

use std::sync::atomic::Ordering;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use daybreak_tasks::notifier;
use tokio_stream::wrappers::ReceiverStream;
use tracing::info;

use crate::core::{read_lock, Scheduler};
use crate::job::{JobAction, JobKind, JobSpec, DAILY_JOB_ID, MANUAL_RUN_JOB_ID};
use crate::status::{CurrentTaskSummary, SchedulerStatus};
use crate::trigger::Trigger;

impl Scheduler {
    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }

    /// Turn job execution on or off. Jobs keep firing but return early
    /// while disabled.
    pub fn set_enabled(&self, enabled: bool) {
        let previous = self.enabled.swap(enabled, Ordering::SeqCst);
        if previous != enabled {
            info!(enabled, "scheduler enabled flag changed");
        }
    }

    pub fn last_run(&self) -> Option<DateTime<Utc>> {
        *read_lock(&self.last_run)
    }

    /// Ask every task held in a slot to stop. Returns whether any of them
    /// was still cancellable.
    pub fn stop_current(&self) -> bool {
        let slots: Vec<(JobKind, uuid::Uuid)> =
            read_lock(&self.slots).iter().map(|(k, id)| (*k, *id)).collect();

        let mut stopped_any = false;
        for (kind, id) in slots {
            match self.runner.request_cancel(id) {
                Ok(_) => {
                    info!(kind = %kind, task_id = %id, "stop requested for current task");
                    stopped_any = true;
                }
                // Synthetic IDs and finished tasks are not cancellable.
                Err(e) => info!(kind = %kind, task_id = %id, reason = %e, "current task not stopped"),
            }
        }
        stopped_any
    }

    /// Schedule a one-off daily sequence shortly from now, replacing any
    /// pending manual run. Returns when it will fire.
    pub fn run_now(&self) -> DateTime<Utc> {
        let delay = chrono::Duration::from_std(self.config.run_now_delay())
            .unwrap_or_else(|_| chrono::Duration::zero());
        let at = Utc::now() + delay;
        self.add_job(JobSpec::new(
            MANUAL_RUN_JOB_ID,
            "Manual daily run",
            Trigger::once(at),
            JobAction::DailySequence,
        ));
        info!(at = %at, "manual daily run scheduled");
        at
    }

    pub fn status(&self) -> SchedulerStatus {
        let slots = read_lock(&self.slots).clone();
        let summary = |kind: JobKind| {
            slots
                .get(&kind)
                .map(|id| CurrentTaskSummary::new(*id, self.runner.get_task(*id).ok()))
        };

        let running = self.is_running();
        SchedulerStatus {
            scheduler_running: running,
            enabled: self.is_enabled(),
            last_run: self.last_run(),
            next_run: running.then(|| self.next_run(DAILY_JOB_ID)).flatten(),
            current_analysis_task: summary(JobKind::Analysis),
            current_news_task: summary(JobKind::NewsEvaluation),
            current_pattern_strategy_task: summary(JobKind::PatternStrategy),
            current_timeframe_review_task: summary(JobKind::TimeframeReview),
        }
    }

    /// Status as JSON, emitted whenever it changes.
    pub fn stream_status(self: &Arc<Self>) -> ReceiverStream<String> {
        let scheduler = Arc::clone(self);
        notifier::stream_changes(self.config.status_stream_poll(), move || scheduler.status())
    }
}
