//! Job identities and the job table entry type.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::trigger::Trigger;

pub const DAILY_JOB_ID: &str = "daily_crypto_analysis";
pub const PATTERN_STRATEGY_JOB_ID: &str = "pattern_strategy";
pub const TIMEFRAME_REVIEW_JOB_ID: &str = "daily_timeframe_review";
pub const STARTUP_HOOK_JOB_ID: &str = "startup_hook";
pub const MANUAL_RUN_JOB_ID: &str = "manual_daily_run";

/// Kinds of work that own a current-task slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobKind {
    Analysis,
    NewsEvaluation,
    PatternStrategy,
    TimeframeReview,
}

impl std::fmt::Display for JobKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Analysis => "analysis",
            Self::NewsEvaluation => "news_evaluation",
            Self::PatternStrategy => "pattern_strategy",
            Self::TimeframeReview => "timeframe_review",
        };
        f.write_str(s)
    }
}

/// What a job does when it fires.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobAction {
    DailySequence,
    PatternStrategy,
    TimeframeReview,
    StartupHook,
}

#[derive(Debug, Clone)]
pub struct JobSpec {
    pub id: String,
    pub name: String,
    pub trigger: Trigger,
    pub action: JobAction,
}

impl JobSpec {
    pub fn new(id: impl Into<String>, name: impl Into<String>, trigger: Trigger, action: JobAction) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            trigger,
            action,
        }
    }
}

/// Scheduling state for one job.
#[derive(Debug)]
pub(crate) struct JobEntry {
    pub spec: JobSpec,
    pub next_run: Option<DateTime<Utc>>,
    /// Set while an invocation of this job ID is executing.
    pub running: Arc<AtomicBool>,
}

/// Clears a job's running flag when its invocation ends, panics included.
pub(crate) struct RunningGuard(pub Arc<AtomicBool>);

impl RunningGuard {
    /// Claim the flag; `None` if the previous invocation is still executing.
    pub fn claim(flag: &Arc<AtomicBool>) -> Option<Self> {
        if flag.swap(true, Ordering::SeqCst) {
            None
        } else {
            Some(Self(Arc::clone(flag)))
        }
    }
}

impl Drop for RunningGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn guard_allows_one_instance() {
        let flag = Arc::new(AtomicBool::new(false));
        let first = RunningGuard::claim(&flag).unwrap();
        assert!(RunningGuard::claim(&flag).is_none());
        drop(first);
        assert!(RunningGuard::claim(&flag).is_some());
    }

    #[test]
    fn kind_serializes_snake_case() {
        let json = serde_json::to_string(&JobKind::NewsEvaluation).unwrap();
        assert_eq!(json, "\"news_evaluation\"");
        assert_eq!(JobKind::TimeframeReview.to_string(), "timeframe_review");
    }
}
