//! Serializable scheduler status snapshot.

use chrono::{DateTime, Utc};
use daybreak_tasks::{Task, TaskStatus};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// What a current-task slot points at.
///
/// Status fields are `None` when the ID is synthetic (pattern strategy,
/// timeframe review) or no longer in the registry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CurrentTaskSummary {
    pub task_id: Uuid,
    pub status: Option<TaskStatus>,
    pub progress: Option<f64>,
    pub message: Option<String>,
}

impl CurrentTaskSummary {
    pub(crate) fn new(task_id: Uuid, task: Option<Task>) -> Self {
        match task {
            Some(task) => Self {
                task_id,
                status: Some(task.status),
                progress: Some(task.progress),
                message: Some(task.message),
            },
            None => Self {
                task_id,
                status: None,
                progress: None,
                message: None,
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchedulerStatus {
    pub scheduler_running: bool,
    pub enabled: bool,
    pub last_run: Option<DateTime<Utc>>,
    /// Next fire time of the daily sequence job.
    pub next_run: Option<DateTime<Utc>>,
    pub current_analysis_task: Option<CurrentTaskSummary>,
    pub current_news_task: Option<CurrentTaskSummary>,
    pub current_pattern_strategy_task: Option<CurrentTaskSummary>,
    pub current_timeframe_review_task: Option<CurrentTaskSummary>,
}
