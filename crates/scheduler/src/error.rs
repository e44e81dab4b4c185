//! Scheduler error types.

use daybreak_tasks::TaskError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("invalid cron expression '{expr}': {reason}")]
    InvalidCron { expr: String, reason: String },

    #[error(transparent)]
    Task(#[from] TaskError),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialize(#[from] serde_json::Error),

    /// A collaborator (strategy, reviewer, signal desk, hook) failed.
    #[error(transparent)]
    Collaborator(#[from] anyhow::Error),
}
