//! Task error types.

use std::time::Duration;

use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TaskError {
    /// The concurrency gate was not acquired within the bound; the task never ran.
    #[error("another computation held the gate for more than {}s", .0.as_secs())]
    ContentionTimeout(Duration),

    /// The collaborator computation failed or panicked.
    #[error("computation failed: {0}")]
    Computation(String),

    /// Cooperative stop observed at a checkpoint. Not recorded as a failure.
    #[error("task cancelled by user")]
    Cancelled,

    #[error("task {0} is not cancellable or already finished")]
    NotCancellable(Uuid),

    #[error("task not found: {0}")]
    NotFound(Uuid),

    #[error("task {0} already reached a terminal state")]
    AlreadyFinished(Uuid),
}

impl TaskError {
    /// Whether an `anyhow` error returned by a computation is a cooperative stop.
    pub fn is_cancellation(err: &anyhow::Error) -> bool {
        matches!(err.downcast_ref::<TaskError>(), Some(TaskError::Cancelled))
    }
}
