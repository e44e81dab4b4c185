//! Handle given to a running computation.

use std::sync::Arc;

use uuid::Uuid;

use crate::cancel::CancelSignal;
use crate::error::TaskError;
use crate::registry::TaskRegistry;
use crate::task::TaskParams;

/// Everything a computation needs to report back: progress, cancellation
/// checkpoints and its final result. All writes go through the registry.
#[derive(Debug, Clone)]
pub struct TaskContext {
    id: Uuid,
    params: TaskParams,
    cancel: CancelSignal,
    registry: Arc<TaskRegistry>,
}

impl TaskContext {
    pub fn new(
        id: Uuid,
        params: TaskParams,
        cancel: CancelSignal,
        registry: Arc<TaskRegistry>,
    ) -> Self {
        Self {
            id,
            params,
            cancel,
            registry,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn params(&self) -> &TaskParams {
        &self.params
    }

    pub fn cancel_signal(&self) -> &CancelSignal {
        &self.cancel
    }

    pub fn is_cancel_requested(&self) -> bool {
        self.cancel.is_raised()
    }

    /// Record progress in `[0, 1]` with a human-readable step.
    pub fn report(&self, progress: f64, message: impl Into<String>) -> Result<(), TaskError> {
        self.registry.update_progress(self.id, progress, message)?;
        Ok(())
    }

    /// Cancellation checkpoint. When a stop was requested the task is moved
    /// to `Cancelled` and `Err(TaskError::Cancelled)` is returned; the
    /// computation should propagate it with `?` and do no further work.
    pub fn checkpoint(&self) -> Result<(), TaskError> {
        if !self.cancel.is_raised() {
            return Ok(());
        }
        match self.registry.mark_cancelled(self.id) {
            Ok(_) | Err(TaskError::AlreadyFinished(_)) => Err(TaskError::Cancelled),
            Err(other) => Err(other),
        }
    }

    /// Terminal success with the computation's result payload.
    pub fn complete(&self, result: serde_json::Value) -> Result<(), TaskError> {
        self.registry.mark_completed(self.id, result, "completed")?;
        Ok(())
    }
}
