//! Task creation and the runner wrapper.
//!
//! [`TaskRunner::create_task`] is the only way work enters the system: it
//! registers a pending task and its cancel signal, spawns the wrapper as a
//! fire-and-forget tokio task and returns the ID immediately. The wrapper
//! serializes computations through the [`ConcurrencyGate`], runs the
//! computation on its own spawned task so panics surface as join errors, and
//! converts every escaping failure into a terminal task state. Nothing is
//! ever propagated back to the creator.

use std::any::Any;
use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use daybreak_core::TaskConfig;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::cancel::{CancelSignal, SignalMap};
use crate::computation::{Computation, Computations};
use crate::context::TaskContext;
use crate::error::TaskError;
use crate::gate::ConcurrencyGate;
use crate::notifier;
use crate::registry::TaskRegistry;
use crate::task::{Task, TaskParams};

/// Entry point for creating, observing and cancelling tasks.
///
/// Cheap to clone; all clones share the same registry, gate and signals.
#[derive(Clone)]
pub struct TaskRunner {
    inner: Arc<RunnerInner>,
}

struct RunnerInner {
    registry: Arc<TaskRegistry>,
    signals: SignalMap,
    gate: ConcurrencyGate,
    /// Admitted tasks whose wrapper has not exited yet.
    active: Mutex<HashSet<Uuid>>,
    computations: Computations,
    stream_poll: Duration,
}

impl RunnerInner {
    fn active(&self) -> MutexGuard<'_, HashSet<Uuid>> {
        self.active.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl TaskRunner {
    pub fn new(config: &TaskConfig, computations: Computations) -> Self {
        Self::with_registry(config, computations, Arc::new(TaskRegistry::new()))
    }

    pub fn with_registry(
        config: &TaskConfig,
        computations: Computations,
        registry: Arc<TaskRegistry>,
    ) -> Self {
        info!(
            gate_timeout_secs = config.gate_acquire_timeout_secs,
            computations = ?computations,
            "task runner initialized"
        );
        Self {
            inner: Arc::new(RunnerInner {
                registry,
                signals: SignalMap::new(),
                gate: ConcurrencyGate::new(config.gate_acquire_timeout()),
                active: Mutex::new(HashSet::new()),
                computations,
                stream_poll: config.task_stream_poll(),
            }),
        }
    }

    pub fn registry(&self) -> &Arc<TaskRegistry> {
        &self.inner.registry
    }

    pub fn gate(&self) -> &ConcurrencyGate {
        &self.inner.gate
    }

    // ── Creation ─────────────────────────────────────────────────────

    /// Register a pending task and start it in the background.
    ///
    /// Fails only when no computation is registered for the task kind.
    pub fn create_task(&self, params: TaskParams) -> Result<Uuid, TaskError> {
        let kind = params.kind();
        let computation = self.inner.computations.get(kind).ok_or_else(|| {
            TaskError::Computation(format!("no computation registered for {}", kind))
        })?;

        // Held until the task is recorded, so concurrent creators count each
        // other and the wrapper's cleanup cannot run before the insert.
        let mut active = self.inner.active();
        let ahead = active.len();
        let message = if ahead > 0 {
            format!(
                "task created, waiting for {} running task(s) to finish",
                ahead
            )
        } else {
            "task created, starting".to_string()
        };

        let id = Uuid::new_v4();
        let top_n = params.top_n();
        self.inner
            .registry
            .insert(Task::pending(id, params.clone(), message));
        let signal = self.inner.signals.register(id);
        active.insert(id);
        let inner = Arc::clone(&self.inner);
        tokio::spawn(run_wrapped(inner, id, params, signal, computation));
        drop(active);

        info!(task_id = %id, kind = %kind, top_n, ahead, "task created");
        Ok(id)
    }

    // ── Queries ──────────────────────────────────────────────────────

    pub fn get_task(&self, id: Uuid) -> Result<Task, TaskError> {
        self.inner.registry.get(id).ok_or(TaskError::NotFound(id))
    }

    pub fn list_tasks(&self) -> Vec<Task> {
        self.inner.registry.list()
    }

    pub fn last_completed(&self) -> Option<Task> {
        self.inner.registry.last_completed()
    }

    /// IDs of tasks whose wrapper is still alive.
    pub fn active_tasks(&self) -> Vec<Uuid> {
        self.inner.active().iter().copied().collect()
    }

    pub fn is_active(&self, id: Uuid) -> bool {
        self.inner.active().contains(&id)
    }

    /// Live snapshots of one task; see [`notifier::stream_task`].
    pub fn stream_task(&self, id: Uuid) -> ReceiverStream<Task> {
        notifier::stream_task(Arc::clone(&self.inner.registry), id, self.inner.stream_poll)
    }

    // ── Cancellation ─────────────────────────────────────────────────

    /// Ask a task to stop at its next checkpoint.
    ///
    /// The status is left as it is; the returned snapshot carries the
    /// "stop requested" message. Never blocks on the computation.
    pub fn request_cancel(&self, id: Uuid) -> Result<Task, TaskError> {
        if self.inner.registry.get(id).is_none() {
            return Err(TaskError::NotFound(id));
        }
        let signal = self
            .inner
            .signals
            .get(id)
            .ok_or(TaskError::NotCancellable(id))?;

        // Noted before raising: a queued wrapper reacts to the raise at once.
        match self.inner.registry.note_cancel_requested(id) {
            Ok(_) => {}
            // Finished between the lookup and the note.
            Err(TaskError::AlreadyFinished(_)) => return Err(TaskError::NotCancellable(id)),
            Err(other) => return Err(other),
        }
        signal.raise();
        info!(task_id = %id, "stop requested");
        self.get_task(id)
    }

    /// Raise every outstanding cancel signal. Returns how many were raised.
    pub fn cancel_all(&self) -> usize {
        self.active_tasks()
            .into_iter()
            .filter(|id| self.request_cancel(*id).is_ok())
            .count()
    }
}

impl std::fmt::Debug for TaskRunner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskRunner")
            .field("tasks", &self.inner.registry.len())
            .field("active", &self.inner.signals.len())
            .field("gate_held", &self.inner.gate.is_held())
            .finish()
    }
}

// ── Wrapper ──────────────────────────────────────────────────────────

/// Removes the task's signal and active entry on every exit path of the
/// wrapper, including a dropped wrapper future.
struct CleanupGuard {
    inner: Arc<RunnerInner>,
    id: Uuid,
}

impl Drop for CleanupGuard {
    fn drop(&mut self) {
        self.inner.signals.remove(self.id);
        self.inner.active().remove(&self.id);
    }
}

async fn run_wrapped(
    inner: Arc<RunnerInner>,
    id: Uuid,
    params: TaskParams,
    signal: CancelSignal,
    computation: Arc<dyn Computation>,
) {
    let _guard = CleanupGuard {
        inner: Arc::clone(&inner),
        id,
    };
    let registry = Arc::clone(&inner.registry);

    let acquired = tokio::select! {
        biased;
        _ = signal.raised() => None,
        acquired = inner.gate.acquire() => Some(acquired),
    };
    // Declared after the guard so the gate is released first.
    let _permit = match acquired {
        None => {
            info!(task_id = %id, "stop requested while queued for the gate");
            if let Err(e) = registry.mark_cancelled(id) {
                warn!(task_id = %id, error = %e, "could not record cancellation");
            }
            return;
        }
        Some(Ok(permit)) => permit,
        Some(Err(err)) => {
            warn!(task_id = %id, error = %err, "gate contention, task not started");
            let message = "task failed: another computation is still running, try again later";
            if let Err(e) = registry.mark_failed_with_message(id, err.to_string(), message) {
                warn!(task_id = %id, error = %e, "could not record contention failure");
            }
            return;
        }
    };

    if signal.is_raised() {
        if let Err(e) = registry.mark_cancelled(id) {
            warn!(task_id = %id, error = %e, "could not record cancellation");
        }
        return;
    }

    if let Err(e) = registry.mark_running(id, format!("running {}", computation.name())) {
        warn!(task_id = %id, error = %e, "task left pending state before it could start");
        return;
    }
    info!(task_id = %id, computation = computation.name(), "task started");

    let ctx = TaskContext::new(id, params, signal, Arc::clone(&registry));
    let unit = tokio::spawn(async move { computation.run(ctx).await });

    match unit.await {
        Ok(Ok(())) => {
            let finished = registry.get(id).map(|t| t.is_terminal()).unwrap_or(true);
            if !finished {
                error!(task_id = %id, "computation exited without reporting an outcome");
                record_failure(&registry, id, "computation exited without reporting an outcome");
            }
        }
        Ok(Err(err)) if TaskError::is_cancellation(&err) => {
            match registry.mark_cancelled(id) {
                Ok(_) | Err(TaskError::AlreadyFinished(_)) => {}
                Err(e) => warn!(task_id = %id, error = %e, "could not record cancellation"),
            }
        }
        Ok(Err(err)) => {
            error!(task_id = %id, error = %format!("{:#}", err), "computation failed");
            record_failure(&registry, id, &format!("{:#}", err));
        }
        Err(join_err) if join_err.is_panic() => {
            let reason = panic_message(join_err.into_panic());
            error!(task_id = %id, panic = %reason, "computation panicked");
            record_failure(&registry, id, &format!("computation panicked: {}", reason));
        }
        Err(join_err) => {
            warn!(task_id = %id, error = %join_err, "computation unit aborted");
            record_failure(&registry, id, "computation aborted");
        }
    }
}

fn record_failure(registry: &TaskRegistry, id: Uuid, reason: &str) {
    let err = TaskError::Computation(reason.to_string());
    match registry.mark_failed(id, err.to_string()) {
        Ok(_) => {}
        Err(TaskError::AlreadyFinished(_)) => {
            warn!(task_id = %id, error = %reason, "failure after task had already finished");
        }
        Err(e) => warn!(task_id = %id, error = %e, "could not record failure"),
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;

    use super::*;
    use crate::task::{AnalysisParams, NewsParams, TaskStatus};

    struct Silent;

    #[async_trait]
    impl Computation for Silent {
        fn name(&self) -> &str {
            "silent"
        }

        async fn run(&self, _ctx: TaskContext) -> anyhow::Result<()> {
            Ok(())
        }
    }

    fn config() -> TaskConfig {
        TaskConfig {
            gate_acquire_timeout_secs: 1,
            task_stream_poll_ms: 10,
        }
    }

    async fn wait_terminal(runner: &TaskRunner, id: Uuid) -> Task {
        for _ in 0..200 {
            let task = runner.get_task(id).unwrap();
            if task.is_terminal() {
                return task;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("task {} did not finish", id);
    }

    #[tokio::test]
    async fn missing_computation_is_a_creation_error() {
        let runner = TaskRunner::new(&config(), Computations::new());
        let err = runner
            .create_task(TaskParams::NewsEvaluation(NewsParams::default()))
            .unwrap_err();
        assert!(matches!(err, TaskError::Computation(_)));
        assert!(runner.list_tasks().is_empty());
    }

    #[tokio::test]
    async fn silent_exit_is_recorded_as_failure() {
        let computations =
            Computations::new().with(crate::task::TaskKind::Analysis, Arc::new(Silent));
        let runner = TaskRunner::new(&config(), computations);
        let id = runner
            .create_task(TaskParams::Analysis(AnalysisParams::default()))
            .unwrap();

        let task = wait_terminal(&runner, id).await;
        assert_eq!(task.status, TaskStatus::Failed);
        assert!(task
            .error
            .as_deref()
            .unwrap()
            .contains("without reporting an outcome"));

        // Cleanup removed the wrapper bookkeeping.
        for _ in 0..100 {
            if !runner.is_active(id) {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert!(!runner.is_active(id));
        assert_eq!(runner.request_cancel(id).unwrap_err(), TaskError::NotCancellable(id));
    }

    #[test]
    fn panic_payloads_are_readable() {
        assert_eq!(panic_message(Box::new("static")), "static");
        assert_eq!(panic_message(Box::new(String::from("owned"))), "owned");
        assert_eq!(panic_message(Box::new(7_u8)), "unknown panic payload");
    }
}
