//! In-memory task registry with per-task version counters.
//!
//! The registry exclusively owns canonical [`Task`] records. Every mutation
//! goes through a registry method that changes the fields and bumps
//! `version` inside the same per-task write lock, so a reader can never see a
//! new status paired with an old version.
//!
//! Locking is two-level: the ordered task map is only locked long enough to
//! look up (or insert) an entry, and each entry carries its own lock. Status
//! reads therefore never queue behind a running computation's writes to a
//! different task.

use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard, Weak};

use chrono::Utc;
use indexmap::IndexMap;
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::TaskError;
use crate::task::{Task, TaskStatus};

pub(crate) fn read_lock<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(PoisonError::into_inner)
}

pub(crate) fn write_lock<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(PoisonError::into_inner)
}

#[derive(Debug)]
struct TaskEntry {
    task: RwLock<Task>,
}

/// Thread-safe store of every task created in this process.
#[derive(Debug, Default)]
pub struct TaskRegistry {
    tasks: RwLock<IndexMap<Uuid, Arc<TaskEntry>>>,
    /// Most recently completed task. Weak: the map owns the record.
    last_completed: RwLock<Weak<TaskEntry>>,
}

impl TaskRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Admit a task. An existing record with the same ID is left untouched.
    pub fn insert(&self, task: Task) -> Uuid {
        let id = task.id;
        let mut tasks = write_lock(&self.tasks);
        tasks.entry(id).or_insert_with(|| {
            Arc::new(TaskEntry {
                task: RwLock::new(task),
            })
        });
        id
    }

    /// Snapshot of one task.
    pub fn get(&self, id: Uuid) -> Option<Task> {
        self.entry(id).map(|e| read_lock(&e.task).clone())
    }

    /// Snapshots of all tasks in creation order.
    pub fn list(&self) -> Vec<Task> {
        let entries: Vec<Arc<TaskEntry>> = read_lock(&self.tasks).values().cloned().collect();
        entries.iter().map(|e| read_lock(&e.task).clone()).collect()
    }

    /// Current version of a task, without cloning the record.
    pub fn version(&self, id: Uuid) -> Option<u64> {
        self.entry(id).map(|e| read_lock(&e.task).version)
    }

    pub fn len(&self) -> usize {
        read_lock(&self.tasks).len()
    }

    pub fn is_empty(&self) -> bool {
        read_lock(&self.tasks).is_empty()
    }

    /// Number of tasks currently in `Running`.
    pub fn running_count(&self) -> usize {
        let entries: Vec<Arc<TaskEntry>> = read_lock(&self.tasks).values().cloned().collect();
        entries
            .iter()
            .filter(|e| read_lock(&e.task).status == TaskStatus::Running)
            .count()
    }

    /// Drop a task from the registry. Live streams on it end quietly.
    pub fn remove(&self, id: Uuid) -> Option<Task> {
        let entry = write_lock(&self.tasks).shift_remove(&id)?;
        let task = read_lock(&entry.task).clone();
        Some(task)
    }

    // ── Mutations ────────────────────────────────────────────────────

    /// Record progress and the current step. Progress is clamped to `[0, 1]`.
    pub fn update_progress(
        &self,
        id: Uuid,
        progress: f64,
        message: impl Into<String>,
    ) -> Result<u64, TaskError> {
        let message = message.into();
        let version = self.mutate(id, |task| {
            ensure_active(task)?;
            task.progress = clamp_progress(progress);
            task.message = message.clone();
            Ok(())
        })?;
        debug!(
            task_id = %id,
            progress = %format!("{:.1}%", clamp_progress(progress) * 100.0),
            "{}",
            message
        );
        Ok(version)
    }

    /// Move a pending task to `Running` once it holds the gate.
    pub fn mark_running(&self, id: Uuid, message: impl Into<String>) -> Result<u64, TaskError> {
        let message = message.into();
        self.mutate(id, |task| {
            ensure_active(task)?;
            task.status = TaskStatus::Running;
            task.message = message;
            Ok(())
        })
    }

    /// Terminal success. Also becomes the "last completed" task.
    pub fn mark_completed(
        &self,
        id: Uuid,
        result: serde_json::Value,
        message: impl Into<String>,
    ) -> Result<u64, TaskError> {
        let message = message.into();
        let version = self.mutate(id, |task| {
            ensure_active(task)?;
            task.status = TaskStatus::Completed;
            task.progress = 1.0;
            task.message = message;
            task.result = Some(result);
            task.completed_at = Some(Utc::now());
            Ok(())
        })?;
        self.set_last_completed(id)?;
        info!(task_id = %id, "task completed");
        Ok(version)
    }

    /// Terminal failure with the error's description.
    pub fn mark_failed(&self, id: Uuid, error: impl Into<String>) -> Result<u64, TaskError> {
        let error = error.into();
        let message = format!("task failed: {}", error);
        self.mark_failed_with_message(id, error, message)
    }

    /// Terminal failure with a caller-chosen user-facing message.
    pub fn mark_failed_with_message(
        &self,
        id: Uuid,
        error: impl Into<String>,
        message: impl Into<String>,
    ) -> Result<u64, TaskError> {
        let error = error.into();
        let message = message.into();
        self.mutate(id, |task| {
            ensure_active(task)?;
            task.status = TaskStatus::Failed;
            task.message = message;
            task.error = Some(error);
            task.completed_at = Some(Utc::now());
            Ok(())
        })
    }

    /// Terminal cooperative stop.
    pub fn mark_cancelled(&self, id: Uuid) -> Result<u64, TaskError> {
        let version = self.mutate(id, |task| {
            ensure_active(task)?;
            task.status = TaskStatus::Cancelled;
            task.message = "task cancelled".to_string();
            task.completed_at = Some(Utc::now());
            Ok(())
        })?;
        info!(task_id = %id, "task cancelled by user");
        Ok(version)
    }

    /// Make a pending stop visible to pollers; status is left as it is until
    /// the computation observes the signal.
    pub fn note_cancel_requested(&self, id: Uuid) -> Result<u64, TaskError> {
        self.mutate(id, |task| {
            ensure_active(task)?;
            task.message = "stop requested, cleaning up".to_string();
            Ok(())
        })
    }

    // ── Last completed ───────────────────────────────────────────────

    pub fn set_last_completed(&self, id: Uuid) -> Result<(), TaskError> {
        let entry = self.entry(id).ok_or(TaskError::NotFound(id))?;
        *write_lock(&self.last_completed) = Arc::downgrade(&entry);
        Ok(())
    }

    /// The most recently completed task, if it is still registered.
    pub fn last_completed(&self) -> Option<Task> {
        let entry = read_lock(&self.last_completed).upgrade()?;
        let task = read_lock(&entry.task).clone();
        Some(task)
    }

    // ── Internals ────────────────────────────────────────────────────

    fn entry(&self, id: Uuid) -> Option<Arc<TaskEntry>> {
        read_lock(&self.tasks).get(&id).cloned()
    }

    /// Apply `f` and bump the version under one write lock. Nothing is
    /// bumped when `f` rejects the change.
    fn mutate<F>(&self, id: Uuid, f: F) -> Result<u64, TaskError>
    where
        F: FnOnce(&mut Task) -> Result<(), TaskError>,
    {
        let entry = self.entry(id).ok_or(TaskError::NotFound(id))?;
        let mut task = write_lock(&entry.task);
        f(&mut task)?;
        task.version += 1;
        Ok(task.version)
    }
}

fn ensure_active(task: &Task) -> Result<(), TaskError> {
    if task.is_terminal() {
        Err(TaskError::AlreadyFinished(task.id))
    } else {
        Ok(())
    }
}

fn clamp_progress(progress: f64) -> f64 {
    if progress.is_nan() {
        0.0
    } else {
        progress.clamp(0.0, 1.0)
    }
}

#[cfg(test)]
mod tests {
    use std::thread;

    use super::*;
    use crate::task::{AnalysisParams, TaskParams};

    fn pending(registry: &TaskRegistry) -> Uuid {
        registry.insert(Task::pending(
            Uuid::new_v4(),
            TaskParams::Analysis(AnalysisParams::default()),
            "queued",
        ))
    }

    fn check_invariants(task: &Task) {
        assert_eq!(task.error.is_some(), task.status == TaskStatus::Failed);
        if task.result.is_some() {
            assert_eq!(task.status, TaskStatus::Completed);
        }
        assert_eq!(task.completed_at.is_some(), task.is_terminal());
    }

    #[test]
    fn every_mutation_bumps_version() {
        let registry = TaskRegistry::new();
        let id = pending(&registry);
        assert_eq!(registry.version(id), Some(0));

        assert_eq!(registry.mark_running(id, "started").unwrap(), 1);
        assert_eq!(registry.update_progress(id, 0.25, "fetching").unwrap(), 2);
        assert_eq!(registry.note_cancel_requested(id).unwrap(), 3);
        assert_eq!(
            registry.mark_completed(id, serde_json::json!({"count": 1}), "done").unwrap(),
            4
        );

        let task = registry.get(id).unwrap();
        assert_eq!(task.version, 4);
        assert_eq!(task.progress, 1.0);
        check_invariants(&task);
    }

    #[test]
    fn progress_is_clamped() {
        let registry = TaskRegistry::new();
        let id = pending(&registry);
        registry.update_progress(id, 1.7, "overshoot").unwrap();
        assert_eq!(registry.get(id).unwrap().progress, 1.0);
        registry.update_progress(id, -3.0, "undershoot").unwrap();
        assert_eq!(registry.get(id).unwrap().progress, 0.0);
        registry.update_progress(id, f64::NAN, "nan").unwrap();
        assert_eq!(registry.get(id).unwrap().progress, 0.0);
    }

    #[test]
    fn terminal_state_is_final() {
        let registry = TaskRegistry::new();
        let id = pending(&registry);
        registry.mark_failed(id, "boom").unwrap();
        let failed = registry.get(id).unwrap();
        check_invariants(&failed);
        assert_eq!(failed.error.as_deref(), Some("boom"));
        assert_eq!(failed.message, "task failed: boom");

        assert_eq!(registry.mark_cancelled(id), Err(TaskError::AlreadyFinished(id)));
        assert_eq!(
            registry.update_progress(id, 0.5, "late"),
            Err(TaskError::AlreadyFinished(id))
        );
        assert!(registry
            .mark_completed(id, serde_json::json!({}), "late")
            .is_err());

        let after = registry.get(id).unwrap();
        assert_eq!(after, failed, "rejected mutations must not change the record");
    }

    #[test]
    fn unknown_task_is_not_found() {
        let registry = TaskRegistry::new();
        let id = Uuid::new_v4();
        assert!(registry.get(id).is_none());
        assert_eq!(registry.mark_cancelled(id), Err(TaskError::NotFound(id)));
        assert_eq!(registry.set_last_completed(id), Err(TaskError::NotFound(id)));
    }

    #[test]
    fn last_completed_tracks_latest_completion() {
        let registry = TaskRegistry::new();
        assert!(registry.last_completed().is_none());

        let first = pending(&registry);
        let second = pending(&registry);
        registry.mark_completed(first, serde_json::json!(1), "done").unwrap();
        assert_eq!(registry.last_completed().unwrap().id, first);

        registry.mark_completed(second, serde_json::json!(2), "done").unwrap();
        assert_eq!(registry.last_completed().unwrap().id, second);

        // Failing does not move the pointer.
        let third = pending(&registry);
        registry.mark_failed(third, "nope").unwrap();
        assert_eq!(registry.last_completed().unwrap().id, second);

        // The pointer is weak: removing the record clears it.
        registry.remove(second);
        assert!(registry.last_completed().is_none());
    }

    #[test]
    fn list_keeps_creation_order_and_counts_running() {
        let registry = TaskRegistry::new();
        let ids: Vec<Uuid> = (0..3).map(|_| pending(&registry)).collect();
        registry.mark_running(ids[1], "go").unwrap();

        let listed: Vec<Uuid> = registry.list().iter().map(|t| t.id).collect();
        assert_eq!(listed, ids);
        assert_eq!(registry.running_count(), 1);
        assert_eq!(registry.len(), 3);
    }

    #[test]
    fn concurrent_writers_never_reuse_a_version() {
        let registry = Arc::new(TaskRegistry::new());
        let id = pending(&registry);

        let handles: Vec<_> = (0..8)
            .map(|w| {
                let registry = Arc::clone(&registry);
                thread::spawn(move || {
                    (0..50)
                        .map(|i| {
                            registry
                                .update_progress(id, i as f64 / 50.0, format!("w{} step {}", w, i))
                                .unwrap()
                        })
                        .collect::<Vec<u64>>()
                })
            })
            .collect();

        let mut versions: Vec<u64> = handles
            .into_iter()
            .flat_map(|h| h.join().unwrap())
            .collect();
        versions.sort_unstable();
        versions.dedup();
        assert_eq!(versions.len(), 400, "each mutation must get its own version");
        assert_eq!(registry.version(id), Some(400));
    }
}
