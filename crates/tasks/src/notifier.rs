//! Live-status streams.
//!
//! Two polling variants, both backed by an mpsc channel wrapped in a
//! [`ReceiverStream`]:
//!
//! - [`stream_task`] watches one task's version counter and emits a fresh
//!   snapshot whenever it moves.
//! - [`stream_changes`] serializes an arbitrary producer's value and emits it
//!   whenever the JSON differs from the last emitted one.
//!
//! Each stream runs on its own tokio task and stops as soon as the consumer
//! drops the receiver.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::registry::TaskRegistry;
use crate::task::Task;

const CHANNEL_CAPACITY: usize = 16;
const MIN_POLL: Duration = Duration::from_millis(1);

/// Stream snapshots of one task until it reaches a terminal state.
///
/// The baseline snapshot is sent immediately. An unknown task yields an
/// empty stream; a task removed mid-stream ends it without a final event.
pub fn stream_task(
    registry: Arc<TaskRegistry>,
    id: Uuid,
    interval: Duration,
) -> ReceiverStream<Task> {
    let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);

    tokio::spawn(async move {
        let Some(baseline) = registry.get(id) else {
            debug!(task_id = %id, "stream requested for unknown task");
            return;
        };
        let mut last_version = baseline.version;
        let finished = baseline.is_terminal();
        if tx.send(baseline).await.is_err() || finished {
            return;
        }

        let mut ticker = tokio::time::interval(interval.max(MIN_POLL));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                _ = tx.closed() => {
                    debug!(task_id = %id, "task stream consumer went away");
                    return;
                }
            }

            if registry.version(id) == Some(last_version) {
                continue;
            }
            let Some(task) = registry.get(id) else {
                debug!(task_id = %id, "task disappeared, closing stream");
                return;
            };
            last_version = task.version;
            let finished = task.is_terminal();
            if tx.send(task).await.is_err() || finished {
                return;
            }
        }
    });

    ReceiverStream::new(rx)
}

/// Stream the JSON form of `producer()` whenever it changes.
///
/// The first value is emitted immediately; afterwards a value is only sent if
/// its serialized form differs byte-for-byte from the previous one.
pub fn stream_changes<T, F>(interval: Duration, producer: F) -> ReceiverStream<String>
where
    T: Serialize,
    F: Fn() -> T + Send + 'static,
{
    let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);

    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval.max(MIN_POLL));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut last: Option<String> = None;

        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                _ = tx.closed() => return,
            }

            let json = match serde_json::to_string(&producer()) {
                Ok(json) => json,
                Err(e) => {
                    warn!(error = %e, "failed to serialize snapshot, skipping");
                    continue;
                }
            };
            if last.as_deref() == Some(json.as_str()) {
                continue;
            }
            if tx.send(json.clone()).await.is_err() {
                return;
            }
            last = Some(json);
        }
    });

    ReceiverStream::new(rx)
}
