//! Single-permit concurrency gate shared by all heavyweight computations.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing::warn;

use crate::error::TaskError;

/// At most one computation holds the gate at a time. Waiting is bounded: a
/// waiter that cannot acquire within `acquire_timeout` gives up with
/// [`TaskError::ContentionTimeout`].
#[derive(Debug, Clone)]
pub struct ConcurrencyGate {
    semaphore: Arc<Semaphore>,
    acquire_timeout: Duration,
}

impl ConcurrencyGate {
    pub fn new(acquire_timeout: Duration) -> Self {
        Self {
            semaphore: Arc::new(Semaphore::new(1)),
            acquire_timeout,
        }
    }

    pub fn acquire_timeout(&self) -> Duration {
        self.acquire_timeout
    }

    /// Wait for the permit. Dropping the returned permit releases the gate.
    pub async fn acquire(&self) -> Result<OwnedSemaphorePermit, TaskError> {
        let acquire = Arc::clone(&self.semaphore).acquire_owned();
        match tokio::time::timeout(self.acquire_timeout, acquire).await {
            Ok(Ok(permit)) => Ok(permit),
            // The semaphore is never closed; treat it like contention.
            Ok(Err(_closed)) => Err(TaskError::ContentionTimeout(self.acquire_timeout)),
            Err(_elapsed) => {
                warn!(
                    timeout_secs = self.acquire_timeout.as_secs(),
                    "gate acquisition timed out"
                );
                Err(TaskError::ContentionTimeout(self.acquire_timeout))
            }
        }
    }

    pub fn is_held(&self) -> bool {
        self.semaphore.available_permits() == 0
    }
}
