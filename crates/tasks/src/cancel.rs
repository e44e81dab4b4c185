//! Cooperative cancellation signals.
//!
//! A signal is a one-way flag: once raised it stays raised. Computations poll
//! it at checkpoints; nothing is ever interrupted preemptively.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};

use tokio::sync::Notify;
use uuid::Uuid;

use crate::registry::{read_lock, write_lock};

#[derive(Debug, Clone, Default)]
pub struct CancelSignal {
    raised: Arc<AtomicBool>,
    wake: Arc<Notify>,
}

impl CancelSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn raise(&self) {
        self.raised.store(true, Ordering::SeqCst);
        self.wake.notify_waiters();
    }

    pub fn is_raised(&self) -> bool {
        self.raised.load(Ordering::SeqCst)
    }

    /// Resolves once the signal is raised.
    pub async fn raised(&self) {
        loop {
            let notified = self.wake.notified();
            tokio::pin!(notified);
            // Register before checking so a concurrent raise is not missed.
            notified.as_mut().enable();
            if self.is_raised() {
                return;
            }
            notified.await;
        }
    }
}

/// Signals of tasks that are still cancellable.
///
/// An entry exists from creation until the runner wrapper exits, so a missing
/// entry means the task is finished (or never existed).
#[derive(Debug, Default)]
pub struct SignalMap {
    signals: RwLock<HashMap<Uuid, CancelSignal>>,
}

impl SignalMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, id: Uuid) -> CancelSignal {
        let signal = CancelSignal::new();
        write_lock(&self.signals).insert(id, signal.clone());
        signal
    }

    pub fn get(&self, id: Uuid) -> Option<CancelSignal> {
        read_lock(&self.signals).get(&id).cloned()
    }

    pub fn remove(&self, id: Uuid) -> Option<CancelSignal> {
        write_lock(&self.signals).remove(&id)
    }

    pub fn len(&self) -> usize {
        read_lock(&self.signals).len()
    }

    pub fn is_empty(&self) -> bool {
        read_lock(&self.signals).is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn raise_is_shared_across_clones() {
        let signal = CancelSignal::new();
        let observer = signal.clone();
        assert!(!observer.is_raised());
        signal.raise();
        signal.raise();
        assert!(observer.is_raised());
    }

    #[tokio::test]
    async fn raised_wakes_a_waiter() {
        let signal = CancelSignal::new();
        let waiter = {
            let signal = signal.clone();
            tokio::spawn(async move { signal.raised().await })
        };
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        assert!(!waiter.is_finished());

        signal.raise();
        tokio::time::timeout(std::time::Duration::from_secs(1), waiter)
            .await
            .unwrap()
            .unwrap();

        // Already raised: resolves immediately.
        signal.raised().await;
    }

    #[test]
    fn map_lifecycle() {
        let map = SignalMap::new();
        let id = Uuid::new_v4();
        let signal = map.register(id);
        assert_eq!(map.len(), 1);

        map.get(id).unwrap().raise();
        assert!(signal.is_raised());

        assert!(map.remove(id).is_some());
        assert!(map.get(id).is_none());
        assert!(map.is_empty());
    }
}
