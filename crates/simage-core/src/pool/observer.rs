//! Buffer-level observers.
//!
//! Presentation layers subscribe here to follow how many batches are in
//! flight. Notifications are advisory: an observer that panics is logged and
//! skipped, never allowed to stall the pool.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

/// Receives the current in-flight batch count whenever it changes.
pub trait BufferLevelObserver: Send + Sync {
    fn buffer_level_changed(&self, level: usize);
}

impl<F> BufferLevelObserver for F
where
    F: Fn(usize) + Send + Sync,
{
    fn buffer_level_changed(&self, level: usize) {
        self(level)
    }
}

/// Handle returned by [`ObserverRegistry::subscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObserverId(u64);

type Entry = (ObserverId, Arc<dyn BufferLevelObserver>);

/// Subscription list owned by one pool.
#[derive(Default)]
pub struct ObserverRegistry {
    next_id: AtomicU64,
    observers: RwLock<Vec<Entry>>,
}

impl ObserverRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an observer; it is called synchronously on every change.
    pub fn subscribe(&self, observer: Arc<dyn BufferLevelObserver>) -> ObserverId {
        let id = ObserverId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.observers
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push((id, observer));
        id
    }

    /// Remove an observer. Returns `false` if it was not registered.
    pub fn unsubscribe(&self, id: ObserverId) -> bool {
        let mut observers = self
            .observers
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let before = observers.len();
        observers.retain(|(existing, _)| *existing != id);
        observers.len() != before
    }

    pub fn len(&self) -> usize {
        self.observers
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Notify every observer of the new level.
    ///
    /// Observers run outside the registry lock, so one may unsubscribe
    /// itself from inside its callback.
    pub fn notify(&self, level: usize) {
        let snapshot: Vec<Entry> = self
            .observers
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone();

        for (id, observer) in snapshot {
            let outcome = catch_unwind(AssertUnwindSafe(|| observer.buffer_level_changed(level)));
            if outcome.is_err() {
                tracing::warn!("Buffer level observer {:?} panicked at level {}", id, level);
            }
        }
    }
}
