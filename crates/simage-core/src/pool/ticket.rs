//! Job tickets: the pool's admission control.
//!
//! One ticket is held per in-flight batch, from just before the batch is
//! queued until its sink write finishes. Tickets release on drop, so every
//! exit path of a job (success, cancellation, panic) gives its ticket back
//! exactly once.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

use crate::error::PoolError;

use super::observer::ObserverRegistry;

struct BoothInner {
    semaphore: Arc<Semaphore>,
    capacity: usize,
    // Counted separately from the semaphore so `wait_idle` never shows up
    // as a full buffer.
    held: AtomicUsize,
    // Serializes level changes with their notification, so observers see
    // levels in the order they happened.
    transition: Mutex<()>,
    observers: Arc<ObserverRegistry>,
}

impl BoothInner {
    fn transition(&self) -> MutexGuard<'_, ()> {
        self.transition
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Hands out at most `capacity` tickets at a time.
#[derive(Clone)]
pub struct TicketBooth {
    inner: Arc<BoothInner>,
}

impl TicketBooth {
    pub fn new(capacity: usize, observers: Arc<ObserverRegistry>) -> Self {
        Self {
            inner: Arc::new(BoothInner {
                semaphore: Arc::new(Semaphore::new(capacity)),
                capacity,
                held: AtomicUsize::new(0),
                transition: Mutex::new(()),
                observers,
            }),
        }
    }

    pub fn capacity(&self) -> usize {
        self.inner.capacity
    }

    /// Tickets currently held, i.e. the buffer level.
    pub fn in_use(&self) -> usize {
        self.inner.held.load(Ordering::Acquire)
    }

    /// Wait for a ticket. Fails once the booth is closed, including for
    /// callers already waiting when it closes.
    pub async fn acquire(&self) -> Result<JobTicket, PoolError> {
        let permit = self
            .inner
            .semaphore
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| PoolError::Closed)?;

        let _transition = self.inner.transition();
        let level = self.inner.held.fetch_add(1, Ordering::AcqRel) + 1;
        self.inner.observers.notify(level);
        Ok(JobTicket {
            permit: Some(permit),
            booth: self.clone(),
        })
    }

    /// Wait until every ticket has been returned.
    ///
    /// Returns immediately if the booth is closed.
    pub async fn wait_idle(&self) {
        let all = u32::try_from(self.inner.capacity).unwrap_or(u32::MAX);
        if let Ok(permits) = self.inner.semaphore.acquire_many(all).await {
            drop(permits);
        }
    }

    /// Refuse all further acquisitions and wake blocked waiters.
    pub fn close(&self) {
        self.inner.semaphore.close();
    }
}

/// Capacity token for one batch. Dropping it releases the slot.
pub struct JobTicket {
    permit: Option<OwnedSemaphorePermit>,
    booth: TicketBooth,
}

impl std::fmt::Debug for JobTicket {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JobTicket")
            .field("held", &self.permit.is_some())
            .finish()
    }
}

impl Drop for JobTicket {
    fn drop(&mut self) {
        let Some(permit) = self.permit.take() else {
            return;
        };
        {
            let _transition = self.booth.inner.transition();
            let level = self.booth.inner.held.fetch_sub(1, Ordering::AcqRel) - 1;
            self.booth.inner.observers.notify(level);
        }
        // The slot only frees up once observers have seen the release.
        drop(permit);
    }
}
