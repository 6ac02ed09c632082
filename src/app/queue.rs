use std::future::Future;
use std::sync::Arc;

use tokio::sync::{OwnedSemaphorePermit, Semaphore};

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("job queue is full")]
pub struct QueueFull;

/// Bounded in-process job queue.
///
/// `running` caps concurrently executing jobs. `slots` caps running plus
/// waiting jobs and is taken at submit time, so a full queue is reported to
/// the submitter instead of growing without bound.
#[derive(Debug, Clone)]
pub struct InProcessQueue {
    running: Arc<Semaphore>,
    slots: Arc<Semaphore>,
    max_concurrency: usize,
    capacity: usize,
}

/// A reserved place in the queue. Dropping it without spawning frees the slot.
#[derive(Debug)]
pub struct QueueSlot {
    running: Arc<Semaphore>,
    slot: OwnedSemaphorePermit,
}

impl InProcessQueue {
    pub fn new(max_concurrency: usize, capacity: usize) -> Self {
        let max_concurrency = max_concurrency.max(1);
        Self {
            running: Arc::new(Semaphore::new(max_concurrency)),
            slots: Arc::new(Semaphore::new(max_concurrency + capacity)),
            max_concurrency,
            capacity,
        }
    }

    pub fn reserve(&self) -> Result<QueueSlot, QueueFull> {
        let slot = Arc::clone(&self.slots)
            .try_acquire_owned()
            .map_err(|_| QueueFull)?;
        Ok(QueueSlot {
            running: Arc::clone(&self.running),
            slot,
        })
    }

    pub fn max_concurrency(&self) -> usize {
        self.max_concurrency
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Jobs currently running or waiting.
    pub fn in_flight(&self) -> usize {
        self.max_concurrency + self.capacity - self.slots.available_permits()
    }
}

impl QueueSlot {
    pub fn spawn<F>(self, fut: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let Self { running, slot } = self;
        tokio::spawn(async move {
            let _slot = slot;
            // The semaphore is never closed.
            let Ok(_permit) = running.acquire_owned().await else {
                return;
            };
            fut.await;
        });
    }
}
