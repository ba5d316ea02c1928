use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::{Notify, OwnedSemaphorePermit, Semaphore};
use tokio_util::sync::CancellationToken;

use super::error::QueueError;
use super::model::JobId;

/// Single FIFO of job ids waiting for a worker.
///
/// Depth is bounded: `enqueue` on a full queue fails instead of waiting. The
/// number of ids handed out at once is capped by a semaphore sized to the
/// worker count; a [`Lease`] holds one slot until it is dropped.
#[derive(Debug)]
pub struct JobQueue {
    entries: Mutex<VecDeque<JobId>>,
    capacity: usize,
    available: Notify,
    slots: Arc<Semaphore>,
    concurrency: usize,
    shutdown: CancellationToken,
}

/// A dequeued job id plus the in-flight slot it occupies.
#[derive(Debug)]
pub struct Lease {
    job_id: JobId,
    _slot: OwnedSemaphorePermit,
}

impl Lease {
    pub fn job_id(&self) -> JobId {
        self.job_id
    }
}

impl JobQueue {
    pub fn new(capacity: usize, concurrency: usize) -> Self {
        let concurrency = concurrency.max(1);
        Self {
            entries: Mutex::new(VecDeque::with_capacity(capacity)),
            capacity: capacity.max(1),
            available: Notify::new(),
            slots: Arc::new(Semaphore::new(concurrency)),
            concurrency,
            shutdown: CancellationToken::new(),
        }
    }

    fn entries(&self) -> MutexGuard<'_, VecDeque<JobId>> {
        // the guarded section never panics, poisoning carries no broken invariant
        self.entries.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn enqueue(&self, job_id: JobId) -> Result<(), QueueError> {
        if self.shutdown.is_cancelled() {
            return Err(QueueError::Closed);
        }
        {
            let mut entries = self.entries();
            if entries.len() >= self.capacity {
                return Err(QueueError::Full {
                    capacity: self.capacity,
                });
            }
            entries.push_back(job_id);
        }
        self.available.notify_one();
        Ok(())
    }

    /// Puts a job that was already admitted back at the head of the line.
    /// The depth limit does not apply: the job held a place before.
    pub fn requeue(&self, job_id: JobId) -> Result<(), QueueError> {
        if self.shutdown.is_cancelled() {
            return Err(QueueError::Closed);
        }
        self.entries().push_front(job_id);
        self.available.notify_one();
        Ok(())
    }

    /// Waits for both a free in-flight slot and a queued id.
    ///
    /// Returns `None` once the queue is closed.
    pub async fn dequeue(&self) -> Option<Lease> {
        let slot = tokio::select! {
            slot = self.slots.clone().acquire_owned() => slot.ok()?,
            _ = self.shutdown.cancelled() => return None,
        };

        loop {
            if self.shutdown.is_cancelled() {
                return None;
            }
            if let Some(job_id) = self.pop() {
                return Some(Lease { job_id, _slot: slot });
            }
            tokio::select! {
                _ = self.available.notified() => {}
                _ = self.shutdown.cancelled() => return None,
            }
        }
    }

    fn pop(&self) -> Option<JobId> {
        let mut entries = self.entries();
        let job_id = entries.pop_front()?;
        if !entries.is_empty() {
            // pass the wakeup on so a second idle worker picks up the rest
            self.available.notify_one();
        }
        Some(job_id)
    }

    /// Removes `job_id` if it has not been handed to a worker yet.
    pub fn cancel_if_queued(&self, job_id: JobId) -> bool {
        let mut entries = self.entries();
        match entries.iter().position(|id| *id == job_id) {
            Some(index) => {
                entries.remove(index);
                true
            }
            None => false,
        }
    }

    pub fn len(&self) -> usize {
        self.entries().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries().is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Leases currently held by workers.
    pub fn in_flight(&self) -> usize {
        self.concurrency - self.slots.available_permits()
    }

    /// Wakes every waiting `dequeue` with `None` and rejects further work.
    pub fn close(&self) {
        self.shutdown.cancel();
    }

    pub fn is_closed(&self) -> bool {
        self.shutdown.is_cancelled()
    }
}
