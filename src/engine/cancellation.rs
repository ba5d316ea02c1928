use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use tokio_util::sync::CancellationToken;

use super::model::JobId;

/// Cancellation tokens for jobs that a worker is executing.
///
/// Every job token is a child of one root token, so shutdown interrupts all
/// running transcoders with a single call.
#[derive(Debug, Default)]
pub struct CancellationRegistry {
    root: CancellationToken,
    running: Mutex<HashMap<JobId, CancellationToken>>,
}

impl CancellationRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn running(&self) -> MutexGuard<'_, HashMap<JobId, CancellationToken>> {
        self.running.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Token the worker hands to the transcoder for `job_id`.
    pub fn register(&self, job_id: JobId) -> CancellationToken {
        self.running()
            .entry(job_id)
            .or_insert_with(|| self.root.child_token())
            .clone()
    }

    /// Returns whether a running job was signalled.
    pub fn signal(&self, job_id: JobId) -> bool {
        match self.running().get(&job_id) {
            Some(token) => {
                token.cancel();
                true
            }
            None => false,
        }
    }

    pub fn remove(&self, job_id: JobId) {
        self.running().remove(&job_id);
    }

    pub fn cancel_all(&self) {
        self.root.cancel();
    }

    pub fn is_shutting_down(&self) -> bool {
        self.root.is_cancelled()
    }

    pub fn len(&self) -> usize {
        self.running().len()
    }

    pub fn is_empty(&self) -> bool {
        self.running().is_empty()
    }
}
