use futures_util::stream::BoxStream;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use tokio::sync::broadcast::{self, error::RecvError};
use tracing::debug;

use super::model::{JobId, ProgressEvent};

/// Stream of progress events for one job: the snapshot at subscription time
/// followed by every later change, ending after the terminal event.
pub type ProgressStream = BoxStream<'static, ProgressEvent>;

/// Per-job fan-out of progress events.
///
/// Each job gets a bounded broadcast channel. A subscriber that falls behind
/// loses the oldest events rather than slowing the publisher down; since
/// every event carries the full job state, skipping ahead is harmless.
#[derive(Debug)]
pub struct ProgressNotifier {
    channels: Mutex<HashMap<JobId, broadcast::Sender<ProgressEvent>>>,
    buffer: usize,
}

impl ProgressNotifier {
    pub fn new(buffer: usize) -> Self {
        Self {
            channels: Mutex::new(HashMap::new()),
            buffer: buffer.max(1),
        }
    }

    fn channels(&self) -> MutexGuard<'_, HashMap<JobId, broadcast::Sender<ProgressEvent>>> {
        self.channels.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Fans `event` out to current subscribers. Never blocks.
    ///
    /// The channel is dropped after a terminal event so open streams end.
    pub fn publish(&self, event: ProgressEvent) {
        let mut channels = self.channels();
        let terminal = event.is_terminal();
        let job_id = event.job_id;

        if let Some(sender) = channels.get(&job_id) {
            // Err only means nobody is listening right now
            let _ = sender.send(event);
        }
        if terminal {
            channels.remove(&job_id);
        }
    }

    pub fn subscribe(&self, job_id: JobId) -> broadcast::Receiver<ProgressEvent> {
        let mut channels = self.channels();
        channels
            .entry(job_id)
            .or_insert_with(|| broadcast::channel(self.buffer).0)
            .subscribe()
    }

    /// Drops the channel for `job_id` if no receiver is left.
    pub fn release(&self, job_id: JobId) {
        let mut channels = self.channels();
        if channels
            .get(&job_id)
            .is_some_and(|sender| sender.receiver_count() == 0)
        {
            channels.remove(&job_id);
        }
    }

    pub fn subscriber_count(&self, job_id: JobId) -> usize {
        self.channels()
            .get(&job_id)
            .map(|sender| sender.receiver_count())
            .unwrap_or(0)
    }

    /// Turns a receiver into a stream that starts with `snapshot` and only
    /// yields strictly newer revisions after it.
    pub fn stream(snapshot: ProgressEvent, mut rx: broadcast::Receiver<ProgressEvent>) -> ProgressStream {
        Box::pin(async_stream::stream! {
            let job_id = snapshot.job_id;
            let mut last_revision = snapshot.revision;
            let done = snapshot.is_terminal();
            yield snapshot;
            if done {
                return;
            }

            loop {
                match rx.recv().await {
                    Ok(event) => {
                        if event.revision <= last_revision {
                            continue;
                        }
                        last_revision = event.revision;
                        let terminal = event.is_terminal();
                        yield event;
                        if terminal {
                            break;
                        }
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        debug!(job_id = %job_id, skipped, "Progress subscriber lagged");
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        })
    }
}
