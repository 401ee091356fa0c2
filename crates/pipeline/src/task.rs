//! Task set - registry of background workers
//!
//! Tracks the drain and heartbeat tasks a runtime spawns so teardown can
//! signal, wait with a timeout, then force-stop.

use std::future::Future;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Registry of spawned background tasks sharing one cancellation token
pub struct TaskSet {
    token: CancellationToken,
    handles: Mutex<Vec<(String, JoinHandle<()>)>>,
}

impl Default for TaskSet {
    fn default() -> Self {
        Self::new()
    }
}

impl TaskSet {
    /// Create an empty task set
    pub fn new() -> Self {
        Self {
            token: CancellationToken::new(),
            handles: Mutex::new(Vec::new()),
        }
    }

    /// The cancellation token shared by all tasks in this set
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// Spawn and track a named task
    pub fn spawn<F>(&self, name: impl Into<String>, future: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let name = name.into();
        let handle = tokio::spawn(future);
        self.handles.lock().push((name, handle));
    }

    /// Number of tracked tasks (finished ones included until shutdown)
    pub fn len(&self) -> usize {
        self.handles.lock().len()
    }

    /// Whether no tasks were ever spawned
    pub fn is_empty(&self) -> bool {
        self.handles.lock().is_empty()
    }

    /// Signal all tasks to stop, wait up to `grace` for each, then abort
    ///
    /// Cancellation fires first; drain tasks respond by flushing what is
    /// left in their rings before exiting, so the grace period bounds
    /// that final flush.
    pub async fn shutdown(&self, grace: Duration) {
        self.token.cancel();

        let handles: Vec<_> = self.handles.lock().drain(..).collect();
        let deadline = tokio::time::Instant::now() + grace;

        for (name, mut handle) in handles {
            match tokio::time::timeout_at(deadline, &mut handle).await {
                Ok(Ok(())) => debug!(task = %name, "task finished"),
                Ok(Err(err)) if err.is_cancelled() => debug!(task = %name, "task aborted"),
                Ok(Err(err)) => warn!(task = %name, %err, "task panicked"),
                Err(_) => {
                    warn!(task = %name, "task did not stop in time, aborting");
                    handle.abort();
                }
            }
        }
    }
}
