//! Bounded fan-out with shared cancellation.

use std::future::Future;
use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::error::{MigrateError, Result};

/// Runs tasks with at most `limit` in flight.
///
/// The first task error cancels the group's token and is returned by
/// [`TaskGroup::wait`]; errors caused by that cancellation are not reported.
#[derive(Debug)]
pub struct TaskGroup {
    tasks: JoinSet<Result<()>>,
    permits: Arc<Semaphore>,
    cancel: CancellationToken,
}

impl TaskGroup {
    /// Group whose token is a child of `parent`.
    pub fn new(limit: usize, parent: &CancellationToken) -> Self {
        Self {
            tasks: JoinSet::new(),
            permits: Arc::new(Semaphore::new(limit.max(1))),
            cancel: parent.child_token(),
        }
    }

    /// Token cancelled when the group fails or the parent is cancelled.
    pub fn token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Spawns `task` once a permit is free. Tasks not yet started when the
    /// group is cancelled never run; running ones are dropped at their next
    /// await point, which abandons in-flight API calls and retry back-off.
    pub fn spawn<F>(&mut self, task: F)
    where
        F: Future<Output = Result<()>> + Send + 'static,
    {
        let permits = Arc::clone(&self.permits);
        let cancel = self.cancel.clone();
        self.tasks.spawn(async move {
            let _permit = tokio::select! {
                _ = cancel.cancelled() => return Err(MigrateError::Cancelled),
                permit = permits.acquire_owned() => permit
                    .map_err(|_| MigrateError::Task("task group closed".into()))?,
            };
            if cancel.is_cancelled() {
                return Err(MigrateError::Cancelled);
            }
            tokio::select! {
                biased;
                result = task => result,
                _ = cancel.cancelled() => Err(MigrateError::Cancelled),
            }
        });
    }

    /// Number of tasks not yet joined.
    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    /// Returns true when no task is pending.
    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Waits for every task and returns the first error.
    pub async fn wait(mut self) -> Result<()> {
        let mut first: Option<MigrateError> = None;
        while let Some(joined) = self.tasks.join_next().await {
            let outcome = joined.map_err(|e| MigrateError::Task(e.to_string())).and_then(|r| r);
            let Err(e) = outcome else { continue };
            match &first {
                None => {
                    debug!(error = %e, "task failed; cancelling group");
                    self.cancel.cancel();
                    first = Some(e);
                }
                Some(_) if e.is_cancelled() => {}
                Some(_) => debug!(error = %e, "further task failure"),
            }
        }
        match first {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}
