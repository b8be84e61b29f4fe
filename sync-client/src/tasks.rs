//! Task group for side work during a sync run.
//!
//! Contact/group refreshes and media downloads run next to the ingestion
//! loop. They must never block it, their failures must not fail the run,
//! and none of them may outlive the run. [`TaskGroup`] owns them:
//!
//! - every task gets a child of the run's cancellation token
//! - a failed task becomes a [`SyncWarning`]
//! - [`TaskGroup::drain`] waits (bounded) for the rest after a clean finish
//! - [`TaskGroup::shutdown`] cancels and joins everything
//!
//! Dropping the group cancels and aborts whatever is still running.

use std::future::Future;
use std::time::Duration;
use sync_types::{SyncWarning, WarningKind};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

/// Structured owner of a sync run's side tasks.
#[derive(Debug)]
pub struct TaskGroup {
    set: JoinSet<Option<SyncWarning>>,
    cancel: CancellationToken,
}

impl TaskGroup {
    /// Create a group whose tasks are cancelled together with `parent`.
    pub fn new(parent: &CancellationToken) -> Self {
        Self {
            set: JoinSet::new(),
            cancel: parent.child_token(),
        }
    }

    /// Spawn a side task. An `Err` turns into a warning of the given kind.
    pub fn spawn<F>(&mut self, kind: WarningKind, task: F)
    where
        F: Future<Output = Result<(), String>> + Send + 'static,
    {
        let cancel = self.cancel.clone();
        self.set.spawn(async move {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    tracing::debug!(task = %kind, "side task cancelled");
                    None
                }
                result = task => match result {
                    Ok(()) => None,
                    Err(message) => {
                        tracing::warn!(task = %kind, "side task failed: {}", message);
                        Some(SyncWarning::new(kind, message))
                    }
                },
            }
        });
    }

    /// Number of tasks not yet joined.
    pub fn len(&self) -> usize {
        self.set.len()
    }

    /// Check if no tasks are pending.
    pub fn is_empty(&self) -> bool {
        self.set.is_empty()
    }

    /// Wait up to `timeout` for pending tasks, then cancel the stragglers.
    ///
    /// Returns the warnings of every task that failed.
    pub async fn drain(mut self, timeout: Duration) -> Vec<SyncWarning> {
        let mut warnings = Vec::new();
        let deadline = tokio::time::sleep(timeout);
        tokio::pin!(deadline);

        loop {
            tokio::select! {
                biased;
                joined = self.set.join_next() => match joined {
                    Some(result) => collect(result, &mut warnings),
                    None => return warnings,
                },
                _ = &mut deadline => {
                    tracing::debug!(pending = self.set.len(), "drain timeout, cancelling side tasks");
                    break;
                }
            }
        }

        warnings.extend(self.shutdown().await);
        warnings
    }

    /// Cancel all pending tasks and wait for them to finish.
    pub async fn shutdown(mut self) -> Vec<SyncWarning> {
        self.cancel.cancel();
        let mut warnings = Vec::new();
        while let Some(result) = self.set.join_next().await {
            collect(result, &mut warnings);
        }
        warnings
    }
}

impl Drop for TaskGroup {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

fn collect(
    result: Result<Option<SyncWarning>, tokio::task::JoinError>,
    warnings: &mut Vec<SyncWarning>,
) {
    match result {
        Ok(Some(warning)) => warnings.push(warning),
        Ok(None) => {}
        Err(e) if e.is_cancelled() => {}
        Err(e) => tracing::error!("side task panicked: {}", e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    #[tokio::test]
    async fn failures_become_warnings() {
        let token = CancellationToken::new();
        let mut group = TaskGroup::new(&token);
        group.spawn(WarningKind::RefreshContacts, async { Ok(()) });
        group.spawn(WarningKind::Media, async { Err("404".to_string()) });

        let warnings = group.drain(Duration::from_secs(5)).await;
        assert_eq!(warnings, vec![SyncWarning::new(WarningKind::Media, "404")]);
    }

    #[tokio::test(start_paused = true)]
    async fn drain_cancels_stragglers_after_timeout() {
        let token = CancellationToken::new();
        let mut group = TaskGroup::new(&token);
        let finished = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&finished);
        group.spawn(WarningKind::Media, async move {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            flag.store(true, Ordering::SeqCst);
            Ok(())
        });

        let start = tokio::time::Instant::now();
        let warnings = group.drain(Duration::from_secs(1)).await;
        assert!(warnings.is_empty());
        assert!(start.elapsed() < Duration::from_secs(2));
        assert!(!finished.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn parent_cancellation_reaches_tasks() {
        let token = CancellationToken::new();
        let mut group = TaskGroup::new(&token);
        group.spawn(WarningKind::RefreshGroups, async {
            std::future::pending::<()>().await;
            Ok(())
        });
        assert_eq!(group.len(), 1);

        token.cancel();
        let warnings = group.shutdown().await;
        assert!(warnings.is_empty());
    }

    #[tokio::test]
    async fn empty_group_drains_immediately() {
        let token = CancellationToken::new();
        let group = TaskGroup::new(&token);
        assert!(group.is_empty());
        assert!(group.drain(Duration::from_secs(60)).await.is_empty());
    }
}
