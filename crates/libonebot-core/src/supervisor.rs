//! Background task supervision.

use std::future::Future;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

/// Owner of every background task an implementation spawns.
///
/// Transports, heartbeat loops and event fan-out all run as supervised
/// tasks. Cancelling the supervisor asks all of them to stop;
/// [`TaskSupervisor::shutdown`] additionally waits until they have.
///
/// Clones share the same tracker and token, so any clone can spawn and
/// any clone can shut the whole set down.
#[derive(Debug, Clone)]
pub struct TaskSupervisor {
    tracker: TaskTracker,
    token: CancellationToken,
}

impl TaskSupervisor {
    pub fn new() -> Self {
        Self {
            tracker: TaskTracker::new(),
            token: CancellationToken::new(),
        }
    }

    /// Spawns a tracked task.
    ///
    /// The task is responsible for watching [`TaskSupervisor::token`]
    /// and returning once it fires.
    pub fn spawn<F>(&self, task: F) -> JoinHandle<F::Output>
    where
        F: Future + Send + 'static,
        F::Output: Send + 'static,
    {
        self.tracker.spawn(task)
    }

    /// The shared cancellation token.
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// A token cancelled with the supervisor, but also cancellable on
    /// its own. Used for tasks that can end early, like one peer's
    /// heartbeat loop.
    pub fn child_token(&self) -> CancellationToken {
        self.token.child_token()
    }

    /// Requests all tasks to stop without waiting for them.
    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Cancels all tasks and waits until every tracked task finished.
    pub async fn shutdown(&self) {
        self.token.cancel();
        self.tracker.close();
        self.tracker.wait().await;
    }
}

impl Default for TaskSupervisor {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn shutdown_waits_for_spawned_tasks() {
        let supervisor = TaskSupervisor::new();
        let finished = Arc::new(AtomicUsize::new(0));

        for _ in 0..3 {
            let token = supervisor.token();
            let finished = finished.clone();
            supervisor.spawn(async move {
                token.cancelled().await;
                finished.fetch_add(1, Ordering::SeqCst);
            });
        }

        supervisor.shutdown().await;
        assert_eq!(finished.load(Ordering::SeqCst), 3);
        assert!(supervisor.is_cancelled());
    }

    #[tokio::test]
    async fn child_token_cancels_without_stopping_supervisor() {
        let supervisor = TaskSupervisor::new();
        let child = supervisor.child_token();
        child.cancel();
        assert!(!supervisor.is_cancelled());

        let child = supervisor.child_token();
        supervisor.cancel();
        assert!(child.is_cancelled());
    }
}
