//! Execution units for accepted connections and their helper tasks.
//!
//! The engine never spawns on its own; every task goes through the [`TaskExecutor`] held by
//! the server configuration, so embedders can pin connections to a specific runtime.

use async_trait::async_trait;
use futures::future::BoxFuture;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::trace;

/// Runs futures to completion on some execution unit.
///
/// The returned handle must already be running.
pub trait TaskExecutor: Send + Sync + 'static {
    fn execute(&self, task: BoxFuture<'static, ()>) -> Box<dyn RunningTask>;
}

/// Handle to a task started by a [`TaskExecutor`].
#[async_trait]
pub trait RunningTask: Send + Sync {
    /// Asks the task to stop at its next suspension point.
    fn interrupt(&self);

    fn is_alive(&self) -> bool;

    /// Waits for the task to finish, whether it completed or was interrupted.
    async fn join(self: Box<Self>);
}

/// Default executor backed by tokio tasks.
#[derive(Debug, Clone, Default)]
pub struct TokioExecutor {
    handle: Option<Handle>,
}

impl TokioExecutor {
    /// Spawns on whichever runtime is current when [`TaskExecutor::execute`] is called.
    pub fn new() -> Self {
        Self::default()
    }

    /// Spawns every task on the given runtime.
    pub fn with_handle(handle: Handle) -> Self {
        Self { handle: Some(handle) }
    }
}

impl TaskExecutor for TokioExecutor {
    fn execute(&self, task: BoxFuture<'static, ()>) -> Box<dyn RunningTask> {
        let join_handle = match &self.handle {
            Some(handle) => handle.spawn(task),
            None => tokio::spawn(task),
        };
        Box::new(TokioTask { join_handle })
    }
}

struct TokioTask {
    join_handle: JoinHandle<()>,
}

#[async_trait]
impl RunningTask for TokioTask {
    fn interrupt(&self) {
        self.join_handle.abort();
    }

    fn is_alive(&self) -> bool {
        !self.join_handle.is_finished()
    }

    async fn join(self: Box<Self>) {
        if let Err(e) = self.join_handle.await {
            trace!(cause = %e, "task ended abnormally");
        }
    }
}
