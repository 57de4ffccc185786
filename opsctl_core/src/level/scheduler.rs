//! One-shot delayed callbacks with cancellation handles.

use std::time::Duration;
use tokio::runtime::Handle;
use tokio_util::sync::CancellationToken;

/// Callback run when a reversion timer fires.
pub type ReversionTask = Box<dyn FnOnce() + Send + 'static>;

/// Cancels a scheduled reversion.
///
/// Cancelling is idempotent and may race the timer firing: once `cancel`
/// returns, a task that has not started yet never will. A task that already
/// started is expected to re-check its own preconditions.
#[derive(Debug, Clone)]
pub struct ReversionHandle {
    token: CancellationToken,
}

impl ReversionHandle {
    pub fn new(token: CancellationToken) -> Self {
        Self { token }
    }

    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }
}

/// Schedules a one-shot callback after a delay.
pub trait ReversionScheduler: Send + Sync {
    fn schedule(&self, delay: Duration, task: ReversionTask) -> ReversionHandle;
}

/// Runs each reversion as a sleeping task on a tokio runtime.
#[derive(Debug, Clone)]
pub struct TokioScheduler {
    runtime: Handle,
}

impl TokioScheduler {
    pub fn new(runtime: Handle) -> Self {
        Self { runtime }
    }

    /// Bind to the runtime of the calling task.
    ///
    /// # Panics
    ///
    /// Panics when called outside a tokio runtime.
    pub fn current() -> Self {
        Self::new(Handle::current())
    }
}

impl ReversionScheduler for TokioScheduler {
    fn schedule(&self, delay: Duration, task: ReversionTask) -> ReversionHandle {
        let token = CancellationToken::new();
        let child = token.clone();
        self.runtime.spawn(async move {
            tokio::select! {
                biased;
                _ = child.cancelled() => {}
                _ = tokio::time::sleep(delay) => {
                    if !child.is_cancelled() {
                        task();
                    }
                }
            }
        });
        ReversionHandle::new(token)
    }
}
