//! Generic "run work off the caller's thread, call back with the result"
//! primitive.
//!
//! The scheduler never blocks the caller: the network fetch and the disk
//! write run inside a task spawned here. A panic inside the work is caught
//! and reported as `None`, which the scheduler reads as failure — the
//! queue keeps draining no matter what a fetch does.
//!
//! There is no designated completion thread in a tokio host, so the
//! completion callback runs on the worker task itself. That is the same
//! behavior inside and outside any UI-threaded embedding.

use std::panic::AssertUnwindSafe;

use futures_util::FutureExt;
use tokio::runtime::Handle;
use tracing::warn;

/// Spawns work on a tokio runtime and delivers the result to a callback.
#[derive(Debug, Clone)]
pub struct TaskRunner {
    handle: Handle,
}

impl TaskRunner {
    /// Creates a runner that spawns on the given runtime handle.
    #[must_use]
    pub fn new(handle: Handle) -> Self {
        Self { handle }
    }

    /// Creates a runner bound to the ambient runtime.
    ///
    /// # Panics
    ///
    /// Panics when called outside a tokio runtime context.
    #[must_use]
    pub fn current() -> Self {
        Self::new(Handle::current())
    }

    /// Runs `work` off the caller's thread and calls `on_done` with its
    /// output, or with `None` if the work panicked.
    ///
    /// `on_done` is invoked exactly once, on the worker task.
    pub fn run<T, F, C>(&self, work: F, on_done: C)
    where
        T: Send + 'static,
        F: Future<Output = T> + Send + 'static,
        C: FnOnce(Option<T>) + Send + 'static,
    {
        self.handle.spawn(async move {
            match AssertUnwindSafe(work).catch_unwind().await {
                Ok(output) => on_done(Some(output)),
                Err(_) => {
                    warn!("task panicked, reporting failure to callback");
                    on_done(None);
                }
            }
        });
    }
}
