use std::future::Future;

use parking_lot::Mutex;
use tokio::task::JoinSet;

/// Owner of in-flight mutation tasks. Each mutation runs as an
/// independent unit of work; dropping the scope aborts whatever has not
/// finished yet. That is the only cancellation trigger — there are no
/// retries and no timeouts.
pub struct TaskScope {
    tasks: Mutex<JoinSet<()>>,
}

impl TaskScope {
    pub fn new() -> Self {
        Self {
            tasks: Mutex::new(JoinSet::new()),
        }
    }

    /// Dispatch a unit of work. Non-blocking for the caller.
    pub fn spawn<F>(&self, fut: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let mut tasks = self.tasks.lock();
        // Reap finished tasks so the set does not grow unbounded.
        while tasks.try_join_next().is_some() {}
        tasks.spawn(fut);
    }

    /// Wait for every mutation dispatched so far to settle. Test and
    /// shutdown aid; ordinary callers never need it.
    pub async fn drain(&self) {
        let mut tasks = std::mem::take(&mut *self.tasks.lock());
        while let Some(result) = tasks.join_next().await {
            if let Err(e) = result {
                if !e.is_cancelled() {
                    tracing::warn!(error = %e, "mutation task panicked");
                }
            }
        }
    }
}

impl Default for TaskScope {
    fn default() -> Self {
        Self::new()
    }
}
