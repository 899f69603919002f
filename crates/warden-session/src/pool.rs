//! Worker pool for blocking persistence work.
//!
//! Gateway calls block. Running them on the coordinator task would stall
//! every other session, so the coordinator hands them to a [`WorkerPool`]
//! as boxed jobs. A job gets its inputs by value and reports back over a
//! channel; it never touches live session state.

use std::sync::Arc;

use tokio::runtime::Handle;
use tokio::sync::Semaphore;

/// A unit of blocking work.
pub type Job = Box<dyn FnOnce() + Send + 'static>;

/// Executes jobs off the coordinating context.
pub trait WorkerPool: Send + Sync + 'static {
    /// Schedules `job` and returns immediately.
    fn submit(&self, job: Job);
}

/// A [`WorkerPool`] on Tokio's blocking thread pool.
///
/// With `slots > 0`, at most that many jobs run at once; the rest wait
/// for a permit. A job that never finishes holds its permit forever but
/// doesn't block the coordinator.
#[derive(Clone)]
pub struct TokioWorkerPool {
    runtime: Handle,
    slots: Option<Arc<Semaphore>>,
}

impl TokioWorkerPool {
    /// A pool on `runtime`. `slots == 0` means unbounded.
    pub fn new(runtime: Handle, slots: usize) -> Self {
        let slots = (slots > 0).then(|| Arc::new(Semaphore::new(slots)));
        Self { runtime, slots }
    }

    /// A pool on the runtime the caller is running in.
    ///
    /// # Panics
    /// If called outside a Tokio runtime.
    pub fn current(slots: usize) -> Self {
        Self::new(Handle::current(), slots)
    }

    /// Free permits right now, or `None` when unbounded.
    pub fn available_slots(&self) -> Option<usize> {
        self.slots.as_ref().map(|s| s.available_permits())
    }
}

impl WorkerPool for TokioWorkerPool {
    fn submit(&self, job: Job) {
        match &self.slots {
            None => {
                self.runtime.spawn_blocking(job);
            }
            Some(slots) => {
                let slots = Arc::clone(slots);
                let runtime = self.runtime.clone();
                self.runtime.spawn(async move {
                    let Ok(_permit) = slots.acquire_owned().await else {
                        return;
                    };
                    if let Err(e) = runtime.spawn_blocking(job).await {
                        tracing::warn!(error = %e, "worker job did not complete");
                    }
                });
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tokio::sync::oneshot;

    use super::*;

    #[tokio::test]
    async fn test_submit_runs_job_off_task() {
        let pool = TokioWorkerPool::current(0);
        let (tx, rx) = oneshot::channel();

        pool.submit(Box::new(move || {
            let _ = tx.send(7);
        }));

        assert_eq!(rx.await.unwrap(), 7);
        assert_eq!(pool.available_slots(), None);
    }

    #[tokio::test]
    async fn test_bounded_pool_releases_permit_after_job() {
        let pool = TokioWorkerPool::current(1);
        let (tx, rx) = oneshot::channel();

        pool.submit(Box::new(move || {
            let _ = tx.send(());
        }));
        rx.await.unwrap();

        // The permit is dropped right after the job's JoinHandle resolves.
        for _ in 0..50 {
            if pool.available_slots() == Some(1) {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("permit was never released");
    }
}
