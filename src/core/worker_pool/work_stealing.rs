//! Work-stealing pool backed by rayon.

use std::sync::Arc;

use parking_lot::RwLock;
use tracing::{debug, info};

use super::{Job, Pool, PoolCounters, PoolError, PoolStats};

/// Pool whose idle workers steal queued jobs from busy ones.
pub struct WorkStealingPool {
    /// `None` once shut down; dropping the rayon pool lets its threads exit.
    inner: RwLock<Option<rayon::ThreadPool>>,
    counters: Arc<PoolCounters>,
    worker_count: usize,
}

impl WorkStealingPool {
    /// Build a pool with `threads` workers (0 means one per CPU).
    ///
    /// # Errors
    ///
    /// `PoolError::Internal` if rayon cannot start its threads.
    pub fn new(threads: usize) -> Result<Self, PoolError> {
        let worker_count = if threads == 0 { num_cpus::get() } else { threads };
        let inner = rayon::ThreadPoolBuilder::new()
            .num_threads(worker_count)
            .thread_name(|idx| format!("fs-steal-{idx}"))
            .build()
            .map_err(|e| PoolError::Internal(e.to_string()))?;

        info!(worker_count = worker_count, "WorkStealingPool initialized");

        Ok(Self {
            inner: RwLock::new(Some(inner)),
            counters: Arc::new(PoolCounters::default()),
            worker_count,
        })
    }
}

impl Pool for WorkStealingPool {
    fn name(&self) -> &str {
        "work_stealing"
    }

    fn execute(&self, job: Job) -> Result<(), PoolError> {
        let inner = self.inner.read();
        let Some(pool) = inner.as_ref() else {
            return Err(PoolError::PoolShutdown);
        };
        self.counters.accepted();
        let counters = Arc::clone(&self.counters);
        pool.spawn(move || counters.run("work_stealing", job));
        Ok(())
    }

    fn shutdown(&self) {
        if self.inner.write().take().is_some() {
            debug!("Work-stealing pool released; queued jobs still finish");
        }
    }

    fn stats(&self) -> PoolStats {
        self.counters.snapshot(self.worker_count)
    }
}
