//! One lightweight task per call, on tokio's blocking pool.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::runtime::{Builder, Handle, Runtime};
use tracing::{debug, info};

use super::{Job, Pool, PoolCounters, PoolError, PoolStats};

/// Pool that gives every job its own blocking tokio task.
///
/// Jobs may block freely (including on joins of other calls) without starving
/// each other, since tokio grows its blocking pool on demand.
pub struct TaskPerCallPool {
    handle: Handle,
    /// Present when the pool built its own runtime.
    owned: Mutex<Option<Runtime>>,
    counters: Arc<PoolCounters>,
    shutdown: AtomicBool,
}

impl TaskPerCallPool {
    /// Build a pool with its own small runtime.
    ///
    /// # Errors
    ///
    /// `PoolError::Internal` if the runtime cannot be built.
    pub fn new() -> Result<Self, PoolError> {
        let runtime = Builder::new_multi_thread()
            .worker_threads(1)
            .thread_name("fs-task")
            .enable_all()
            .build()
            .map_err(|e| PoolError::Internal(format!("failed to build runtime: {e}")))?;
        info!("TaskPerCallPool initialized with its own runtime");
        Ok(Self {
            handle: runtime.handle().clone(),
            owned: Mutex::new(Some(runtime)),
            counters: Arc::new(PoolCounters::default()),
            shutdown: AtomicBool::new(false),
        })
    }

    /// Use an existing runtime. The pool never shuts that runtime down.
    #[must_use]
    pub fn with_handle(handle: Handle) -> Self {
        Self {
            handle,
            owned: Mutex::new(None),
            counters: Arc::new(PoolCounters::default()),
            shutdown: AtomicBool::new(false),
        }
    }
}

impl Pool for TaskPerCallPool {
    fn name(&self) -> &str {
        "task_per_call"
    }

    fn execute(&self, job: Job) -> Result<(), PoolError> {
        if self.shutdown.load(Ordering::Acquire) {
            return Err(PoolError::PoolShutdown);
        }
        self.counters.accepted();
        let counters = Arc::clone(&self.counters);
        drop(self.handle.spawn_blocking(move || counters.run("task_per_call", job)));
        Ok(())
    }

    fn shutdown(&self) {
        if self.shutdown.swap(true, Ordering::AcqRel) {
            return;
        }
        if let Some(runtime) = self.owned.lock().take() {
            runtime.shutdown_background();
        }
        debug!("Task-per-call pool shut down");
    }

    fn stats(&self) -> PoolStats {
        self.counters.snapshot(0)
    }
}

impl Drop for TaskPerCallPool {
    fn drop(&mut self) {
        // Dropping a runtime from async code panics; background shutdown does not.
        if let Some(runtime) = self.owned.get_mut().take() {
            runtime.shutdown_background();
        }
    }
}
