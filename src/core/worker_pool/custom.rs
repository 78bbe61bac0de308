//! Adapter turning any submit function into a [`Pool`].

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use super::{Job, Pool, PoolCounters, PoolError, PoolStats};

type Submit = dyn Fn(Job) + Send + Sync;

/// Custom pool built from a caller-supplied submit function.
///
/// ```rust,ignore
/// let pool = FnPool::new("engine", |job| engine_jobs.push(job));
/// ```
pub struct FnPool {
    name: String,
    submit: Box<Submit>,
    counters: Arc<PoolCounters>,
    shutdown: AtomicBool,
}

impl FnPool {
    /// Wrap `submit`; every job handed to the pool is passed to it.
    pub fn new<F>(name: impl Into<String>, submit: F) -> Self
    where
        F: Fn(Job) + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            submit: Box::new(submit),
            counters: Arc::new(PoolCounters::default()),
            shutdown: AtomicBool::new(false),
        }
    }
}

impl Pool for FnPool {
    fn name(&self) -> &str {
        &self.name
    }

    fn execute(&self, job: Job) -> Result<(), PoolError> {
        if self.shutdown.load(Ordering::Acquire) {
            return Err(PoolError::PoolShutdown);
        }
        self.counters.accepted();
        let counters = Arc::clone(&self.counters);
        let name = self.name.clone();
        (self.submit)(Box::new(move || counters.run(&name, job)));
        Ok(())
    }

    fn shutdown(&self) {
        self.shutdown.store(true, Ordering::Release);
    }

    fn stats(&self) -> PoolStats {
        self.counters.snapshot(0)
    }
}
