//! Background worker pools that run scheduled calls.
//!
//! A multi-threaded scheduler routes every call for `Target::ANY` to one
//! [`Pool`]. The strategies are interchangeable:
//!
//! - [`ThreadPool`]: fixed set of named OS threads fed by a crossbeam channel
//! - [`WorkStealingPool`]: a rayon pool
//! - [`TaskPerCallPool`]: one blocking tokio task per call (feature `tokio-runtime`)
//! - [`FnPool`]: any caller-supplied submit function
//!
//! # Example
//!
//! ```rust,ignore
//! use prometheus_frame_scheduler::config::ThreadPoolConfig;
//! use prometheus_frame_scheduler::core::{Pool, ThreadPool};
//!
//! let pool = ThreadPool::new(ThreadPoolConfig::new().with_worker_count(4))?;
//! pool.execute(Box::new(|| println!("hello from a worker")))?;
//! pool.shutdown();
//! ```

mod custom;
#[cfg(feature = "tokio-runtime")]
mod task_per_call;
mod thread_pool;
mod work_stealing;

use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};

use tracing::error;

pub use custom::FnPool;
#[cfg(feature = "tokio-runtime")]
pub use task_per_call::TaskPerCallPool;
pub use thread_pool::ThreadPool;
pub use work_stealing::WorkStealingPool;

/// Unit of work handed to a pool.
pub type Job = Box<dyn FnOnce() + Send + 'static>;

/// Errors that can occur when using a pool.
#[derive(Debug)]
pub enum PoolError {
    /// The job queue is full; no more jobs can be accepted.
    QueueFull,

    /// The pool has been shut down.
    PoolShutdown,

    /// Configuration validation failed.
    InvalidConfig(String),

    /// Internal error (thread spawn failure, runtime build failure, etc.).
    Internal(String),
}

impl fmt::Display for PoolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::QueueFull => write!(f, "job queue is full"),
            Self::PoolShutdown => write!(f, "pool has been shut down"),
            Self::InvalidConfig(msg) => write!(f, "invalid configuration: {msg}"),
            Self::Internal(msg) => write!(f, "internal error: {msg}"),
        }
    }
}

impl std::error::Error for PoolError {}

/// Statistics about pool utilization.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PoolStats {
    /// Number of worker threads (0 when the pool spawns per job).
    pub worker_count: usize,

    /// Currently executing jobs.
    pub active_jobs: u64,

    /// Jobs waiting in the queue.
    pub queued_jobs: u64,

    /// Total jobs that ran to completion.
    pub completed_jobs: u64,

    /// Total jobs that panicked outside a call.
    pub failed_jobs: u64,

    /// Total jobs accepted.
    pub submitted_jobs: u64,
}

/// Internal counters for pool statistics (thread-safe).
#[derive(Debug, Default)]
pub(crate) struct PoolCounters {
    pub active_jobs: AtomicU64,
    pub queued_jobs: AtomicU64,
    pub completed_jobs: AtomicU64,
    pub failed_jobs: AtomicU64,
    pub submitted_jobs: AtomicU64,
}

impl PoolCounters {
    /// Get a snapshot of current statistics.
    pub fn snapshot(&self, worker_count: usize) -> PoolStats {
        PoolStats {
            worker_count,
            active_jobs: self.active_jobs.load(Ordering::Relaxed),
            queued_jobs: self.queued_jobs.load(Ordering::Relaxed),
            completed_jobs: self.completed_jobs.load(Ordering::Relaxed),
            failed_jobs: self.failed_jobs.load(Ordering::Relaxed),
            submitted_jobs: self.submitted_jobs.load(Ordering::Relaxed),
        }
    }

    pub fn accepted(&self) {
        self.submitted_jobs.fetch_add(1, Ordering::Relaxed);
        self.queued_jobs.fetch_add(1, Ordering::Relaxed);
    }

    /// Undo `accepted` for a job the backend refused after all.
    pub fn rejected(&self) {
        self.submitted_jobs.fetch_sub(1, Ordering::Relaxed);
        self.queued_jobs.fetch_sub(1, Ordering::Relaxed);
    }

    /// Run a dequeued job, keeping the worker alive if it panics.
    pub fn run(&self, pool: &str, job: Job) {
        self.queued_jobs.fetch_sub(1, Ordering::Relaxed);
        self.active_jobs.fetch_add(1, Ordering::Relaxed);
        let outcome = panic::catch_unwind(AssertUnwindSafe(job));
        self.active_jobs.fetch_sub(1, Ordering::Relaxed);
        if outcome.is_ok() {
            self.completed_jobs.fetch_add(1, Ordering::Relaxed);
        } else {
            self.failed_jobs.fetch_add(1, Ordering::Relaxed);
            error!(pool = pool, "job panicked outside a call");
        }
    }
}

/// An execution strategy for work that may run on any thread.
pub trait Pool: Send + Sync {
    /// Name used in logs.
    fn name(&self) -> &str;

    /// Queue `job` for execution.
    ///
    /// # Errors
    ///
    /// - `PoolError::QueueFull` if a bounded queue is full
    /// - `PoolError::PoolShutdown` if the pool has been shut down
    fn execute(&self, job: Job) -> Result<(), PoolError>;

    /// Stop accepting work and release the pool's threads.
    fn shutdown(&self);

    /// Current statistics.
    fn stats(&self) -> PoolStats;
}
