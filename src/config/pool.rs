//! Worker pool configuration.

use serde::{Deserialize, Serialize};

const DEFAULT_STACK_SIZE: usize = 2 * 1024 * 1024;

/// Configuration for the fixed-size [`ThreadPool`](crate::core::ThreadPool)
/// and the thread naming of the other OS-thread pools.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ThreadPoolConfig {
    /// Number of worker threads.
    pub worker_count: usize,
    /// Maximum queued jobs before rejection; `None` means unbounded.
    pub max_queue_depth: Option<usize>,
    /// Stack size for each worker thread, in bytes.
    pub thread_stack_size: usize,
    /// Worker thread names are `{prefix}-{index}`.
    pub thread_name_prefix: String,
}

impl Default for ThreadPoolConfig {
    fn default() -> Self {
        Self {
            worker_count: num_cpus::get(),
            max_queue_depth: None,
            thread_stack_size: DEFAULT_STACK_SIZE,
            thread_name_prefix: "fs-worker".into(),
        }
    }
}

impl ThreadPoolConfig {
    /// Defaults: one worker per CPU, unbounded queue.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the number of worker threads.
    #[must_use]
    pub const fn with_worker_count(mut self, worker_count: usize) -> Self {
        self.worker_count = worker_count;
        self
    }

    /// Bound the job queue.
    #[must_use]
    pub const fn with_max_queue_depth(mut self, depth: usize) -> Self {
        self.max_queue_depth = Some(depth);
        self
    }

    /// Set the worker thread stack size.
    #[must_use]
    pub const fn with_thread_stack_size(mut self, bytes: usize) -> Self {
        self.thread_stack_size = bytes;
        self
    }

    /// Set the worker thread name prefix.
    #[must_use]
    pub fn with_thread_name_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.thread_name_prefix = prefix.into();
        self
    }

    /// Validate configuration values.
    ///
    /// # Errors
    ///
    /// Returns a description of the first invalid field.
    pub fn validate(&self) -> Result<(), String> {
        if self.worker_count == 0 {
            return Err("worker_count must be greater than 0".into());
        }
        if self.max_queue_depth == Some(0) {
            return Err("max_queue_depth must be greater than 0".into());
        }
        if self.thread_stack_size < 64 * 1024 {
            return Err("thread_stack_size must be at least 64 KiB".into());
        }
        if self.thread_name_prefix.is_empty() {
            return Err("thread_name_prefix must not be empty".into());
        }
        Ok(())
    }
}
