//! Fixed-size pool of dedicated OS threads.
//!
//! Workers block on a crossbeam channel; dropping the sender on shutdown
//! unblocks them, so there is no polling anywhere.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{bounded, unbounded, Receiver, Sender, TrySendError};
use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::config::ThreadPoolConfig;

use super::{Job, Pool, PoolCounters, PoolError, PoolStats};

const WORKER_JOIN_TIMEOUT: Duration = Duration::from_secs(2);

/// Pool with a fixed number of named worker threads.
pub struct ThreadPool {
    config: ThreadPoolConfig,
    /// `None` once shut down.
    job_tx: Mutex<Option<Sender<Job>>>,
    counters: Arc<PoolCounters>,
    shutdown: AtomicBool,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl ThreadPool {
    /// Spawn `config.worker_count` workers.
    ///
    /// # Errors
    ///
    /// - `PoolError::InvalidConfig` if the configuration is invalid
    /// - `PoolError::Internal` if a worker thread cannot be spawned
    pub fn new(config: ThreadPoolConfig) -> Result<Self, PoolError> {
        config.validate().map_err(PoolError::InvalidConfig)?;

        let (job_tx, job_rx) = match config.max_queue_depth {
            Some(depth) => bounded::<Job>(depth),
            None => unbounded::<Job>(),
        };
        let counters = Arc::new(PoolCounters::default());

        let mut workers = Vec::with_capacity(config.worker_count);
        for worker_id in 0..config.worker_count {
            let worker = spawn_worker(worker_id, &config, job_rx.clone(), Arc::clone(&counters))
                .map_err(|e| PoolError::Internal(format!("failed to spawn worker {worker_id}: {e}")))?;
            workers.push(worker);
        }

        info!(
            worker_count = config.worker_count,
            max_queue_depth = ?config.max_queue_depth,
            "ThreadPool initialized"
        );

        Ok(Self {
            config,
            job_tx: Mutex::new(Some(job_tx)),
            counters,
            shutdown: AtomicBool::new(false),
            workers: Mutex::new(workers),
        })
    }

    /// Pool with `worker_count` workers and default settings otherwise.
    ///
    /// # Errors
    ///
    /// See [`ThreadPool::new`].
    pub fn with_workers(worker_count: usize) -> Result<Self, PoolError> {
        Self::new(ThreadPoolConfig::new().with_worker_count(worker_count))
    }
}

impl Pool for ThreadPool {
    fn name(&self) -> &str {
        "thread_pool"
    }

    fn execute(&self, job: Job) -> Result<(), PoolError> {
        if self.shutdown.load(Ordering::Acquire) {
            return Err(PoolError::PoolShutdown);
        }
        let job_tx = self.job_tx.lock();
        let Some(job_tx) = job_tx.as_ref() else {
            return Err(PoolError::PoolShutdown);
        };

        self.counters.accepted();
        match job_tx.try_send(job) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(_)) => {
                self.counters.rejected();
                warn!("ThreadPool queue is full");
                Err(PoolError::QueueFull)
            }
            Err(TrySendError::Disconnected(_)) => {
                self.counters.rejected();
                Err(PoolError::PoolShutdown)
            }
        }
    }

    /// Drops the sender to unblock idle workers, then joins each worker with
    /// a timeout. Workers that don't exit in time are detached.
    fn shutdown(&self) {
        if self.shutdown.swap(true, Ordering::AcqRel) {
            return;
        }
        info!("Shutting down thread pool");

        self.job_tx.lock().take();

        let workers: Vec<_> = self.workers.lock().drain(..).collect();
        let worker_count = workers.len();
        let current = thread::current().id();

        for (idx, worker) in workers.into_iter().enumerate() {
            // A worker shutting down its own pool cannot join itself.
            if worker.thread().id() == current {
                continue;
            }
            let (tx, rx) = crossbeam_channel::bounded(1);
            let joiner = thread::spawn(move || {
                let _ = tx.send(worker.join().is_ok());
            });
            match rx.recv_timeout(WORKER_JOIN_TIMEOUT) {
                Ok(true) => debug!(worker_id = idx, "Worker joined"),
                Ok(false) => warn!(worker_id = idx, "Worker panicked"),
                Err(_) => warn!(worker_id = idx, "Worker did not exit within timeout - detaching"),
            }
            drop(joiner);
        }

        info!(worker_count = worker_count, "Thread pool shut down");
    }

    fn stats(&self) -> PoolStats {
        self.counters.snapshot(self.config.worker_count)
    }
}

impl Drop for ThreadPool {
    fn drop(&mut self) {
        // Signal only; joining here could hang on a worker that is still busy.
        if !self.shutdown.swap(true, Ordering::AcqRel) {
            self.job_tx.lock().take();
            debug!("ThreadPool dropped without explicit shutdown - workers will be detached");
        }
    }
}

fn spawn_worker(
    worker_id: usize,
    config: &ThreadPoolConfig,
    job_rx: Receiver<Job>,
    counters: Arc<PoolCounters>,
) -> std::io::Result<JoinHandle<()>> {
    thread::Builder::new()
        .name(format!("{}-{worker_id}", config.thread_name_prefix))
        .stack_size(config.thread_stack_size)
        .spawn(move || {
            debug!(worker_id = worker_id, "Worker thread started");
            // Exits once the sender is dropped and the queue is drained.
            while let Ok(job) = job_rx.recv() {
                counters.run("thread_pool", job);
            }
            debug!(worker_id = worker_id, "Worker thread exiting");
        })
}
