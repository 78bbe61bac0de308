//! Configuration models for schedulers and worker pools.

pub mod pool;
pub mod scheduler;

pub use pool::ThreadPoolConfig;
pub use scheduler::{
    PoolKind, SchedulerSettings, Threading, ENV_POOL, ENV_QUEUE_DEPTH, ENV_THREADING, ENV_THREADS,
};
