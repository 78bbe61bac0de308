//! Core scheduling abstractions: call identity, results, caches, executors.

pub mod cache;
pub mod dispatch;
pub mod error;
pub mod executor;
pub mod identity;
pub mod result;
pub mod scheduler;
pub mod target;
pub mod task;
pub mod wait;
pub mod worker_pool;

pub use cache::{Cache, CacheEntry, CacheLayer, CacheNode, CachePolicy, RootStore};
pub use dispatch::{CallOptions, Dispatcher, ExecutionMode};
pub use error::{AppResult, CallError, SchedulerError};
pub use executor::{Drain, Runnable};
pub use identity::{value_hash, CallArg, CallArgs, CallIdentity, Function, FunctionId};
pub use result::{CallResult, CallState, Deferred, Immediate, Version};
pub use scheduler::Scheduler;
pub use target::{CallContext, Target};
pub use task::{DependencyId, Joinable, Task};
pub use wait::{collect_all, wait, wait_all};
#[cfg(feature = "tokio-runtime")]
pub use worker_pool::TaskPerCallPool;
pub use worker_pool::{FnPool, Job, Pool, PoolError, PoolStats, ThreadPool, WorkStealingPool};
