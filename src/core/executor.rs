//! Per-target executors.
//!
//! An executor receives a call that missed the cache while the dispatch lock
//! is still held. It creates the result, publishes it to the cache, releases
//! the lock, and only then arranges for the body to run.

use std::fmt;
use std::sync::Arc;

use parking_lot::{Mutex, MutexGuard};
use tracing::warn;

use crate::core::cache::{CacheEntry, CacheLayer};
use crate::core::error::SchedulerError;
use crate::core::identity::{BoundCall, CallIdentity};
use crate::core::result::{CallResult, Deferred, Immediate, Version};
use crate::core::target::{CallContext, Target};
use crate::core::worker_pool::Pool;

/// Work handed to a drain owner. It must be run with the owner's bound context.
pub type Runnable = Box<dyn FnOnce(&CallContext) + Send>;

/// Callback that accepts runnables for a target, typically queueing them for
/// the target's owning thread.
///
/// An owner that can no longer run work returns an error (usually
/// [`SchedulerError::TargetClosed`]) and drops the runnable.
pub type Drain = Arc<dyn Fn(Runnable) -> Result<(), SchedulerError> + Send + Sync>;

/// A call that missed the cache and must be executed.
pub(crate) struct PendingCall<R> {
    pub identity: CallIdentity,
    pub version: Version,
    pub target: Target,
    pub body: BoundCall<R>,
}

/// Owns a scheduled deferred call. Dropping it without running fails the call,
/// so a rejected or discarded job never leaves joiners blocked.
struct ScheduledRun<R: Clone> {
    deferred: Arc<Deferred<R>>,
}

impl<R: Clone> ScheduledRun<R> {
    fn run(self, ctx: &CallContext) {
        self.deferred.run_if_unclaimed(ctx);
    }
}

impl<R: Clone> Drop for ScheduledRun<R> {
    fn drop(&mut self) {
        self.deferred.abandon();
    }
}

/// How calls for one target are executed.
#[derive(Clone)]
pub(crate) enum TargetExecutor {
    /// Run synchronously on the dispatching thread.
    Immediate,
    /// Run on a background worker pool.
    Pool(Arc<dyn Pool>),
    /// Hand to an external drain; the owner runs it when next idle.
    Inline(Drain),
}

impl fmt::Debug for TargetExecutor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Immediate => f.write_str("Immediate"),
            Self::Pool(pool) => f.debug_tuple("Pool").field(&pool.name()).finish(),
            Self::Inline(_) => f.write_str("Inline"),
        }
    }
}

impl TargetExecutor {
    /// Publish a result for `call` in `cache`, release `lock`, then run or
    /// schedule the body.
    ///
    /// # Errors
    ///
    /// Fails when the pool or drain refuses the work. The published entry is
    /// abandoned and withdrawn from `cache` before returning, so the refusal is
    /// never memoized.
    pub fn execute<R>(
        &self,
        lock: MutexGuard<'_, ()>,
        cache: &dyn CacheLayer,
        call: PendingCall<R>,
        ctx: &CallContext,
    ) -> Result<CallResult<R>, SchedulerError>
    where
        R: Clone + Send + 'static,
    {
        let mutex = MutexGuard::mutex(&lock);
        match self {
            Self::Immediate => {
                let immediate = Arc::new(Immediate::new(call.identity, call.version));
                let result = CallResult::Immediate(Arc::clone(&immediate));
                cache.store(CacheEntry::new(&result));
                drop(lock);
                immediate.run(call.body, ctx);
                Ok(result)
            }
            Self::Pool(pool) => {
                let (result, scheduled) = publish_deferred(lock, cache, call);
                let deferred = Arc::clone(&scheduled.deferred);
                let job = Box::new(move || scheduled.run(&CallContext::unbound()));
                pool.execute(job).map_err(|e| {
                    warn!(pool = pool.name(), call = %result.identity(), error = %e, "pool rejected call");
                    withdraw(mutex, cache, &deferred);
                    SchedulerError::Pool(e)
                })?;
                Ok(result)
            }
            Self::Inline(drain) => {
                let (result, scheduled) = publish_deferred(lock, cache, call);
                let deferred = Arc::clone(&scheduled.deferred);
                drain(Box::new(move |ctx: &CallContext| scheduled.run(ctx))).map_err(|e| {
                    warn!(target = %deferred.target(), call = %result.identity(), error = %e, "drain rejected call");
                    withdraw(mutex, cache, &deferred);
                    e
                })?;
                Ok(result)
            }
        }
    }
}

/// Fail a refused call and take its entry back out of the cache.
fn withdraw<R: Clone>(mutex: &Mutex<()>, cache: &dyn CacheLayer, deferred: &Deferred<R>) {
    deferred.abandon();
    let _lock = mutex.lock();
    cache.discard_abandoned(&deferred.identity());
}

fn publish_deferred<R>(
    lock: MutexGuard<'_, ()>,
    cache: &dyn CacheLayer,
    call: PendingCall<R>,
) -> (CallResult<R>, ScheduledRun<R>)
where
    R: Clone + Send + 'static,
{
    let deferred = Arc::new(Deferred::new(call.identity, call.version, call.target, call.body));
    let result = CallResult::Deferred(Arc::clone(&deferred));
    cache.store(CacheEntry::new(&result));
    drop(lock);
    (result, ScheduledRun { deferred })
}
