//! The dispatch facade: the one entry point every caller goes through.
//!
//! ```rust,ignore
//! static DISPATCH: Dispatcher = Dispatcher::new();
//!
//! DISPATCH.bind(Arc::new(Scheduler::thread_pool(4)?))?;
//!
//! let area = Function::new("area", |(w, h): (u32, u32)| w * h);
//! let opts = CallOptions::asynchronous().with_cache(Cache::PER_TICK).with_version(frame);
//! let result = DISPATCH.dispatch(&ctx, &opts, &area, (3, 4))?;
//! assert_eq!(result.join(&ctx)?, 12);
//! ```

use std::sync::{Arc, OnceLock};

use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::core::cache::{Cache, CacheLayer};
use crate::core::error::SchedulerError;
use crate::core::executor::{PendingCall, TargetExecutor};
use crate::core::identity::{CallArgs, Function};
use crate::core::result::{CallResult, Version};
use crate::core::scheduler::Scheduler;
use crate::core::target::{CallContext, Target};

/// Whether a call may run inline on the dispatching thread.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionMode {
    /// Run inline when the target allows it, otherwise schedule.
    #[default]
    Direct,
    /// Always hand the call to the target's executor.
    Async,
}

/// Per-dispatch routing and caching options.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallOptions {
    /// Execution mode.
    pub mode: ExecutionMode,
    /// Target the call is affine to.
    pub target: Target,
    /// Cache consulted before executing.
    pub cache: Cache,
    /// Version handed to the cache policy.
    pub version: Version,
}

impl Default for CallOptions {
    fn default() -> Self {
        Self::new(ExecutionMode::Direct)
    }
}

impl CallOptions {
    /// Options for `Target::ANY`, no memoization, version 0.
    #[must_use]
    pub const fn new(mode: ExecutionMode) -> Self {
        Self {
            mode,
            target: Target::ANY,
            cache: Cache::NO_OP,
            version: 0,
        }
    }

    /// Run inline where possible.
    #[must_use]
    pub const fn direct() -> Self {
        Self::new(ExecutionMode::Direct)
    }

    /// Always schedule.
    #[must_use]
    pub const fn asynchronous() -> Self {
        Self::new(ExecutionMode::Async)
    }

    /// Set the target.
    #[must_use]
    pub fn with_target(mut self, target: Target) -> Self {
        self.target = target;
        self
    }

    /// Set the cache.
    #[must_use]
    pub const fn with_cache(mut self, cache: Cache) -> Self {
        self.cache = cache;
        self
    }

    /// Set the version.
    #[must_use]
    pub const fn with_version(mut self, version: Version) -> Self {
        self.version = version;
        self
    }
}

/// Dispatch facade bound to exactly one scheduler for its whole life.
///
/// Usable as a `static`; binding twice is an error.
#[derive(Debug, Default)]
pub struct Dispatcher {
    scheduler: OnceLock<Arc<Scheduler>>,
}

impl Dispatcher {
    /// An unbound dispatcher.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            scheduler: OnceLock::new(),
        }
    }

    /// A dispatcher bound to `scheduler`.
    #[must_use]
    pub fn with_scheduler(scheduler: Arc<Scheduler>) -> Self {
        let dispatcher = Self::new();
        let _ = dispatcher.scheduler.set(scheduler);
        dispatcher
    }

    /// Bind the scheduler.
    ///
    /// # Errors
    ///
    /// `AlreadyInitialized` if a scheduler is bound already.
    pub fn bind(&self, scheduler: Arc<Scheduler>) -> Result<(), SchedulerError> {
        self.scheduler
            .set(scheduler)
            .map_err(|_| SchedulerError::AlreadyInitialized)
    }

    /// The bound scheduler.
    ///
    /// # Errors
    ///
    /// `NotInitialized` if nothing is bound yet.
    pub fn scheduler(&self) -> Result<&Arc<Scheduler>, SchedulerError> {
        self.scheduler.get().ok_or(SchedulerError::NotInitialized)
    }

    /// Dispatch `function(args)`.
    ///
    /// The cache check and the publication of a pending result happen under
    /// the scheduler's dispatch lock, so at most one execution per identity
    /// and compatible version is ever in flight. The body itself always runs
    /// outside the lock.
    ///
    /// # Errors
    ///
    /// - `NotInitialized` / `ShutDown` for an unusable scheduler
    /// - `UnknownCache` / `UnknownTarget` for foreign handles
    /// - `Pool` / `TargetClosed` if the target refused the work; nothing is memoized
    /// - `Call` if a body run inline by this dispatch failed
    pub fn dispatch<A, R>(
        &self,
        ctx: &CallContext,
        opts: &CallOptions,
        function: &Function<A, R>,
        args: A,
    ) -> Result<CallResult<R>, SchedulerError>
    where
        A: CallArgs,
        R: Clone + Send + 'static,
    {
        let scheduler = self.scheduler()?;
        scheduler.ensure_running()?;
        let cache = scheduler.cache_node(opts.cache)?;
        let identity = function.identity(&args);

        let lock = scheduler.lock();
        let entry = cache.lookup(&identity, opts.version).filter(|entry| {
            if entry.is_abandoned() {
                cache.discard_abandoned(&identity);
                return false;
            }
            true
        });
        if let Some(hit) = entry.and_then(|entry| entry.downcast::<R>()) {
            drop(lock);
            trace!(
                function = function.name(),
                arity = A::ARITY,
                target = %opts.target,
                call = %identity,
                cached = true,
                "dispatch"
            );
            return Ok(hit);
        }

        let direct = opts.mode == ExecutionMode::Direct
            && (opts.target.is_any() || ctx.is_bound_to(&opts.target));
        let executor = if direct {
            TargetExecutor::Immediate
        } else {
            match scheduler.executor(&opts.target) {
                Ok(executor) => executor,
                Err(e) => {
                    drop(lock);
                    return Err(e);
                }
            }
        };
        trace!(
            function = function.name(),
            arity = A::ARITY,
            target = %opts.target,
            call = %identity,
            cached = false,
            direct,
            "dispatch"
        );

        let call = PendingCall {
            identity,
            version: opts.version,
            target: opts.target.clone(),
            body: function.bind(args),
        };
        let result = executor.execute(lock, cache.as_ref(), call, ctx)?;

        if direct {
            if let Some(Err(e)) = result.try_get() {
                return Err(SchedulerError::Call(e));
            }
        }
        Ok(result)
    }

    /// Dispatch one call per argument tuple, returning the results in order.
    ///
    /// # Errors
    ///
    /// Stops at the first dispatch error.
    pub fn dispatch_many<A, R, I>(
        &self,
        ctx: &CallContext,
        opts: &CallOptions,
        function: &Function<A, R>,
        batch: I,
    ) -> Result<Vec<CallResult<R>>, SchedulerError>
    where
        A: CallArgs,
        R: Clone + Send + 'static,
        I: IntoIterator<Item = A>,
    {
        batch
            .into_iter()
            .map(|args| self.dispatch(ctx, opts, function, args))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::error::CallError;
    use crate::core::executor::Runnable;
    use parking_lot::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn counted() -> (Arc<AtomicUsize>, Function<(u32,), u32>) {
        let runs = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&runs);
        let f = Function::new("double", move |(n,): (u32,)| {
            counter.fetch_add(1, Ordering::SeqCst);
            n * 2
        });
        (runs, f)
    }

    #[test]
    fn unbound_dispatcher_reports_not_initialized() {
        let dispatcher = Dispatcher::new();
        let (_, f) = counted();
        let err = dispatcher
            .dispatch(&CallContext::unbound(), &CallOptions::direct(), &f, (1,))
            .unwrap_err();
        assert!(matches!(err, SchedulerError::NotInitialized));
    }

    #[test]
    fn rebinding_is_rejected() {
        let dispatcher = Dispatcher::with_scheduler(Arc::new(Scheduler::single_threaded()));
        assert!(matches!(
            dispatcher.bind(Arc::new(Scheduler::single_threaded())),
            Err(SchedulerError::AlreadyInitialized)
        ));
    }

    #[test]
    fn hits_skip_execution() {
        let dispatcher = Dispatcher::with_scheduler(Arc::new(Scheduler::single_threaded()));
        let (runs, f) = counted();
        let opts = CallOptions::direct().with_cache(Cache::FOREVER);
        let ctx = CallContext::unbound();

        let first = dispatcher.dispatch(&ctx, &opts, &f, (21,)).unwrap();
        let second = dispatcher.dispatch(&ctx, &opts, &f, (21,)).unwrap();
        assert_eq!(first.join(&ctx), Ok(42));
        assert_eq!(second.join(&ctx), Ok(42));
        assert_eq!(runs.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn direct_failures_surface_synchronously() {
        let dispatcher = Dispatcher::with_scheduler(Arc::new(Scheduler::single_threaded()));
        let f = Function::new("explode", |(): ()| -> u8 { panic!("kaboom") });
        let err = dispatcher
            .dispatch(&CallContext::unbound(), &CallOptions::direct(), &f, ())
            .unwrap_err();
        match err {
            SchedulerError::Call(CallError::Panicked { message, .. }) => assert_eq!(message, "kaboom"),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn foreign_handles_are_rejected() {
        let dispatcher = Dispatcher::with_scheduler(Arc::new(Scheduler::single_threaded()));
        let (_, f) = counted();
        let ctx = CallContext::unbound();

        let opts = CallOptions::asynchronous().with_target(Target::named("nowhere"));
        assert!(matches!(
            dispatcher.dispatch(&ctx, &opts, &f, (1,)),
            Err(SchedulerError::UnknownTarget(_))
        ));

        let opts = CallOptions::direct().with_cache(Cache(77));
        assert!(matches!(
            dispatcher.dispatch(&ctx, &opts, &f, (1,)),
            Err(SchedulerError::UnknownCache(_))
        ));
    }

    #[test]
    fn batches_keep_their_order() {
        let dispatcher = Dispatcher::with_scheduler(Arc::new(Scheduler::single_threaded()));
        let (_, f) = counted();
        let ctx = CallContext::unbound();
        let results = dispatcher
            .dispatch_many(&ctx, &CallOptions::direct(), &f, (1..=3).map(|n| (n,)))
            .unwrap();
        let values: Vec<u32> = results.iter().map(|r| r.join(&ctx).unwrap()).collect();
        assert_eq!(values, vec![2, 4, 6]);
    }

    #[test]
    fn abandoned_entries_are_executed_again() {
        let scheduler = Arc::new(Scheduler::thread_pool(1).unwrap());
        let queue: Arc<Mutex<Vec<Runnable>>> = Arc::default();
        let sink = Arc::clone(&queue);
        let ui = Target::named("ui");
        scheduler
            .register_target(
                ui.clone(),
                Arc::new(move |run| {
                    sink.lock().push(run);
                    Ok(())
                }),
            )
            .unwrap();
        let dispatcher = Dispatcher::with_scheduler(Arc::clone(&scheduler));
        let (runs, f) = counted();
        let opts = CallOptions::asynchronous().with_target(ui.clone()).with_cache(Cache::FOREVER);
        let ctx = CallContext::unbound();

        let lost = dispatcher.dispatch(&ctx, &opts, &f, (5,)).unwrap();
        queue.lock().clear();
        assert_eq!(lost.join(&ctx), Err(CallError::Abandoned));

        let retried = dispatcher.dispatch(&ctx, &opts, &f, (5,)).unwrap();
        let owner = CallContext::bound(ui);
        for run in queue.lock().drain(..) {
            run(&owner);
        }
        assert_eq!(retried.join(&ctx), Ok(10));
        assert_eq!(runs.load(Ordering::SeqCst), 1);
        scheduler.shutdown();
    }
}
