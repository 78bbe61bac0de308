//! The scheduler: cache tree, target routing table and the dispatch lock.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::{Mutex, MutexGuard, RwLock};
use tracing::{debug, info};
use uuid::Uuid;

use crate::core::cache::{Cache, CacheLayer, CacheNode, CachePolicy, RootStore};
use crate::core::error::SchedulerError;
use crate::core::executor::{Drain, TargetExecutor};
use crate::core::identity::CallIdentity;
use crate::core::target::Target;
use crate::core::worker_pool::{Pool, PoolError, PoolStats, ThreadPool, WorkStealingPool};

/// Owns the caches and the target table of one scheduling domain.
///
/// A single-threaded scheduler runs every call where it is dispatched. A
/// multi-threaded scheduler routes `Target::ANY` to a worker pool and every
/// other registered target to that target's drain.
pub struct Scheduler {
    instance_id: Uuid,
    multi_threaded: bool,
    root: Arc<RootStore>,
    caches: RwLock<Vec<Arc<CacheNode>>>,
    targets: RwLock<HashMap<Target, TargetExecutor>>,
    pool: Option<Arc<dyn Pool>>,
    dispatch_lock: Mutex<()>,
    shut_down: AtomicBool,
    last_tick: AtomicU64,
}

impl std::fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scheduler")
            .field("instance_id", &self.instance_id)
            .field("multi_threaded", &self.multi_threaded)
            .field("targets", &self.targets.read().keys().collect::<Vec<_>>())
            .field("caches", &self.caches.read().len())
            .finish_non_exhaustive()
    }
}

impl Scheduler {
    fn with_any_executor(any: TargetExecutor, pool: Option<Arc<dyn Pool>>) -> Self {
        let root = Arc::new(RootStore::new());
        let caches = Cache::BUILT_IN
            .iter()
            .map(|(name, policy)| {
                let parent: Arc<dyn CacheLayer> = root.clone();
                Arc::new(CacheNode::new(*name, *policy, parent))
            })
            .collect();
        let mut targets = HashMap::new();
        targets.insert(Target::ANY, any);

        let scheduler = Self {
            instance_id: Uuid::new_v4(),
            multi_threaded: pool.is_some(),
            root,
            caches: RwLock::new(caches),
            targets: RwLock::new(targets),
            pool,
            dispatch_lock: Mutex::new(()),
            shut_down: AtomicBool::new(false),
            last_tick: AtomicU64::new(0),
        };
        info!(
            instance = %scheduler.instance_id,
            multi_threaded = scheduler.multi_threaded,
            pool = ?scheduler.pool.as_ref().map(|p| p.name().to_owned()),
            "Scheduler initialized"
        );
        scheduler
    }

    /// Scheduler where every call runs immediately on the dispatching thread.
    #[must_use]
    pub fn single_threaded() -> Self {
        Self::with_any_executor(TargetExecutor::Immediate, None)
    }

    /// Scheduler routing `Target::ANY` to `pool`.
    #[must_use]
    pub fn multi_threaded(pool: Arc<dyn Pool>) -> Self {
        Self::with_any_executor(TargetExecutor::Pool(Arc::clone(&pool)), Some(pool))
    }

    /// Multi-threaded scheduler over a fixed thread pool.
    ///
    /// # Errors
    ///
    /// Propagates pool construction failures.
    pub fn thread_pool(threads: usize) -> Result<Self, PoolError> {
        Ok(Self::multi_threaded(Arc::new(ThreadPool::with_workers(threads)?)))
    }

    /// Multi-threaded scheduler over a work-stealing pool.
    ///
    /// # Errors
    ///
    /// Propagates pool construction failures.
    pub fn work_stealing(threads: usize) -> Result<Self, PoolError> {
        Ok(Self::multi_threaded(Arc::new(WorkStealingPool::new(threads)?)))
    }

    /// Multi-threaded scheduler that runs every call as its own task.
    ///
    /// # Errors
    ///
    /// Propagates runtime construction failures.
    #[cfg(feature = "tokio-runtime")]
    pub fn task_per_call() -> Result<Self, PoolError> {
        Ok(Self::multi_threaded(Arc::new(
            crate::core::worker_pool::TaskPerCallPool::new()?,
        )))
    }

    /// Bind `target` to `drain`.
    ///
    /// On a single-threaded scheduler there is nothing to hand work to, so the
    /// target runs its calls immediately like `Target::ANY`.
    ///
    /// # Errors
    ///
    /// `TargetAlreadyRegistered` if the target is bound already, `ShutDown`
    /// after shutdown.
    pub fn register_target(&self, target: Target, drain: Drain) -> Result<(), SchedulerError> {
        self.ensure_running()?;
        let mut targets = self.targets.write();
        if targets.contains_key(&target) {
            return Err(SchedulerError::TargetAlreadyRegistered(target));
        }
        let executor = if self.multi_threaded {
            TargetExecutor::Inline(drain)
        } else {
            TargetExecutor::Immediate
        };
        debug!(target = %target, executor = ?executor, "target registered");
        targets.insert(target, executor);
        Ok(())
    }

    /// Whether `target` has an executor.
    #[must_use]
    pub fn has_target(&self, target: &Target) -> bool {
        self.targets.read().contains_key(target)
    }

    /// Add a cache node directly under the root store.
    pub fn register_cache(&self, name: impl Into<String>, policy: CachePolicy) -> Cache {
        let parent: Arc<dyn CacheLayer> = self.root.clone();
        self.push_cache(CacheNode::new(name, policy, parent))
    }

    /// Add a cache node under another node.
    ///
    /// # Errors
    ///
    /// `UnknownCache` if `parent` does not belong to this scheduler.
    pub fn register_child_cache(
        &self,
        name: impl Into<String>,
        policy: CachePolicy,
        parent: Cache,
    ) -> Result<Cache, SchedulerError> {
        let parent: Arc<dyn CacheLayer> = self.cache_node(parent)?;
        Ok(self.push_cache(CacheNode::new(name, policy, parent)))
    }

    fn push_cache(&self, node: CacheNode) -> Cache {
        let mut caches = self.caches.write();
        debug!(cache = node.name(), policy = ?node.policy(), index = caches.len(), "cache registered");
        caches.push(Arc::new(node));
        Cache(caches.len() - 1)
    }

    pub(crate) fn cache_node(&self, cache: Cache) -> Result<Arc<CacheNode>, SchedulerError> {
        self.caches
            .read()
            .get(cache.0)
            .cloned()
            .ok_or(SchedulerError::UnknownCache(cache))
    }

    pub(crate) fn executor(&self, target: &Target) -> Result<TargetExecutor, SchedulerError> {
        self.targets
            .read()
            .get(target)
            .cloned()
            .ok_or_else(|| SchedulerError::UnknownTarget(target.clone()))
    }

    pub(crate) fn lock(&self) -> MutexGuard<'_, ()> {
        self.dispatch_lock.lock()
    }

    pub(crate) fn ensure_running(&self) -> Result<(), SchedulerError> {
        if self.shut_down.load(Ordering::Acquire) {
            return Err(SchedulerError::ShutDown);
        }
        Ok(())
    }

    /// Periodic sweep, called once per frame.
    ///
    /// Runs every cache node's invalidation under the dispatch lock, so no
    /// dispatch observes a half-swept tree.
    pub fn tick(&self, frame_id: u64) {
        let _guard = self.lock();
        for node in self.caches.read().iter() {
            node.invalidate_all();
        }
        self.last_tick.store(frame_id, Ordering::Release);
        debug!(frame = frame_id, "tick");
    }

    /// Apply `cache`'s invalidation outside the regular tick.
    ///
    /// # Errors
    ///
    /// `UnknownCache` if the handle does not belong to this scheduler.
    pub fn invalidate(&self, cache: Cache) -> Result<(), SchedulerError> {
        let node = self.cache_node(cache)?;
        let _guard = self.lock();
        node.invalidate_all();
        Ok(())
    }

    /// Evict one call from `cache`, as far as its policy allows.
    ///
    /// # Errors
    ///
    /// `UnknownCache` if the handle does not belong to this scheduler.
    pub fn evict(&self, cache: Cache, identity: &CallIdentity) -> Result<(), SchedulerError> {
        let node = self.cache_node(cache)?;
        let _guard = self.lock();
        node.evict(identity);
        Ok(())
    }

    /// Drop every cached result, whatever its policy.
    pub fn reset(&self) {
        let _guard = self.lock();
        for node in self.caches.read().iter() {
            node.reset();
        }
        self.root.reset();
        info!(instance = %self.instance_id, "scheduler caches reset");
    }

    /// Stop the pool and drop every drain registration.
    ///
    /// Calls that were scheduled but never claimed fail as abandoned once
    /// their runnables are discarded; nothing else is guaranteed to finish.
    pub fn shutdown(&self) {
        if self.shut_down.swap(true, Ordering::AcqRel) {
            return;
        }
        if let Some(pool) = &self.pool {
            pool.shutdown();
        }
        self.targets.write().retain(|target, _| target.is_any());
        info!(instance = %self.instance_id, "scheduler shut down");
    }

    /// Whether [`shutdown`](Self::shutdown) has been called.
    #[must_use]
    pub fn is_shut_down(&self) -> bool {
        self.shut_down.load(Ordering::Acquire)
    }

    /// Number of results held by the shared root store.
    #[must_use]
    pub fn cached_entries(&self) -> usize {
        self.root.len()
    }

    /// Statistics of the backing pool, if any.
    #[must_use]
    pub fn pool_stats(&self) -> Option<PoolStats> {
        self.pool.as_ref().map(|pool| pool.stats())
    }

    /// Frame id passed to the most recent [`tick`](Self::tick).
    #[must_use]
    pub fn last_tick(&self) -> u64 {
        self.last_tick.load(Ordering::Acquire)
    }

    /// Random id for correlating logs of this scheduler.
    #[must_use]
    pub const fn instance_id(&self) -> Uuid {
        self.instance_id
    }

    /// Whether `Target::ANY` is backed by a pool.
    #[must_use]
    pub const fn is_multi_threaded(&self) -> bool {
        self.multi_threaded
    }
}
