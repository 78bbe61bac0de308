//! Dependency-graph task runner.
//!
//! A [`Task`] holds an ordered list of dependencies. Executing it executes
//! every dependency in registration order, joins them all, then runs its own
//! body. Shared dependencies are not deduplicated, and cycles are not
//! detected: a cyclic graph recurses until the stack overflows.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::debug;

use crate::core::error::{CallError, SchedulerError};
use crate::core::result::CallResult;
use crate::core::target::CallContext;

/// A result that can be joined without knowing its value type.
pub trait Joinable: Send + Sync {
    /// Block until the result is available, discarding the value.
    ///
    /// # Errors
    ///
    /// The call's failure.
    fn join_any(&self, ctx: &CallContext) -> Result<(), CallError>;
}

impl<R: Clone + Send + 'static> Joinable for CallResult<R> {
    fn join_any(&self, ctx: &CallContext) -> Result<(), CallError> {
        self.join(ctx).map(drop)
    }
}

/// Handle of a registered dependency, used to remove it again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DependencyId(u64);

type Dependency = Arc<dyn Fn(&CallContext) -> Result<Box<dyn Joinable>, SchedulerError> + Send + Sync>;
type Body<R> = dyn Fn(&CallContext) -> Result<CallResult<R>, SchedulerError> + Send + Sync;

/// A node in a dependency graph.
pub struct Task<R> {
    name: String,
    dependencies: RwLock<Vec<(DependencyId, Dependency)>>,
    body: Box<Body<R>>,
    next_id: AtomicU64,
}

impl<R> fmt::Debug for Task<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Task")
            .field("name", &self.name)
            .field("dependencies", &self.dependencies.read().len())
            .finish_non_exhaustive()
    }
}

impl<R: Clone + Send + 'static> Task<R> {
    /// A task whose body produces a result, typically by dispatching a call.
    pub fn new<F>(name: impl Into<String>, body: F) -> Self
    where
        F: Fn(&CallContext) -> Result<CallResult<R>, SchedulerError> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            dependencies: RwLock::new(Vec::new()),
            body: Box::new(body),
            next_id: AtomicU64::new(0),
        }
    }

    /// A task whose body computes its value synchronously.
    pub fn from_fn<F>(name: impl Into<String>, body: F) -> Self
    where
        F: Fn(&CallContext) -> R + Send + Sync + 'static,
    {
        Self::new(name, move |ctx| Ok(CallResult::ready(body(ctx))))
    }

    /// Task name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Append a dependency. It runs, and is joined, before this task's body.
    pub fn add_dependency<T, F>(&self, dependency: F) -> DependencyId
    where
        T: Clone + Send + 'static,
        F: Fn(&CallContext) -> Result<CallResult<T>, SchedulerError> + Send + Sync + 'static,
    {
        let id = DependencyId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let erased: Dependency = Arc::new(move |ctx: &CallContext| {
            dependency(ctx).map(|result| Box::new(result) as Box<dyn Joinable>)
        });
        self.dependencies.write().push((id, erased));
        id
    }

    /// Depend on another task.
    pub fn depends_on<T: Clone + Send + 'static>(&self, other: &Arc<Task<T>>) -> DependencyId {
        let other = Arc::clone(other);
        self.add_dependency(move |ctx| other.execute(ctx))
    }

    /// Remove a dependency. Returns whether it was present.
    pub fn remove_dependency(&self, id: DependencyId) -> bool {
        let mut dependencies = self.dependencies.write();
        let before = dependencies.len();
        dependencies.retain(|(dep, _)| *dep != id);
        dependencies.len() != before
    }

    /// Number of registered dependencies.
    #[must_use]
    pub fn dependency_count(&self) -> usize {
        self.dependencies.read().len()
    }

    /// Execute the dependencies, join them, then run the body.
    ///
    /// # Errors
    ///
    /// The first dependency that fails to dispatch or to complete, or the
    /// body's own dispatch error.
    pub fn execute(&self, ctx: &CallContext) -> Result<CallResult<R>, SchedulerError> {
        // Snapshot so dependencies may edit the graph while it runs.
        let dependencies: Vec<Dependency> = self
            .dependencies
            .read()
            .iter()
            .map(|(_, dep)| Arc::clone(dep))
            .collect();
        debug!(task = %self.name, dependencies = dependencies.len(), "executing task");

        let pending = dependencies
            .iter()
            .map(|dependency| dependency(ctx))
            .collect::<Result<Vec<_>, _>>()?;
        for result in &pending {
            result.join_any(ctx)?;
        }
        (self.body)(ctx)
    }
}
