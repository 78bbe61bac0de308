//! Outcome handles of dispatched calls.
//!
//! A [`CallResult`] is either `Immediate` (the body runs on the dispatching
//! thread) or `Deferred` (some execution context runs it later). Both can be
//! joined from any thread. A deferred result additionally carries a one-shot
//! claim flag: whoever wins the claim runs the body, everybody else waits.

use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};
use tracing::warn;

use crate::core::error::CallError;
use crate::core::identity::{BoundCall, CallIdentity};
use crate::core::target::{CallContext, Target};

/// Caller-supplied version a result was produced for (typically a frame id).
pub type Version = u64;

/// Lifecycle of a call result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallState {
    /// Not claimed by any execution context yet.
    Pending,
    /// Claimed and executing.
    Running,
    /// Finished with a value.
    Completed,
    /// Finished with a failure.
    Failed,
}

/// Write-once outcome slot with blocking waiters.
struct Completion<R> {
    outcome: Mutex<Option<Result<R, CallError>>>,
    ready: Condvar,
}

impl<R: Clone> Completion<R> {
    const fn new() -> Self {
        Self {
            outcome: Mutex::new(None),
            ready: Condvar::new(),
        }
    }

    /// Store the outcome unless one is already present. Terminal states are sticky.
    fn complete(&self, outcome: Result<R, CallError>) -> bool {
        let mut slot = self.outcome.lock();
        if slot.is_some() {
            return false;
        }
        *slot = Some(outcome);
        drop(slot);
        self.ready.notify_all();
        true
    }

    fn peek(&self) -> Option<Result<R, CallError>> {
        self.outcome.lock().clone()
    }

    fn is_abandoned(&self) -> bool {
        matches!(*self.outcome.lock(), Some(Err(CallError::Abandoned)))
    }

    fn finished_state(&self) -> Option<CallState> {
        self.outcome.lock().as_ref().map(|outcome| match outcome {
            Ok(_) => CallState::Completed,
            Err(_) => CallState::Failed,
        })
    }

    fn wait(&self) -> Result<R, CallError> {
        let mut slot = self.outcome.lock();
        loop {
            if let Some(outcome) = slot.as_ref() {
                return outcome.clone();
            }
            self.ready.wait(&mut slot);
        }
    }

    fn wait_for(&self, timeout: Duration) -> Result<R, CallError> {
        let deadline = Instant::now() + timeout;
        let mut slot = self.outcome.lock();
        loop {
            if let Some(outcome) = slot.as_ref() {
                return outcome.clone();
            }
            if self.ready.wait_until(&mut slot, deadline).timed_out() {
                return slot.as_ref().map_or(Err(CallError::Timeout), Clone::clone);
            }
        }
    }
}

/// Run a bound call, turning a panic into a `CallError`.
fn run_guarded<R>(identity: CallIdentity, body: BoundCall<R>, ctx: &CallContext) -> Result<R, CallError> {
    panic::catch_unwind(AssertUnwindSafe(|| body(ctx)))
        .map_err(|payload| CallError::from_panic(identity, payload.as_ref()))
}

/// Result whose body runs synchronously on the dispatching thread.
pub struct Immediate<R> {
    identity: CallIdentity,
    version: Version,
    completion: Completion<R>,
}

impl<R: Clone> Immediate<R> {
    pub(crate) const fn new(identity: CallIdentity, version: Version) -> Self {
        Self {
            identity,
            version,
            completion: Completion::new(),
        }
    }

    /// Execute `body` and publish its outcome.
    pub(crate) fn run(&self, body: BoundCall<R>, ctx: &CallContext) {
        let outcome = run_guarded(self.identity, body, ctx);
        self.completion.complete(outcome);
    }

    pub(crate) fn set(&self, value: R) {
        self.completion.complete(Ok(value));
    }
}

/// Result produced later by an execution context.
pub struct Deferred<R> {
    identity: CallIdentity,
    version: Version,
    target: Target,
    claimed: AtomicBool,
    body: Mutex<Option<BoundCall<R>>>,
    completion: Completion<R>,
}

impl<R: Clone> Deferred<R> {
    pub(crate) fn new(identity: CallIdentity, version: Version, target: Target, body: BoundCall<R>) -> Self {
        Self {
            identity,
            version,
            target,
            claimed: AtomicBool::new(false),
            body: Mutex::new(Some(body)),
            completion: Completion::new(),
        }
    }

    /// Identity of the call.
    pub const fn identity(&self) -> CallIdentity {
        self.identity
    }

    /// Target this call is affine to.
    pub const fn target(&self) -> &Target {
        &self.target
    }

    /// Take the one-shot claim. Exactly one caller ever gets `true`.
    pub fn try_claim(&self) -> bool {
        self.claimed
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// Whether the claim has been taken.
    pub fn is_claimed(&self) -> bool {
        self.claimed.load(Ordering::Acquire)
    }

    /// Claim and run the body on `ctx`. Returns whether this caller ran it.
    pub(crate) fn run_if_unclaimed(&self, ctx: &CallContext) -> bool {
        if !self.try_claim() {
            return false;
        }
        let body = self.body.lock().take();
        let outcome = match body {
            Some(body) => run_guarded(self.identity, body, ctx),
            None => Err(CallError::Abandoned),
        };
        self.completion.complete(outcome);
        true
    }

    /// Fail the call if nobody claimed it yet.
    pub(crate) fn abandon(&self) {
        if self.try_claim() {
            self.body.lock().take();
            warn!(call = %self.identity, target = %self.target, "call abandoned before it ran");
            self.completion.complete(Err(CallError::Abandoned));
        }
    }

    fn help(&self, ctx: &CallContext) {
        if self.completion.finished_state().is_none() && ctx.may_run(&self.target) {
            self.run_if_unclaimed(ctx);
        }
    }
}

/// Handle to the outcome of a dispatched call.
///
/// Cloning is cheap; clones observe the same outcome.
pub enum CallResult<R> {
    /// Body runs on the dispatching thread.
    Immediate(Arc<Immediate<R>>),
    /// Body runs on the context bound to the call's target.
    Deferred(Arc<Deferred<R>>),
}

impl<R> Clone for CallResult<R> {
    fn clone(&self) -> Self {
        match self {
            Self::Immediate(inner) => Self::Immediate(Arc::clone(inner)),
            Self::Deferred(inner) => Self::Deferred(Arc::clone(inner)),
        }
    }
}

impl<R> std::fmt::Debug for CallResult<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let (kind, identity, version) = match self {
            Self::Immediate(inner) => ("Immediate", inner.identity, inner.version),
            Self::Deferred(inner) => ("Deferred", inner.identity, inner.version),
        };
        f.debug_struct(kind)
            .field("identity", &identity)
            .field("version", &version)
            .finish_non_exhaustive()
    }
}

impl<R: Clone + Send + 'static> CallResult<R> {
    /// An already completed result that was never dispatched.
    pub fn ready(value: R) -> Self {
        let immediate = Immediate::new(CallIdentity::anonymous(), 0);
        immediate.set(value);
        Self::Immediate(Arc::new(immediate))
    }

    /// Identity of the call that produced this result.
    pub fn identity(&self) -> CallIdentity {
        match self {
            Self::Immediate(inner) => inner.identity,
            Self::Deferred(inner) => inner.identity,
        }
    }

    /// Version the result was produced for.
    pub fn version(&self) -> Version {
        match self {
            Self::Immediate(inner) => inner.version,
            Self::Deferred(inner) => inner.version,
        }
    }

    /// Current lifecycle state.
    pub fn state(&self) -> CallState {
        match self {
            Self::Immediate(inner) => inner
                .completion
                .finished_state()
                .unwrap_or(CallState::Running),
            Self::Deferred(inner) => inner.completion.finished_state().unwrap_or_else(|| {
                if inner.is_claimed() {
                    CallState::Running
                } else {
                    CallState::Pending
                }
            }),
        }
    }

    /// Whether a value or failure is available.
    pub fn is_complete(&self) -> bool {
        matches!(self.state(), CallState::Completed | CallState::Failed)
    }

    /// Whether the call was dropped before it ever ran.
    pub fn is_abandoned(&self) -> bool {
        match self {
            Self::Immediate(inner) => inner.completion.is_abandoned(),
            Self::Deferred(inner) => inner.completion.is_abandoned(),
        }
    }

    /// The outcome, if already available. Never blocks or runs anything.
    pub fn try_get(&self) -> Option<Result<R, CallError>> {
        match self {
            Self::Immediate(inner) => inner.completion.peek(),
            Self::Deferred(inner) => inner.completion.peek(),
        }
    }

    /// Block until the outcome is available.
    ///
    /// If the call is still unclaimed and `ctx` may run work for its target,
    /// the calling thread claims and runs it itself instead of waiting. This
    /// keeps a target from deadlocking on its own queue.
    ///
    /// # Errors
    ///
    /// Returns the call's failure; every joiner sees the same error.
    pub fn join(&self, ctx: &CallContext) -> Result<R, CallError> {
        match self {
            Self::Immediate(inner) => inner.completion.wait(),
            Self::Deferred(inner) => {
                inner.help(ctx);
                inner.completion.wait()
            }
        }
    }

    /// Like [`join`](Self::join), but gives up after `timeout`.
    ///
    /// # Errors
    ///
    /// `CallError::Timeout` if nothing arrived in time, otherwise the call's failure.
    pub fn join_timeout(&self, ctx: &CallContext, timeout: Duration) -> Result<R, CallError> {
        match self {
            Self::Immediate(inner) => inner.completion.wait_for(timeout),
            Self::Deferred(inner) => {
                inner.help(ctx);
                inner.completion.wait_for(timeout)
            }
        }
    }

    /// Await the outcome from async code without blocking the runtime.
    ///
    /// The wait moves to tokio's blocking pool.
    ///
    /// # Errors
    ///
    /// Returns the call's failure.
    #[cfg(feature = "tokio-runtime")]
    pub async fn join_async(&self) -> Result<R, CallError> {
        if let Some(outcome) = self.try_get() {
            return outcome;
        }
        let this = self.clone();
        let identity = self.identity();
        tokio::task::spawn_blocking(move || this.join(&CallContext::unbound()))
            .await
            .unwrap_or_else(|e| {
                Err(CallError::Panicked {
                    call: identity,
                    message: e.to_string(),
                })
            })
    }
}
