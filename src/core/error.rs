//! Error types for scheduler operations.

use thiserror::Error;

use crate::core::cache::Cache;
use crate::core::identity::CallIdentity;
use crate::core::target::Target;
use crate::core::worker_pool::PoolError;

/// Errors produced by scheduler components.
///
/// These are configuration or programmer errors surfaced at the call site,
/// plus the synchronous failure of a directly executed call.
#[derive(Debug, Error)]
pub enum SchedulerError {
    /// The dispatcher is already bound to a scheduler.
    #[error("scheduler already initialized")]
    AlreadyInitialized,
    /// The dispatcher has no scheduler bound yet.
    #[error("scheduler not initialized")]
    NotInitialized,
    /// A call was scheduled to a target with no registered executor.
    #[error("no executor registered for target `{0}`")]
    UnknownTarget(Target),
    /// A target was registered twice.
    #[error("target `{0}` is already registered")]
    TargetAlreadyRegistered(Target),
    /// The target's drain owner stopped accepting calls.
    #[error("target `{0}` no longer accepts calls")]
    TargetClosed(Target),
    /// A cache handle does not belong to this scheduler.
    #[error("unknown cache {0:?}")]
    UnknownCache(Cache),
    /// The scheduler has been shut down.
    #[error("scheduler has been shut down")]
    ShutDown,
    /// Settings failed validation.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    /// Backend-specific failure with context.
    #[error("backend error: {0}")]
    Backend(String),
    /// Worker pool failure.
    #[error(transparent)]
    Pool(#[from] PoolError),
    /// A directly executed call failed.
    #[error("call failed: {0}")]
    Call(#[from] CallError),
}

/// Failure of a dispatched call, delivered to every joiner.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CallError {
    /// The function body panicked.
    #[error("call {call} panicked: {message}")]
    Panicked {
        /// Identity of the failed call.
        call: CallIdentity,
        /// Panic payload rendered as text.
        message: String,
    },
    /// The call was dropped by its executor before it ever ran.
    #[error("call was abandoned before it ran")]
    Abandoned,
    /// A bounded join expired before the call finished.
    #[error("timed out waiting for call result")]
    Timeout,
}

impl CallError {
    /// Build a `Panicked` error from a caught panic payload.
    pub(crate) fn from_panic(call: CallIdentity, payload: &(dyn std::any::Any + Send)) -> Self {
        let message = payload
            .downcast_ref::<&str>()
            .map(|s| (*s).to_string())
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "non-string panic payload".into());
        Self::Panicked { call, message }
    }
}

/// Application-facing result using anyhow for higher-level contexts.
pub type AppResult<T> = Result<T, anyhow::Error>;
