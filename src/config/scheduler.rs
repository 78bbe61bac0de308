//! Scheduler settings: threading model and pool strategy.

use std::env;

use anyhow::Context;
use serde::{Deserialize, Serialize};

use crate::core::error::AppResult;

/// Environment key selecting the threading model.
pub const ENV_THREADING: &str = "FRAME_SCHEDULER_THREADING";
/// Environment key selecting the pool strategy.
pub const ENV_POOL: &str = "FRAME_SCHEDULER_POOL";
/// Environment key with the worker thread count.
pub const ENV_THREADS: &str = "FRAME_SCHEDULER_THREADS";
/// Environment key with the fixed pool's queue bound.
pub const ENV_QUEUE_DEPTH: &str = "FRAME_SCHEDULER_QUEUE_DEPTH";

/// Threading model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Threading {
    /// Everything runs where it is dispatched.
    #[default]
    SingleThreaded,
    /// `Target::ANY` is backed by a pool.
    MultiThreaded,
}

/// Pool strategy of a multi-threaded scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PoolKind {
    /// Fixed-size thread pool.
    #[default]
    ThreadPool,
    /// Work-stealing pool.
    WorkStealing,
    /// One lightweight task per call.
    TaskPerCall,
    /// Caller-supplied pool.
    Custom,
}

impl std::str::FromStr for Threading {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        serde_json::from_value(serde_json::Value::String(s.trim().to_ascii_lowercase()))
            .map_err(|_| format!("unknown threading model `{s}`"))
    }
}

impl std::str::FromStr for PoolKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        serde_json::from_value(serde_json::Value::String(s.trim().to_ascii_lowercase()))
            .map_err(|_| format!("unknown pool kind `{s}`"))
    }
}

/// How a scheduler should be built.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerSettings {
    /// Threading model.
    pub threading: Threading,
    /// Pool strategy, used when multi-threaded.
    pub pool: PoolKind,
    /// Worker threads; 0 means one per CPU.
    pub thread_count: usize,
    /// Queue bound of the fixed thread pool.
    pub max_queue_depth: Option<usize>,
    /// Stack size of pool worker threads, in bytes.
    pub thread_stack_size: usize,
}

impl Default for SchedulerSettings {
    fn default() -> Self {
        Self {
            threading: Threading::SingleThreaded,
            pool: PoolKind::ThreadPool,
            thread_count: 0,
            max_queue_depth: None,
            thread_stack_size: 2 * 1024 * 1024,
        }
    }
}

impl SchedulerSettings {
    /// Everything runs where it is dispatched.
    #[must_use]
    pub fn single_threaded() -> Self {
        Self::default()
    }

    /// Pool-backed scheduler with `threads` workers (0 = one per CPU).
    #[must_use]
    pub fn multi_threaded(pool: PoolKind, threads: usize) -> Self {
        Self {
            threading: Threading::MultiThreaded,
            pool,
            thread_count: threads,
            ..Self::default()
        }
    }

    /// One lightweight task per call.
    #[must_use]
    pub fn task_per_call() -> Self {
        Self::multi_threaded(PoolKind::TaskPerCall, 0)
    }

    /// Pool supplied by the caller at build time.
    #[must_use]
    pub fn custom() -> Self {
        Self::multi_threaded(PoolKind::Custom, 0)
    }

    /// Worker thread count with 0 resolved to the CPU count.
    #[must_use]
    pub fn effective_threads(&self) -> usize {
        if self.thread_count == 0 {
            num_cpus::get()
        } else {
            self.thread_count
        }
    }

    /// Validate settings values.
    ///
    /// # Errors
    ///
    /// Returns a description of the first invalid field.
    pub fn validate(&self) -> Result<(), String> {
        if self.max_queue_depth == Some(0) {
            return Err("max_queue_depth must be greater than 0".into());
        }
        if self.max_queue_depth.is_some() && self.pool != PoolKind::ThreadPool {
            return Err("max_queue_depth only applies to the thread_pool strategy".into());
        }
        if self.thread_stack_size < 64 * 1024 {
            return Err("thread_stack_size must be at least 64 KiB".into());
        }
        Ok(())
    }

    /// Parse settings from a JSON string and validate.
    ///
    /// # Errors
    ///
    /// Parse or validation failure.
    pub fn from_json_str(input: &str) -> Result<Self, String> {
        let settings: Self = serde_json::from_str(input).map_err(|e| format!("parse error: {e}"))?;
        settings.validate()?;
        Ok(settings)
    }

    /// Settings from the process environment, after loading `.env` if present.
    ///
    /// Unset keys keep their defaults.
    ///
    /// # Errors
    ///
    /// Unparseable values or failed validation.
    pub fn from_env() -> AppResult<Self> {
        let _ = dotenvy::dotenv();
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub(crate) fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> AppResult<Self> {
        let mut settings = Self::default();
        if let Some(value) = lookup(ENV_THREADING) {
            settings.threading = value.parse().map_err(anyhow::Error::msg)?;
        }
        if let Some(value) = lookup(ENV_POOL) {
            settings.pool = value.parse().map_err(anyhow::Error::msg)?;
        }
        if let Some(value) = lookup(ENV_THREADS) {
            settings.thread_count = value
                .trim()
                .parse()
                .with_context(|| format!("{ENV_THREADS} must be a number, got `{value}`"))?;
        }
        if let Some(value) = lookup(ENV_QUEUE_DEPTH) {
            let depth = value
                .trim()
                .parse()
                .with_context(|| format!("{ENV_QUEUE_DEPTH} must be a number, got `{value}`"))?;
            settings.max_queue_depth = Some(depth);
        }
        settings.validate().map_err(anyhow::Error::msg)?;
        Ok(settings)
    }
}
