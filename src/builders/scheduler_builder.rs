//! Build a [`Scheduler`] from [`SchedulerSettings`].

use std::sync::Arc;

use tracing::debug;

use crate::config::{PoolKind, SchedulerSettings, ThreadPoolConfig, Threading};
use crate::core::error::SchedulerError;
use crate::core::executor::Drain;
use crate::core::scheduler::Scheduler;
use crate::core::target::Target;
use crate::core::worker_pool::{Pool, ThreadPool, WorkStealingPool};

/// Assembles a scheduler from settings, an optional custom pool, and the
/// drains of the targets known up front.
#[derive(Default)]
pub struct SchedulerBuilder {
    settings: SchedulerSettings,
    custom_pool: Option<Arc<dyn Pool>>,
    targets: Vec<(Target, Drain)>,
}

impl SchedulerBuilder {
    /// Builder starting from `settings`.
    #[must_use]
    pub fn new(settings: SchedulerSettings) -> Self {
        Self {
            settings,
            custom_pool: None,
            targets: Vec::new(),
        }
    }

    /// Pool used when the settings ask for [`PoolKind::Custom`].
    #[must_use]
    pub fn with_custom_pool(mut self, pool: Arc<dyn Pool>) -> Self {
        self.custom_pool = Some(pool);
        self
    }

    /// Register `target` with `drain` once the scheduler exists.
    #[must_use]
    pub fn with_target(mut self, target: Target, drain: Drain) -> Self {
        self.targets.push((target, drain));
        self
    }

    /// Build the scheduler.
    ///
    /// # Errors
    ///
    /// - `InvalidConfig` for invalid settings or a custom strategy without a pool
    /// - `Pool` if the pool cannot be started
    /// - `TargetAlreadyRegistered` for duplicate targets
    pub fn build(self) -> Result<Scheduler, SchedulerError> {
        self.settings.validate().map_err(SchedulerError::InvalidConfig)?;

        let scheduler = match self.settings.threading {
            Threading::SingleThreaded => Scheduler::single_threaded(),
            Threading::MultiThreaded => {
                Scheduler::multi_threaded(build_pool(&self.settings, self.custom_pool)?)
            }
        };
        for (target, drain) in self.targets {
            scheduler.register_target(target, drain)?;
        }
        Ok(scheduler)
    }
}

fn build_pool(
    settings: &SchedulerSettings,
    custom: Option<Arc<dyn Pool>>,
) -> Result<Arc<dyn Pool>, SchedulerError> {
    let threads = settings.effective_threads();
    debug!(pool = ?settings.pool, threads = threads, "building pool");
    let pool: Arc<dyn Pool> = match settings.pool {
        PoolKind::ThreadPool => {
            let mut config = ThreadPoolConfig::new()
                .with_worker_count(threads)
                .with_thread_stack_size(settings.thread_stack_size);
            if let Some(depth) = settings.max_queue_depth {
                config = config.with_max_queue_depth(depth);
            }
            Arc::new(ThreadPool::new(config)?)
        }
        PoolKind::WorkStealing => Arc::new(WorkStealingPool::new(threads)?),
        #[cfg(feature = "tokio-runtime")]
        PoolKind::TaskPerCall => Arc::new(crate::core::worker_pool::TaskPerCallPool::new()?),
        #[cfg(not(feature = "tokio-runtime"))]
        PoolKind::TaskPerCall => {
            return Err(SchedulerError::InvalidConfig(
                "task_per_call requires the `tokio-runtime` feature".into(),
            ))
        }
        PoolKind::Custom => custom.ok_or_else(|| {
            SchedulerError::InvalidConfig("custom pool strategy selected but no pool supplied".into())
        })?,
    };
    Ok(pool)
}

/// Build a scheduler straight from settings, without custom pool or targets.
///
/// # Errors
///
/// See [`SchedulerBuilder::build`].
pub fn build_scheduler(settings: SchedulerSettings) -> Result<Scheduler, SchedulerError> {
    SchedulerBuilder::new(settings).build()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::worker_pool::FnPool;

    #[test]
    fn single_threaded_settings_build_without_a_pool() {
        let scheduler = build_scheduler(SchedulerSettings::single_threaded()).unwrap();
        assert!(!scheduler.is_multi_threaded());
    }

    #[test]
    fn custom_strategy_requires_a_pool() {
        assert!(matches!(
            build_scheduler(SchedulerSettings::custom()),
            Err(SchedulerError::InvalidConfig(_))
        ));

        let pool: Arc<dyn Pool> = Arc::new(FnPool::new("inline", |job| job()));
        let scheduler = SchedulerBuilder::new(SchedulerSettings::custom())
            .with_custom_pool(pool)
            .build()
            .unwrap();
        assert!(scheduler.is_multi_threaded());
    }
}
