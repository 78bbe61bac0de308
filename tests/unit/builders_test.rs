//! Tests for builder modules

use prometheus_frame_scheduler::builders::{build_scheduler, SchedulerBuilder};
use prometheus_frame_scheduler::config::{PoolKind, SchedulerSettings};
use prometheus_frame_scheduler::core::{Drain, Runnable, SchedulerError, Target};
use std::sync::Arc;

#[test]
fn test_builder_selects_the_pool_strategy() {
    let scheduler = build_scheduler(SchedulerSettings::multi_threaded(PoolKind::ThreadPool, 2)).unwrap();
    assert!(scheduler.is_multi_threaded());
    assert_eq!(scheduler.pool_stats().map(|s| s.worker_count), Some(2));
    scheduler.shutdown();

    let scheduler = build_scheduler(SchedulerSettings::multi_threaded(PoolKind::WorkStealing, 2)).unwrap();
    assert_eq!(scheduler.pool_stats().map(|s| s.worker_count), Some(2));
    scheduler.shutdown();
}

#[test]
fn test_builder_rejects_invalid_settings() {
    let mut settings = SchedulerSettings::multi_threaded(PoolKind::ThreadPool, 1);
    settings.max_queue_depth = Some(0);
    assert!(matches!(
        build_scheduler(settings),
        Err(SchedulerError::InvalidConfig(_))
    ));
}

fn discard() -> Drain {
    Arc::new(|run: Runnable| {
        drop(run);
        Ok(())
    })
}

#[test]
fn test_builder_registers_targets() {
    let scheduler = SchedulerBuilder::new(SchedulerSettings::single_threaded())
        .with_target(Target::named("audio"), discard())
        .build()
        .unwrap();
    assert!(scheduler.has_target(&Target::named("audio")));
    assert!(scheduler.has_target(&Target::ANY));
}

#[test]
fn test_builder_rejects_duplicate_targets() {
    let result = SchedulerBuilder::new(SchedulerSettings::single_threaded())
        .with_target(Target::named("audio"), discard())
        .with_target(Target::named("audio"), discard())
        .build();
    assert!(matches!(result, Err(SchedulerError::TargetAlreadyRegistered(_))));
}
