//! Tests for error types

use prometheus_frame_scheduler::core::{CallError, PoolError, SchedulerError, Target};

#[test]
fn test_unknown_target_error() {
    let err = SchedulerError::UnknownTarget(Target::named("render"));
    assert_eq!(format!("{}", err), "no executor registered for target `render`");
}

#[test]
fn test_target_closed_error() {
    let err = SchedulerError::TargetClosed(Target::named("audio"));
    assert_eq!(format!("{}", err), "target `audio` no longer accepts calls");
}

#[test]
fn test_shut_down_error() {
    let err = SchedulerError::ShutDown;
    assert_eq!(format!("{}", err), "scheduler has been shut down");
}

#[test]
fn test_backend_error() {
    let err = SchedulerError::Backend("thread spawn failed".to_string());
    assert_eq!(format!("{}", err), "backend error: thread spawn failed");
}

#[test]
fn test_pool_error_is_transparent() {
    let err = SchedulerError::from(PoolError::QueueFull);
    assert_eq!(format!("{}", err), "job queue is full");
}

#[test]
fn test_call_error_wraps_into_scheduler_error() {
    let err = SchedulerError::from(CallError::Abandoned);
    assert_eq!(format!("{}", err), "call failed: call was abandoned before it ran");
    assert_eq!(format!("{}", CallError::Timeout), "timed out waiting for call result");
}
