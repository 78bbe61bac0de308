//! Tests for configuration validation

use prometheus_frame_scheduler::config::{PoolKind, SchedulerSettings, ThreadPoolConfig, Threading};

#[test]
fn test_thread_pool_config_validation() {
    let valid = ThreadPoolConfig::new().with_worker_count(4).with_max_queue_depth(64);
    assert!(valid.validate().is_ok());
}

#[test]
fn test_thread_pool_config_invalid_worker_count() {
    let invalid = ThreadPoolConfig::new().with_worker_count(0);
    assert!(invalid.validate().is_err());
}

#[test]
fn test_thread_pool_config_invalid_queue_depth() {
    let invalid = ThreadPoolConfig::new().with_max_queue_depth(0);
    assert!(invalid.validate().is_err());
}

#[test]
fn test_thread_pool_config_invalid_prefix() {
    let invalid = ThreadPoolConfig::new().with_thread_name_prefix("");
    assert!(invalid.validate().is_err());
}

#[test]
fn test_settings_default_to_single_threaded() {
    let settings = SchedulerSettings::default();
    assert_eq!(settings.threading, Threading::SingleThreaded);
    assert!(settings.validate().is_ok());
}

#[test]
fn test_settings_reject_queue_depth_without_thread_pool() {
    let mut settings = SchedulerSettings::multi_threaded(PoolKind::WorkStealing, 2);
    settings.max_queue_depth = Some(8);
    assert!(settings.validate().is_err());

    settings.pool = PoolKind::ThreadPool;
    assert!(settings.validate().is_ok());
}

#[test]
fn test_settings_from_json() {
    let json = r#"{
        "threading": "multi_threaded",
        "pool": "work_stealing",
        "thread_count": 3
    }"#;

    let settings = SchedulerSettings::from_json_str(json).unwrap();
    assert_eq!(settings, SchedulerSettings::multi_threaded(PoolKind::WorkStealing, 3));
    assert_eq!(settings.effective_threads(), 3);
}

#[test]
fn test_settings_from_json_rejects_unknown_pool() {
    let json = r#"{ "threading": "multi_threaded", "pool": "green_threads" }"#;
    assert!(SchedulerSettings::from_json_str(json).is_err());
}

#[test]
fn test_kinds_parse_from_strings() {
    assert_eq!("task_per_call".parse::<PoolKind>(), Ok(PoolKind::TaskPerCall));
    assert_eq!(" Multi_Threaded ".parse::<Threading>(), Ok(Threading::MultiThreaded));
    assert!("fibers".parse::<PoolKind>().is_err());
}
