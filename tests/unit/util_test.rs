//! Tests for utility functions

use prometheus_frame_scheduler::util::{init_tracing, DEFAULT_FILTER};

#[test]
fn test_default_filter_names_the_crate() {
    assert!(DEFAULT_FILTER.starts_with("prometheus_frame_scheduler="));
}

#[test]
fn test_init_tracing_is_idempotent() {
    init_tracing();
    init_tracing();
    tracing::info!("tracing initialized");
}
