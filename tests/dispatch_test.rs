//! Integration tests for dispatch and memoization
//!
//! These tests validate:
//! - At-most-once execution under concurrent dispatch, for every scheduler flavour
//! - The behaviour of each cache policy across ticks and versions
//! - Failure propagation from pool workers to every joiner
//! - Nested dispatch from inside a running call
//! - Async joins from tokio

use prometheus_frame_scheduler::config::ThreadPoolConfig;
use prometheus_frame_scheduler::core::{
    Cache, CachePolicy, CallContext, CallError, CallOptions, CallResult, Dispatcher, Function,
    PoolError, Scheduler, SchedulerError, ThreadPool,
};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Barrier};
use std::thread;
use std::time::Duration;

// ============================================================================
// HELPER FUNCTIONS
// ============================================================================

fn flavours() -> Vec<(&'static str, Arc<Scheduler>)> {
    vec![
        ("single_threaded", Arc::new(Scheduler::single_threaded())),
        ("thread_pool", Arc::new(Scheduler::thread_pool(2).unwrap())),
        ("work_stealing", Arc::new(Scheduler::work_stealing(2).unwrap())),
        ("task_per_call", Arc::new(Scheduler::task_per_call().unwrap())),
    ]
}

/// Squares its argument and counts how often it actually ran.
fn counted_square(runs: &Arc<AtomicUsize>) -> Function<(u64,), u64> {
    let runs = Arc::clone(runs);
    Function::new("square", move |(n,): (u64,)| {
        runs.fetch_add(1, Ordering::SeqCst);
        thread::sleep(Duration::from_millis(5));
        n * n
    })
}

fn single_threaded() -> (Arc<Scheduler>, Dispatcher) {
    let scheduler = Arc::new(Scheduler::single_threaded());
    let dispatcher = Dispatcher::with_scheduler(Arc::clone(&scheduler));
    (scheduler, dispatcher)
}

fn run_versions(dispatcher: &Dispatcher, f: &Function<(u64,), u64>, cache: Cache, versions: &[u64]) {
    let ctx = CallContext::unbound();
    for version in versions {
        let opts = CallOptions::direct().with_cache(cache).with_version(*version);
        dispatcher.dispatch(&ctx, &opts, f, (3,)).unwrap();
    }
}

// ============================================================================
// MEMOIZATION
// ============================================================================

#[test]
fn test_concurrent_identical_calls_run_once_on_every_flavour() {
    for (flavour, scheduler) in flavours() {
        let dispatcher = Dispatcher::with_scheduler(Arc::clone(&scheduler));
        for cache in [
            Cache::PER_TICK,
            Cache::INVALIDATE_OLDER,
            Cache::FOREVER,
            Cache::INVALIDATE_DIFFERENT,
        ] {
            let runs = Arc::new(AtomicUsize::new(0));
            let f = counted_square(&runs);
            let opts = CallOptions::asynchronous().with_cache(cache).with_version(1);
            let barrier = Barrier::new(8);
            let (barrier, dispatcher, opts, f) = (&barrier, &dispatcher, &opts, &f);

            let values: Vec<u64> = thread::scope(|s| {
                let handles: Vec<_> = (0..8)
                    .map(|_| {
                        s.spawn(move || {
                            barrier.wait();
                            let ctx = CallContext::unbound();
                            let result = dispatcher.dispatch(&ctx, opts, f, (7,)).unwrap();
                            result.join(&ctx).unwrap()
                        })
                    })
                    .collect();
                handles.into_iter().map(|h| h.join().unwrap()).collect()
            });

            assert!(values.iter().all(|v| *v == 49), "{flavour}: {values:?}");
            assert_eq!(runs.load(Ordering::SeqCst), 1, "{flavour} with {cache:?}");
        }
        scheduler.shutdown();
    }
}

#[test]
fn test_no_op_cache_runs_every_dispatch() {
    for (flavour, scheduler) in flavours() {
        let dispatcher = Dispatcher::with_scheduler(Arc::clone(&scheduler));
        let runs = Arc::new(AtomicUsize::new(0));
        let f = counted_square(&runs);
        let ctx = CallContext::unbound();

        for _ in 0..5 {
            let result = dispatcher
                .dispatch(&ctx, &CallOptions::asynchronous(), &f, (2,))
                .unwrap();
            assert_eq!(result.join(&ctx), Ok(4));
        }
        assert_eq!(runs.load(Ordering::SeqCst), 5, "{flavour}");
        assert_eq!(scheduler.cached_entries(), 0, "{flavour}");
        scheduler.shutdown();
    }
}

#[test]
fn test_per_tick_cache_lives_for_one_frame() {
    let (scheduler, dispatcher) = single_threaded();
    let runs = Arc::new(AtomicUsize::new(0));
    let f = counted_square(&runs);
    let ctx = CallContext::unbound();
    let opts = CallOptions::direct().with_cache(Cache::PER_TICK);

    dispatcher.dispatch(&ctx, &opts, &f, (5,)).unwrap();
    dispatcher.dispatch(&ctx, &opts, &f, (5,)).unwrap();
    assert_eq!(runs.load(Ordering::SeqCst), 1);

    scheduler.tick(1);
    assert_eq!(scheduler.cached_entries(), 0);
    dispatcher.dispatch(&ctx, &opts, &f, (5,)).unwrap();
    assert_eq!(runs.load(Ordering::SeqCst), 2);
    assert_eq!(scheduler.last_tick(), 1);
}

#[test]
fn test_invalidate_older_recomputes_only_when_time_moves_forward() {
    let (_scheduler, dispatcher) = single_threaded();
    let runs = Arc::new(AtomicUsize::new(0));
    let f = counted_square(&runs);

    run_versions(&dispatcher, &f, Cache::INVALIDATE_OLDER, &[1, 1]);
    assert_eq!(runs.load(Ordering::SeqCst), 1);

    run_versions(&dispatcher, &f, Cache::INVALIDATE_OLDER, &[2]);
    assert_eq!(runs.load(Ordering::SeqCst), 2);

    // An older request reuses the newer stored result.
    let ctx = CallContext::unbound();
    let opts = CallOptions::direct()
        .with_cache(Cache::INVALIDATE_OLDER)
        .with_version(1);
    let result = dispatcher.dispatch(&ctx, &opts, &f, (3,)).unwrap();
    assert_eq!(runs.load(Ordering::SeqCst), 2);
    assert_eq!(result.version(), 2);
}

#[test]
fn test_invalidate_different_recomputes_on_every_change() {
    let (_scheduler, dispatcher) = single_threaded();

    let runs = Arc::new(AtomicUsize::new(0));
    let f = counted_square(&runs);
    run_versions(&dispatcher, &f, Cache::INVALIDATE_DIFFERENT, &[1, 2, 1]);
    assert_eq!(runs.load(Ordering::SeqCst), 3);

    let runs = Arc::new(AtomicUsize::new(0));
    let f = counted_square(&runs);
    run_versions(&dispatcher, &f, Cache::INVALIDATE_DIFFERENT, &[1, 1]);
    assert_eq!(runs.load(Ordering::SeqCst), 1);
}

#[test]
fn test_forever_cache_survives_invalidation_attempts() {
    let (scheduler, dispatcher) = single_threaded();
    let runs = Arc::new(AtomicUsize::new(0));
    let f = counted_square(&runs);
    let ctx = CallContext::unbound();

    for frame in 0..5 {
        let opts = CallOptions::direct().with_cache(Cache::FOREVER).with_version(frame);
        dispatcher.dispatch(&ctx, &opts, &f, (9,)).unwrap();
        scheduler.tick(frame);
        scheduler.invalidate(Cache::FOREVER).unwrap();
        scheduler.evict(Cache::FOREVER, &f.identity(&(9,))).unwrap();
    }
    assert_eq!(runs.load(Ordering::SeqCst), 1);

    scheduler.reset();
    dispatcher
        .dispatch(&ctx, &CallOptions::direct().with_cache(Cache::FOREVER), &f, (9,))
        .unwrap();
    assert_eq!(runs.load(Ordering::SeqCst), 2);
}

#[test]
fn test_random_version_sequences_match_the_policy_model() {
    let mut rng = StdRng::seed_from_u64(0x5eed);
    for _ in 0..20 {
        let versions: Vec<u64> = (0..16).map(|_| rng.random_range(0..4)).collect();

        let mut expected_older = 0;
        let mut newest: Option<u64> = None;
        for v in &versions {
            if newest.is_none_or(|stored| stored < *v) {
                expected_older += 1;
                newest = Some(*v);
            }
        }
        let expected_different = 1 + versions.windows(2).filter(|w| w[0] != w[1]).count();

        let (_scheduler, dispatcher) = single_threaded();
        let runs = Arc::new(AtomicUsize::new(0));
        let f = counted_square(&runs);
        run_versions(&dispatcher, &f, Cache::INVALIDATE_OLDER, &versions);
        assert_eq!(runs.load(Ordering::SeqCst), expected_older, "{versions:?}");

        let runs = Arc::new(AtomicUsize::new(0));
        let f = counted_square(&runs);
        run_versions(&dispatcher, &f, Cache::INVALIDATE_DIFFERENT, &versions);
        assert_eq!(runs.load(Ordering::SeqCst), expected_different, "{versions:?}");
    }
}

#[test]
fn test_custom_cache_nodes_follow_their_policy() {
    let (scheduler, dispatcher) = single_threaded();
    let frame = scheduler.register_cache("frame", CachePolicy::InvalidateAll);
    let runs = Arc::new(AtomicUsize::new(0));
    let f = counted_square(&runs);
    let ctx = CallContext::unbound();
    let opts = CallOptions::direct().with_cache(frame);

    dispatcher.dispatch(&ctx, &opts, &f, (4,)).unwrap();
    dispatcher.dispatch(&ctx, &opts, &f, (4,)).unwrap();
    scheduler.tick(1);
    dispatcher.dispatch(&ctx, &opts, &f, (4,)).unwrap();
    assert_eq!(runs.load(Ordering::SeqCst), 2);
}

// ============================================================================
// FAILURES AND NESTING
// ============================================================================

#[test]
fn test_pool_failures_reach_every_joiner() {
    let scheduler = Arc::new(Scheduler::thread_pool(2).unwrap());
    let dispatcher = Dispatcher::with_scheduler(Arc::clone(&scheduler));
    let load = Function::new("load_asset", |(name,): (String,)| -> u32 {
        panic!("asset missing: {name}")
    });
    let opts = CallOptions::asynchronous().with_cache(Cache::FOREVER);
    let ctx = CallContext::unbound();

    let first = dispatcher.dispatch(&ctx, &opts, &load, ("rock.mesh".into(),)).unwrap();
    let second = dispatcher.dispatch(&ctx, &opts, &load, ("rock.mesh".into(),)).unwrap();

    let joiner = {
        let first = first.clone();
        thread::spawn(move || first.join(&CallContext::unbound()))
    };
    for outcome in [joiner.join().unwrap(), second.join(&ctx), first.join(&ctx)] {
        match outcome {
            Err(CallError::Panicked { message, .. }) => assert_eq!(message, "asset missing: rock.mesh"),
            other => panic!("expected a captured panic, got {other:?}"),
        }
    }
    scheduler.shutdown();
}

#[test]
fn test_nested_dispatch_on_a_single_worker_does_not_deadlock() {
    let scheduler = Arc::new(Scheduler::thread_pool(1).unwrap());
    let dispatcher = Arc::new(Dispatcher::with_scheduler(Arc::clone(&scheduler)));

    let inner = Function::new("inner", |(n,): (u32,)| n + 1);
    let nested = Arc::clone(&dispatcher);
    let outer = Function::with_context("outer", move |ctx: &CallContext, (n,): (u32,)| {
        let result = nested
            .dispatch(ctx, &CallOptions::asynchronous(), &inner, (n,))
            .unwrap();
        result.join(ctx).unwrap() * 10
    });

    let ctx = CallContext::unbound();
    let results = dispatcher
        .dispatch_many(&ctx, &CallOptions::asynchronous(), &outer, (0..4).map(|n| (n,)))
        .unwrap();
    let values: Vec<u32> = results
        .iter()
        .map(|r| r.join_timeout(&ctx, Duration::from_secs(10)).unwrap())
        .collect();
    assert_eq!(values, vec![10, 20, 30, 40]);
    scheduler.shutdown();
}

#[test]
fn test_dispatch_after_shutdown_is_rejected() {
    let scheduler = Arc::new(Scheduler::work_stealing(1).unwrap());
    let dispatcher = Dispatcher::with_scheduler(Arc::clone(&scheduler));
    let runs = Arc::new(AtomicUsize::new(0));
    let f = counted_square(&runs);

    scheduler.shutdown();
    assert!(matches!(
        dispatcher.dispatch(&CallContext::unbound(), &CallOptions::asynchronous(), &f, (1,)),
        Err(SchedulerError::ShutDown)
    ));
    assert_eq!(runs.load(Ordering::SeqCst), 0);
}

#[test]
fn test_full_pool_queue_is_reported_and_not_memoized() {
    let pool = ThreadPool::new(ThreadPoolConfig::new().with_worker_count(1).with_max_queue_depth(1)).unwrap();
    let scheduler = Arc::new(Scheduler::multi_threaded(Arc::new(pool)));
    let dispatcher = Dispatcher::with_scheduler(Arc::clone(&scheduler));
    let ctx = CallContext::unbound();
    let opts = CallOptions::asynchronous().with_cache(Cache::FOREVER);

    // Park the only worker, then fill the single queue slot.
    let (started_tx, started_rx) = crossbeam_channel::bounded::<()>(1);
    let (release_tx, release_rx) = crossbeam_channel::bounded::<()>(1);
    let hold = Function::new("hold", move |(n,): (u64,)| {
        if n == 0 {
            let _ = started_tx.send(());
            let _ = release_rx.recv_timeout(Duration::from_secs(5));
        }
        n
    });
    let parked = dispatcher.dispatch(&ctx, &opts, &hold, (0,)).unwrap();
    started_rx.recv_timeout(Duration::from_secs(5)).unwrap();
    let queued = dispatcher.dispatch(&ctx, &opts, &hold, (1,)).unwrap();

    let runs = Arc::new(AtomicUsize::new(0));
    let square = counted_square(&runs);
    assert!(matches!(
        dispatcher.dispatch(&ctx, &opts, &square, (7,)),
        Err(SchedulerError::Pool(PoolError::QueueFull))
    ));
    assert_eq!(scheduler.cached_entries(), 2);

    release_tx.send(()).unwrap();
    assert_eq!(parked.join(&ctx), Ok(0));
    assert_eq!(queued.join(&ctx), Ok(1));

    // Once the queue has room the same call is accepted and actually runs.
    let retried = dispatcher.dispatch(&ctx, &opts, &square, (7,)).unwrap();
    assert_eq!(retried.join(&ctx), Ok(49));
    assert_eq!(runs.load(Ordering::SeqCst), 1);
    scheduler.shutdown();
}

// ============================================================================
// ASYNC JOINS
// ============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_async_joins_resolve_on_the_runtime() {
    let scheduler = Arc::new(Scheduler::thread_pool(2).unwrap());
    let dispatcher = Dispatcher::with_scheduler(Arc::clone(&scheduler));
    let cube = Function::new("cube", |(n,): (u64,)| n * n * n);
    let ctx = CallContext::unbound();

    let results = dispatcher
        .dispatch_many(&ctx, &CallOptions::asynchronous(), &cube, (1..=4).map(|n| (n,)))
        .unwrap();
    let values: Vec<u64> = futures::future::join_all(results.iter().map(CallResult::join_async))
        .await
        .into_iter()
        .map(Result::unwrap)
        .collect();
    assert_eq!(values, vec![1, 8, 27, 64]);

    assert_eq!(CallResult::ready(5_u8).join_async().await, Ok(5));
    scheduler.shutdown();
}
